use thiserror::Error;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `photofeed-client`.
pub enum PhotoFeedError {
    /// Ошибка HTTP-транспорта (`reqwest`).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Требуется авторизация (отсутствует/истёк session token).
    #[error("unauthorized")]
    Unauthorized,

    /// Запрошенный ресурс не найден.
    #[error("not found")]
    NotFound,

    /// Ошибка, которую вернул backend (`{"code": .., "error": ..}`).
    #[error("{message}")]
    Backend {
        /// Код ошибки Parse, если он был в теле ответа.
        code: Option<i64>,
        /// Человекочитаемое сообщение.
        message: String,
    },

    /// Локальная валидация не пройдена, запрос в сеть не отправлялся.
    #[error("{0}")]
    Validation(String),

    /// Ответ не удалось разобрать.
    #[error("decode error: {0}")]
    Decode(String),

    /// Ошибка обратного геокодирования.
    #[error("geocode error: {0}")]
    Geocode(String),

    /// Изображение не удалось загрузить или распознать.
    #[error("image error: {0}")]
    Image(String),
}

/// Результат операций `photofeed-client`.
pub type PhotoFeedResult<T> = Result<T, PhotoFeedError>;

impl PhotoFeedError {
    pub(crate) fn from_http_status(
        status: reqwest::StatusCode,
        code: Option<i64>,
        message: Option<String>,
    ) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Self::Unauthorized
            }
            reqwest::StatusCode::NOT_FOUND => Self::NotFound,
            _ => {
                let message = message.unwrap_or_else(|| format!("http status {status}"));
                Self::Backend { code, message }
            }
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status, None, None);
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Http(err)
    }
}
