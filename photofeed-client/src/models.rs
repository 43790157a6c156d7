use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Размер страницы ленты по умолчанию.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Публичная модель пользователя.
pub struct User {
    /// Идентификатор пользователя (`objectId`).
    pub id: String,
    /// Логин.
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Ссылка на файл в файловом хранилище backend.
pub struct FileRef {
    /// Имя файла, присвоенное хранилищем.
    pub name: String,
    /// URL для скачивания; отсутствует у ещё не загруженного файла.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Географическая точка.
pub struct GeoPoint {
    /// Широта.
    pub latitude: f64,
    /// Долгота.
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Кандидат обратного геокодирования.
pub struct Placemark {
    /// Город / населённый пункт.
    pub locality: Option<String>,
    /// Регион / штат.
    pub administrative_area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Опубликованный пост.
///
/// `id` и `created_at` присваивает сервер, после создания они не меняются,
/// поэтому доступны только на чтение.
pub struct Post {
    id: String,
    created_at: Option<DateTime<Utc>>,
    /// Автор; `None`, если указатель не был развёрнут (`include=user`).
    pub author: Option<User>,
    /// Фото.
    pub image: Option<FileRef>,
    /// Подпись.
    pub caption: Option<String>,
    /// Время съёмки из метаданных фото.
    pub taken_at: Option<DateTime<Utc>>,
    /// Место съёмки.
    pub location: Option<GeoPoint>,
}

impl Post {
    /// Создаёт пост с серверными полями; остальные заполняются напрямую.
    pub fn new(id: impl Into<String>, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            created_at,
            author: None,
            image: None,
            caption: None,
            taken_at: None,
            location: None,
        }
    }

    /// Идентификатор поста.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Время создания на сервере, ключ сортировки ленты.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Время для подписи в ленте: время съёмки, иначе время создания.
    pub fn display_time(&self) -> Option<DateTime<Utc>> {
        self.taken_at.or(self.created_at)
    }

    /// URL фото, если он есть.
    pub fn image_url(&self) -> Option<&str> {
        self.image.as_ref().and_then(|file| file.url.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Порядок сортировки ленты.
pub enum SortOrder {
    /// По времени создания, новые сверху.
    CreatedAtDesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Описание запроса одной страницы ленты.
pub struct FeedPageRequest {
    /// Сколько записей пропустить.
    pub offset: u32,
    /// Размер страницы.
    pub limit: u32,
    /// Порядок сортировки.
    pub order: SortOrder,
    /// Разворачивать ли указатель на автора.
    pub include_author: bool,
}

impl FeedPageRequest {
    /// Запрос страницы ленты: новые сверху, с автором.
    pub fn page(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit,
            order: SortOrder::CreatedAtDesc,
            include_author: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Фото, выбранное пользователем, вместе с метаданными.
pub struct PickedPhoto {
    /// Байты изображения.
    pub bytes: Vec<u8>,
    /// Время съёмки.
    pub taken_at: Option<DateTime<Utc>>,
    /// Место съёмки.
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default)]
/// Черновик поста до публикации.
pub struct PostDraft {
    /// Выбранное фото; без него публикация невозможна.
    pub photo: Option<PickedPhoto>,
    /// Подпись.
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
/// Проверенный черновик с уже загруженным файлом.
pub struct NewPost {
    /// Загруженное фото.
    pub image: FileRef,
    /// Подпись (без пробелов по краям, пустая отбрасывается).
    pub caption: Option<String>,
    /// Время съёмки.
    pub taken_at: Option<DateTime<Utc>>,
    /// Место съёмки.
    pub location: Option<GeoPoint>,
    /// Идентификатор автора.
    pub author_id: Option<String>,
}
