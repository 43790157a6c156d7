//! Контракты внешних сервисов, которыми пользуется клиент.

use async_trait::async_trait;

use crate::error::PhotoFeedResult;
use crate::media::Image;
use crate::models::{FeedPageRequest, FileRef, GeoPoint, NewPost, Placemark, Post, User};

/// Хранилище постов.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Возвращает одну страницу ленты в порядке `request.order`.
    async fn list_posts(&self, request: FeedPageRequest) -> PhotoFeedResult<Vec<Post>>;
    /// Создаёт пост и возвращает сохранённую запись с серверными полями.
    async fn create_post(&self, input: NewPost) -> PhotoFeedResult<Post>;
}

/// Файловое хранилище.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Загружает байты и возвращает ссылку на файл.
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> PhotoFeedResult<FileRef>;
}

/// Загрузчик изображений по URL.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Скачивает и распознаёт изображение.
    async fn load(&self, url: &str) -> PhotoFeedResult<Image>;
}

/// Обратный геокодер.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Ноль или больше кандидатов для точки, лучший первым.
    async fn reverse(&self, point: GeoPoint) -> PhotoFeedResult<Vec<Placemark>>;
}

/// Источник текущего пользователя сессии.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `None`, если сессии нет.
    async fn current_user(&self) -> PhotoFeedResult<Option<User>>;
}
