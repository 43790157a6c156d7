use std::sync::Arc;

use tracing::info;

use crate::error::{PhotoFeedError, PhotoFeedResult};
use crate::media::Image;
use crate::models::{NewPost, Post, PostDraft, User};
use crate::ports::{FileStore, PostStore};

/// Сообщение, если публикуют черновик без фото.
pub const MISSING_IMAGE_MESSAGE: &str = "Please select an image before sharing.";

/// Публикация черновиков: загрузка фото и создание поста.
pub struct Publisher<S, F>
where
    S: PostStore + ?Sized,
    F: FileStore + ?Sized,
{
    posts: Arc<S>,
    files: Arc<F>,
    author: Option<User>,
}

impl<S, F> Publisher<S, F>
where
    S: PostStore + ?Sized,
    F: FileStore + ?Sized,
{
    /// Создаёт публикатор без автора.
    pub fn new(posts: Arc<S>, files: Arc<F>) -> Self {
        Self {
            posts,
            files,
            author: None,
        }
    }

    /// Автор, которому приписываются новые посты.
    pub fn with_author(mut self, author: Option<User>) -> Self {
        self.author = author;
        self
    }

    /// Публикует черновик.
    ///
    /// Без фото или с нераспознанным форматом возвращает
    /// [`PhotoFeedError::Validation`], не обращаясь к сети.
    pub async fn publish(&self, draft: PostDraft) -> PhotoFeedResult<Post> {
        let photo = draft
            .photo
            .filter(|photo| !photo.bytes.is_empty())
            .ok_or_else(|| PhotoFeedError::Validation(MISSING_IMAGE_MESSAGE.to_string()))?;
        let image = Image::from_bytes(photo.bytes)
            .map_err(|_| {
                PhotoFeedError::Validation(
                    "The selected file is not a supported image.".to_string(),
                )
            })?
            .prepare_for_upload();

        let name = format!("image.{}", image.extension());
        let content_type = image.content_type();
        let file = self.files.upload(&name, content_type, image.bytes).await?;

        let input = NewPost {
            image: file,
            caption: normalize_caption(draft.caption.as_deref()),
            taken_at: photo.taken_at,
            location: photo.location,
            author_id: self.author.as_ref().map(|user| user.id.clone()),
        };
        let mut post = self.posts.create_post(input).await?;
        post.author = self.author.clone();

        info!(post_id = post.id(), "post published");
        Ok(post)
    }
}

fn normalize_caption(caption: Option<&str>) -> Option<String> {
    caption
        .map(str::trim)
        .filter(|caption| !caption.is_empty())
        .map(str::to_string)
}
