//! Фейковые реализации портов для unit-тестов.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use tokio::sync::oneshot;

use crate::error::{PhotoFeedError, PhotoFeedResult};
use crate::media::Image;
use crate::models::{FeedPageRequest, FileRef, GeoPoint, NewPost, Placemark, Post, User};
use crate::ports::{FileStore, Geocoder, ImageLoader, PostStore};

pub(crate) const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub(crate) fn png_image(tag: u8) -> Image {
    let mut bytes = PNG_BYTES.to_vec();
    bytes.push(tag);
    Image::from_bytes(bytes).expect("png fixture must be recognized")
}

/// Настоящий PNG из шума: плохо сжимается и декодируется.
pub(crate) fn encoded_png(width: u32, height: u32) -> Vec<u8> {
    let mut seed: u32 = 0x2545_F491;
    let pixels: Vec<u8> = (0..width * height * 3)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 24) as u8
        })
        .collect();
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(&pixels, width, height, ColorType::Rgb8)
        .expect("png must encode");
    bytes
}

pub(crate) fn sample_post(id: &str, created_secs: i64) -> Post {
    let created_at = Utc.timestamp_opt(created_secs, 0).single().expect("valid ts");
    let mut post = Post::new(id, Some(created_at));
    post.author = Some(User {
        id: format!("user-{id}"),
        username: format!("author-{id}"),
    });
    post.caption = Some(format!("caption {id}"));
    post
}

pub(crate) fn sample_posts(count: usize) -> Vec<Post> {
    (0..count)
        .map(|i| sample_post(&format!("p{i}"), 1_000_000 - i as i64))
        .collect()
}

/// Крутит планировщик, пока условие не выполнится.
async fn wait_until(mut ready: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ready() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("fake did not receive expected calls in time");
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryPostStore {
    pub(crate) posts: Arc<Mutex<Vec<Post>>>,
    pub(crate) requests: Arc<Mutex<Vec<FeedPageRequest>>>,
    pub(crate) fail_with: Arc<Mutex<Option<String>>>,
    pub(crate) created: Arc<Mutex<Vec<NewPost>>>,
}

impl InMemoryPostStore {
    pub(crate) fn with_posts(posts: Vec<Post>) -> Self {
        let store = Self::default();
        *store.posts.lock().expect("posts mutex poisoned") = posts;
        store
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().expect("requests mutex poisoned").len()
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn list_posts(&self, request: FeedPageRequest) -> PhotoFeedResult<Vec<Post>> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());

        if let Some(message) = self.fail_with.lock().expect("fail_with mutex poisoned").clone() {
            return Err(PhotoFeedError::Backend {
                code: None,
                message,
            });
        }

        let posts = self.posts.lock().expect("posts mutex poisoned");
        Ok(posts
            .iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .cloned()
            .collect())
    }

    async fn create_post(&self, input: NewPost) -> PhotoFeedResult<Post> {
        self.created
            .lock()
            .expect("created mutex poisoned")
            .push(input.clone());

        let mut post = Post::new(
            "created-1",
            Some(Utc.timestamp_opt(2_000_000, 0).single().expect("valid ts")),
        );
        post.image = Some(input.image);
        post.caption = input.caption;
        post.taken_at = input.taken_at;
        post.location = input.location;
        Ok(post)
    }
}

type PagePending = Option<(FeedPageRequest, oneshot::Sender<PhotoFeedResult<Vec<Post>>>)>;

/// Хранилище, которое отвечает только по команде теста.
#[derive(Clone, Default)]
pub(crate) struct GatedPostStore {
    pending: Arc<Mutex<Vec<PagePending>>>,
}

impl GatedPostStore {
    pub(crate) async fn wait_calls(&self, count: usize) {
        let pending = Arc::clone(&self.pending);
        wait_until(move || pending.lock().expect("pending mutex poisoned").len() >= count).await;
    }

    pub(crate) fn request(&self, index: usize) -> FeedPageRequest {
        self.pending.lock().expect("pending mutex poisoned")[index]
            .as_ref()
            .map(|(request, _)| request.clone())
            .expect("call was already released")
    }

    pub(crate) fn release(&self, index: usize, result: PhotoFeedResult<Vec<Post>>) {
        let (_, tx) = self.pending.lock().expect("pending mutex poisoned")[index]
            .take()
            .expect("call was already released");
        let _ = tx.send(result);
    }
}

#[async_trait]
impl PostStore for GatedPostStore {
    async fn list_posts(&self, request: FeedPageRequest) -> PhotoFeedResult<Vec<Post>> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .push(Some((request, tx)));
        rx.await.map_err(|_| PhotoFeedError::Backend {
            code: None,
            message: "gate dropped".to_string(),
        })?
    }

    async fn create_post(&self, _input: NewPost) -> PhotoFeedResult<Post> {
        Err(PhotoFeedError::Backend {
            code: None,
            message: "not supported by gated store".to_string(),
        })
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeImageLoader {
    pub(crate) images: Arc<Mutex<HashMap<String, Image>>>,
}

impl FakeImageLoader {
    pub(crate) fn with_image(self, url: &str, image: Image) -> Self {
        self.images
            .lock()
            .expect("images mutex poisoned")
            .insert(url.to_string(), image);
        self
    }
}

#[async_trait]
impl ImageLoader for FakeImageLoader {
    async fn load(&self, url: &str) -> PhotoFeedResult<Image> {
        self.images
            .lock()
            .expect("images mutex poisoned")
            .get(url)
            .cloned()
            .ok_or_else(|| PhotoFeedError::Image(format!("no image at {url}")))
    }
}

type ImagePending = Option<(String, oneshot::Sender<PhotoFeedResult<Image>>)>;

#[derive(Clone, Default)]
pub(crate) struct GatedImageLoader {
    pending: Arc<Mutex<Vec<ImagePending>>>,
}

impl GatedImageLoader {
    pub(crate) async fn wait_calls(&self, count: usize) {
        let pending = Arc::clone(&self.pending);
        wait_until(move || pending.lock().expect("pending mutex poisoned").len() >= count).await;
    }

    pub(crate) fn url(&self, index: usize) -> String {
        self.pending.lock().expect("pending mutex poisoned")[index]
            .as_ref()
            .map(|(url, _)| url.clone())
            .expect("call was already released")
    }

    pub(crate) fn release(&self, index: usize, result: PhotoFeedResult<Image>) {
        let (_, tx) = self.pending.lock().expect("pending mutex poisoned")[index]
            .take()
            .expect("call was already released");
        let _ = tx.send(result);
    }
}

#[async_trait]
impl ImageLoader for GatedImageLoader {
    async fn load(&self, url: &str) -> PhotoFeedResult<Image> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .push(Some((url.to_string(), tx)));
        rx.await
            .map_err(|_| PhotoFeedError::Image("gate dropped".to_string()))?
    }
}

#[derive(Clone)]
pub(crate) struct FakeGeocoder {
    pub(crate) result: Arc<Mutex<Result<Vec<Placemark>, String>>>,
    pub(crate) calls: Arc<Mutex<Vec<GeoPoint>>>,
}

impl FakeGeocoder {
    pub(crate) fn resolving(placemarks: Vec<Placemark>) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(placemarks))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            result: Arc::new(Mutex::new(Err(message.to_string()))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn reverse(&self, point: GeoPoint) -> PhotoFeedResult<Vec<Placemark>> {
        self.calls.lock().expect("calls mutex poisoned").push(point);
        self.result
            .lock()
            .expect("result mutex poisoned")
            .clone()
            .map_err(PhotoFeedError::Geocode)
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeFileStore {
    pub(crate) uploads: Arc<Mutex<Vec<(String, String, usize)>>>,
    pub(crate) fail_with: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl FileStore for FakeFileStore {
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> PhotoFeedResult<FileRef> {
        self.uploads.lock().expect("uploads mutex poisoned").push((
            name.to_string(),
            content_type.to_string(),
            bytes.len(),
        ));

        if let Some(message) = self.fail_with.lock().expect("fail_with mutex poisoned").clone() {
            return Err(PhotoFeedError::Backend {
                code: None,
                message,
            });
        }

        Ok(FileRef {
            name: format!("stored_{name}"),
            url: Some(format!("https://files.example.com/stored_{name}")),
        })
    }
}
