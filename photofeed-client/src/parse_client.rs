use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{PhotoFeedError, PhotoFeedResult};
use crate::models::{FeedPageRequest, FileRef, GeoPoint, NewPost, Post, SortOrder, User};
use crate::ports::{FileStore, PostStore, SessionProvider};

const POST_CLASS: &str = "Post";
const USER_CLASS: &str = "_User";

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    code: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DateDto {
    #[serde(rename = "__type")]
    kind: String,
    iso: DateTime<Utc>,
}

impl DateDto {
    fn new(iso: DateTime<Utc>) -> Self {
        Self {
            kind: "Date".to_string(),
            iso,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoPointDto {
    #[serde(rename = "__type")]
    kind: String,
    latitude: f64,
    longitude: f64,
}

impl From<GeoPoint> for GeoPointDto {
    fn from(value: GeoPoint) -> Self {
        Self {
            kind: "GeoPoint".to_string(),
            latitude: value.latitude,
            longitude: value.longitude,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileDto {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    name: String,
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct PointerDto<'a> {
    #[serde(rename = "__type")]
    kind: &'static str,
    #[serde(rename = "className")]
    class_name: &'static str,
    #[serde(rename = "objectId")]
    object_id: &'a str,
}

// Развёрнутый `include=user` приходит с `username`, неразвёрнутый указатель без него.
#[derive(Debug, Deserialize)]
struct UserDto {
    #[serde(rename = "objectId")]
    object_id: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDto {
    object_id: String,
    created_at: Option<DateTime<Utc>>,
    user: Option<UserDto>,
    image_file: Option<FileDto>,
    caption: Option<String>,
    photo_time: Option<DateDto>,
    location: Option<GeoPointDto>,
}

#[derive(Debug, Deserialize)]
struct QueryResponseDto<T> {
    results: Vec<T>,
}

#[derive(Debug, Serialize)]
struct CreatePostRequestDto<'a> {
    #[serde(rename = "imageFile")]
    image_file: FileDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(rename = "photoTime", skip_serializing_if = "Option::is_none")]
    photo_time: Option<DateDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<GeoPointDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<PointerDto<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponseDto {
    object_id: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ListPostsQuery {
    order: &'static str,
    limit: u32,
    skip: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    include: Option<&'static str>,
}

impl From<&FeedPageRequest> for ListPostsQuery {
    fn from(value: &FeedPageRequest) -> Self {
        let order = match value.order {
            SortOrder::CreatedAtDesc => "-createdAt",
        };
        Self {
            order,
            limit: value.limit,
            skip: value.offset,
            include: value.include_author.then_some("user"),
        }
    }
}

impl UserDto {
    fn into_user(self) -> Option<User> {
        self.username.map(|username| User {
            id: self.object_id,
            username,
        })
    }
}

impl From<FileDto> for FileRef {
    fn from(value: FileDto) -> Self {
        Self {
            name: value.name,
            url: value.url,
        }
    }
}

impl From<PostDto> for Post {
    fn from(value: PostDto) -> Self {
        let mut post = Post::new(value.object_id, value.created_at);
        post.author = value.user.and_then(UserDto::into_user);
        post.image = value.image_file.map(FileRef::from);
        post.caption = value.caption;
        post.taken_at = value.photo_time.map(|date| date.iso);
        post.location = value.location.map(|geo| GeoPoint {
            latitude: geo.latitude,
            longitude: geo.longitude,
        });
        post
    }
}

#[derive(Debug, Clone)]
/// Параметры подключения к Parse Server.
pub struct ParseConfig {
    /// Базовый URL REST API, например `https://parseapi.back4app.com`.
    pub server_url: String,
    /// `X-Parse-Application-Id`.
    pub application_id: String,
    /// `X-Parse-Client-Key`.
    pub client_key: Option<String>,
    /// `X-Parse-Session-Token` текущего пользователя.
    pub session_token: Option<String>,
    /// Таймаут одного запроса.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
/// HTTP-клиент для REST API Parse Server.
pub struct ParseClient {
    config: ParseConfig,
    client: Client,
}

impl ParseClient {
    /// Создаёт клиент с заданными параметрами подключения.
    pub fn new(config: ParseConfig) -> PhotoFeedResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.server_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header("X-Parse-Application-Id", &self.config.application_id);
        if let Some(key) = &self.config.client_key {
            request = request.header("X-Parse-Client-Key", key);
        }
        if let Some(token) = &self.config.session_token {
            request = request.header("X-Parse-Session-Token", token);
        }
        request
    }

    async fn decode_error(response: reqwest::Response) -> PhotoFeedError {
        let status = response.status();

        match response.json::<ErrorResponseDto>().await {
            Ok(body) => PhotoFeedError::from_http_status(status, body.code, body.error),
            Err(_) => PhotoFeedError::from_http_status(status, None, None),
        }
    }

    async fn send<TRes>(&self, request: RequestBuilder) -> PhotoFeedResult<TRes>
    where
        TRes: DeserializeOwned,
    {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(PhotoFeedError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        response
            .json::<TRes>()
            .await
            .map_err(PhotoFeedError::from_reqwest)
    }
}

#[async_trait]
impl PostStore for ParseClient {
    async fn list_posts(&self, request: FeedPageRequest) -> PhotoFeedResult<Vec<Post>> {
        let query = ListPostsQuery::from(&request);
        let url = self.endpoint(&format!("/classes/{POST_CLASS}"));

        let body: QueryResponseDto<PostDto> = self.send(self.client.get(url).query(&query)).await?;
        Ok(body.results.into_iter().map(Post::from).collect())
    }

    async fn create_post(&self, input: NewPost) -> PhotoFeedResult<Post> {
        let payload = CreatePostRequestDto {
            image_file: FileDto {
                kind: Some("File".to_string()),
                name: input.image.name.clone(),
                url: input.image.url.clone(),
            },
            caption: input.caption.as_deref(),
            photo_time: input.taken_at.map(DateDto::new),
            location: input.location.map(GeoPointDto::from),
            user: input.author_id.as_deref().map(|object_id| PointerDto {
                kind: "Pointer",
                class_name: USER_CLASS,
                object_id,
            }),
        };
        let url = self.endpoint(&format!("/classes/{POST_CLASS}"));

        let created: CreatedResponseDto = self.send(self.client.post(url).json(&payload)).await?;

        let mut post = Post::new(created.object_id, created.created_at);
        post.image = Some(input.image);
        post.caption = input.caption;
        post.taken_at = input.taken_at;
        post.location = input.location;
        Ok(post)
    }
}

#[async_trait]
impl FileStore for ParseClient {
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> PhotoFeedResult<FileRef> {
        let url = self.endpoint(&format!("/files/{name}"));
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);

        let file: FileDto = self.send(request).await?;
        Ok(FileRef::from(file))
    }
}

#[async_trait]
impl SessionProvider for ParseClient {
    async fn current_user(&self) -> PhotoFeedResult<Option<User>> {
        if self.config.session_token.is_none() {
            return Ok(None);
        }

        let user: UserDto = self.send(self.client.get(self.endpoint("/users/me"))).await?;
        Ok(user.into_user())
    }
}
