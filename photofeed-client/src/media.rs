use std::time::Duration;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, GenericImageView, ImageFormat, ImageResult};
use reqwest::Client;
use tracing::debug;

use crate::error::{PhotoFeedError, PhotoFeedResult};
use crate::ports::ImageLoader;

/// Наибольшая сторона фото, загружаемого в хранилище.
pub const MAX_UPLOAD_SIDE: u32 = 1600;

const UPLOAD_JPEG_QUALITY: u8 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Загруженное изображение с распознанным форматом.
pub struct Image {
    /// Исходные байты.
    pub bytes: Vec<u8>,
    /// Формат по сигнатуре файла.
    pub format: ImageFormat,
}

impl Image {
    /// Распознаёт формат по сигнатуре; нераспознанные байты отклоняются.
    pub fn from_bytes(bytes: Vec<u8>) -> PhotoFeedResult<Self> {
        let format = image::guess_format(&bytes)
            .map_err(|err| PhotoFeedError::Image(format!("unrecognized image data: {err}")))?;
        Ok(Self { bytes, format })
    }

    /// MIME-тип для загрузки в файловое хранилище.
    pub fn content_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
            _ => "application/octet-stream",
        }
    }

    /// Расширение имени файла.
    pub fn extension(&self) -> &'static str {
        match self.format {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
            _ => "bin",
        }
    }

    /// Пережимает фото в JPEG перед загрузкой, уменьшая большую сторону до
    /// [`MAX_UPLOAD_SIDE`].
    ///
    /// Байты остаются прежними, если формат не декодируется или пережатое
    /// фото без уменьшения не стало меньше.
    pub fn prepare_for_upload(self) -> Self {
        match self.recompress() {
            Ok(Some(image)) => image,
            Ok(None) => self,
            Err(err) => {
                debug!(format = ?self.format, error = %err, "uploading image bytes as is");
                self
            }
        }
    }

    fn recompress(&self) -> ImageResult<Option<Self>> {
        let decoded = image::load_from_memory_with_format(&self.bytes, self.format)?;
        let oversized = decoded.width().max(decoded.height()) > MAX_UPLOAD_SIDE;
        let decoded = if oversized {
            decoded.resize(MAX_UPLOAD_SIDE, MAX_UPLOAD_SIDE, FilterType::Triangle)
        } else {
            decoded
        };

        let rgb = decoded.to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, UPLOAD_JPEG_QUALITY).encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ColorType::Rgb8,
        )?;

        if !oversized && bytes.len() >= self.bytes.len() {
            return Ok(None);
        }
        Ok(Some(Self {
            bytes,
            format: ImageFormat::Jpeg,
        }))
    }
}

#[derive(Debug, Clone)]
/// Загрузчик изображений по HTTP.
pub struct HttpImageLoader {
    client: Client,
}

impl HttpImageLoader {
    /// Создаёт загрузчик с таймаутом на запрос.
    pub fn new(timeout: Duration) -> PhotoFeedResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> PhotoFeedResult<Image> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(PhotoFeedError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PhotoFeedError::Image(format!("http status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(PhotoFeedError::from_reqwest)?;
        Image::from_bytes(bytes.to_vec())
    }
}
