//! Клиентская библиотека фотоленты поверх Parse Server.
//!
//! Состоит из трёх частей:
//! - `FeedController` — постраничная лента, новые посты сверху;
//! - `CellBinder` — привязка поста к переиспользуемой строке с асинхронной
//!   загрузкой фото и обратным геокодированием;
//! - `Publisher` — публикация фото с подписью, временем и местом съёмки.
//!
//! Внешние сервисы описаны трейтами в [`ports`]; HTTP-реализации —
//! `ParseClient`, `HttpImageLoader` и `NominatimGeocoder`.
#![warn(missing_docs)]

mod cell;
mod error;
mod feed;
mod geocode;
mod media;
mod metadata;
mod models;
mod parse_client;
pub mod ports;
mod publish;

#[cfg(test)]
mod test_support;

pub use cell::{
    CellBinder, DEFAULT_TIME_FORMAT, RowChange, RowId, RowView, TimeFormatter, compose_label,
};
pub use error::{PhotoFeedError, PhotoFeedResult};
pub use feed::{DEFAULT_LOOKAHEAD, FeedConfig, FeedController, FeedEvent, FeedState, FetchTicket};
pub use geocode::{NominatimGeocoder, place_string};
pub use media::{HttpImageLoader, Image, MAX_UPLOAD_SIDE};
pub use metadata::CaptureMetadata;
pub use models::{
    DEFAULT_PAGE_SIZE, FeedPageRequest, FileRef, GeoPoint, NewPost, PickedPhoto, Placemark, Post,
    PostDraft, SortOrder, User,
};
pub use parse_client::{ParseClient, ParseConfig};
pub use publish::{MISSING_IMAGE_MESSAGE, Publisher};
