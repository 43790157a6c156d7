use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{PhotoFeedError, PhotoFeedResult};
use crate::models::{GeoPoint, Placemark};
use crate::ports::Geocoder;

const USER_AGENT: &str = concat!("photofeed/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ReverseResponseDto {
    address: Option<AddressDto>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressDto {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
}

impl From<AddressDto> for Placemark {
    fn from(value: AddressDto) -> Self {
        Self {
            locality: value.city.or(value.town).or(value.village),
            administrative_area: value.state,
        }
    }
}

#[derive(Debug, Clone)]
/// Обратный геокодер поверх Nominatim-совместимого API (`/reverse`).
pub struct NominatimGeocoder {
    base_url: String,
    client: Client,
}

impl NominatimGeocoder {
    /// Создаёт геокодер для сервера Nominatim по адресу `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PhotoFeedResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, point: GeoPoint) -> PhotoFeedResult<Vec<Placemark>> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", point.latitude.to_string()),
                ("lon", point.longitude.to_string()),
            ])
            .send()
            .await
            .map_err(|err| PhotoFeedError::Geocode(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PhotoFeedError::Geocode(format!("http status {status}")));
        }

        let body = response
            .json::<ReverseResponseDto>()
            .await
            .map_err(|err| PhotoFeedError::Geocode(err.to_string()))?;
        Ok(placemarks_from(body))
    }
}

// Nominatim отвечает 200 с полем `error`, если точка не геокодируется.
fn placemarks_from(body: ReverseResponseDto) -> Vec<Placemark> {
    if body.error.is_some() {
        return Vec::new();
    }
    body.address.map(Placemark::from).into_iter().collect()
}

/// Короткое название места: `"город, регион"` без отсутствующих частей.
pub fn place_string(placemark: &Placemark) -> String {
    [
        placemark.locality.as_deref(),
        placemark.administrative_area.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_string_joins_both_parts() {
        let placemark = Placemark {
            locality: Some("Springfield".to_string()),
            administrative_area: Some("IL".to_string()),
        };
        assert_eq!(place_string(&placemark), "Springfield, IL");
    }

    #[test]
    fn place_string_omits_missing_parts() {
        let placemark = Placemark {
            locality: None,
            administrative_area: Some("IL".to_string()),
        };
        assert_eq!(place_string(&placemark), "IL");
        assert_eq!(place_string(&Placemark::default()), "");
    }

    #[test]
    fn placemarks_from_falls_back_to_town() {
        let raw = r#"{"address":{"town":"Shelbyville","state":"Illinois"}}"#;
        let body: ReverseResponseDto = serde_json::from_str(raw).expect("dto must parse");
        let placemarks = placemarks_from(body);
        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].locality.as_deref(), Some("Shelbyville"));
        assert_eq!(placemarks[0].administrative_area.as_deref(), Some("Illinois"));
    }

    #[test]
    fn placemarks_from_error_body_is_empty() {
        let raw = r#"{"error":"Unable to geocode"}"#;
        let body: ReverseResponseDto = serde_json::from_str(raw).expect("dto must parse");
        assert!(placemarks_from(body).is_empty());
    }
}
