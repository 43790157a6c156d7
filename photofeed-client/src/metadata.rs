//! Время и место съёмки из EXIF выбранного фото.

use std::io::Cursor;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use exif::{Exif, In, Reader, Tag, Value};
use tracing::{debug, warn};

use crate::models::{GeoPoint, PickedPhoto};

/// Делители для перевода градусов, минут и секунд в десятичные градусы.
const DMS_DIVISION: [f64; 3] = [1.0, 60.0, 3600.0];

/// Теги времени съёмки с парными тегами смещения, в порядке приоритета.
const TIME_TAGS: [(Tag, Tag); 2] = [
    (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
    (Tag::DateTime, Tag::OffsetTime),
];

const LAT_MAX: f64 = 90.0;
const LON_MAX: f64 = 180.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// Метаданные съёмки, прочитанные из файла.
pub struct CaptureMetadata {
    /// Время съёмки; без смещения в EXIF считается UTC.
    pub taken_at: Option<DateTime<Utc>>,
    /// Координаты съёмки.
    pub location: Option<GeoPoint>,
}

impl CaptureMetadata {
    /// Читает EXIF из байтов изображения.
    ///
    /// Файл без EXIF или с битым EXIF даёт пустые метаданные: для публикации
    /// они необязательны.
    pub fn from_slice(bytes: &[u8]) -> Self {
        match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(exif) => Self {
                taken_at: date_taken(&exif),
                location: location(&exif),
            },
            Err(
                err @ (exif::Error::NotFound(_)
                | exif::Error::NotSupported(_)
                | exif::Error::BlankValue(_)),
            ) => {
                debug!(error = %err, "photo has no exif metadata");
                Self::default()
            }
            Err(err) => {
                warn!(error = %err, "failed to read exif metadata");
                Self::default()
            }
        }
    }
}

impl PickedPhoto {
    /// Фото с временем и местом съёмки из его EXIF.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let metadata = CaptureMetadata::from_slice(&bytes);
        Self {
            bytes,
            taken_at: metadata.taken_at,
            location: metadata.location,
        }
    }
}

fn first_ascii(exif: &Exif, tag: Tag) -> Option<&[u8]> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts.first().map(Vec::as_slice),
        _ => None,
    }
}

fn date_taken(exif: &Exif) -> Option<DateTime<Utc>> {
    TIME_TAGS
        .iter()
        .find_map(|&(time_tag, offset_tag)| parse_date(exif, time_tag, offset_tag))
}

fn parse_date(exif: &Exif, time_tag: Tag, offset_tag: Tag) -> Option<DateTime<Utc>> {
    let mut stamp = exif::DateTime::from_ascii(first_ascii(exif, time_tag)?).ok()?;
    if let Some(raw) = first_ascii(exif, offset_tag) {
        if let Err(err) = stamp.parse_offset(raw) {
            debug!(error = %err, "ignoring malformed exif time offset");
        }
    }

    let naive = NaiveDate::from_ymd_opt(
        i32::from(stamp.year),
        u32::from(stamp.month),
        u32::from(stamp.day),
    )?
    .and_hms_opt(
        u32::from(stamp.hour),
        u32::from(stamp.minute),
        u32::from(stamp.second),
    )?;
    let offset = FixedOffset::east_opt(i32::from(stamp.offset.unwrap_or(0)) * 60)?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|time| time.with_timezone(&Utc))
}

fn location(exif: &Exif) -> Option<GeoPoint> {
    Some(GeoPoint {
        latitude: coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, LAT_MAX)?,
        longitude: coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, LON_MAX)?,
    })
}

fn coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag, max: f64) -> Option<f64> {
    let Value::Rational(dms) = &exif.get_field(value_tag, In::PRIMARY)?.value else {
        return None;
    };
    if dms.len() != DMS_DIVISION.len() {
        return None;
    }

    let degrees: f64 = dms
        .iter()
        .zip(DMS_DIVISION)
        .map(|(part, division)| part.to_f64() / division)
        .sum();
    let value = match first_ascii(exif, ref_tag)? {
        b"S" | b"W" => -degrees,
        b"N" | b"E" => degrees,
        _ => return None,
    };

    (value.is_finite() && value.abs() <= max).then_some(value)
}
