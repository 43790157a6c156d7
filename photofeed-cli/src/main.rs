use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use photofeed_client::{
    CellBinder, FeedController, FeedEvent, GeoPoint, HttpImageLoader, NominatimGeocoder,
    ParseClient, PhotoFeedError, PickedPhoto, PostDraft, Publisher, RowId, RowView,
    TimeFormatter, ports::SessionProvider,
};
use tracing::info;

mod logging;
mod settings;

use logging::init_logging;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "photofeed", version, about = "CLI клиент фотоленты на Parse Server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Показать ленту, новые посты сверху.
    Feed {
        /// Сколько страниц загрузить.
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Загрузить как pull-to-refresh.
        #[arg(long)]
        refresh: bool,
    },
    /// Опубликовать фото.
    Publish {
        /// Путь к файлу изображения.
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        caption: Option<String>,
        /// Время съёмки в RFC 3339, например `2022-11-03T15:04:00Z`; по умолчанию из EXIF.
        #[arg(long)]
        taken_at: Option<DateTime<Utc>>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Текущий пользователь сессии.
    Whoami,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Oops... {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::from_env()?;
    init_logging(&settings.log_level)?;

    let client = Arc::new(
        ParseClient::new(settings.parse_config()).context("не удалось создать HTTP-клиент")?,
    );

    match cli.command {
        Command::Feed { pages, refresh } => show_feed(&settings, client, pages, refresh).await?,
        Command::Publish {
            image,
            caption,
            taken_at,
            lat,
            lon,
        } => {
            // Без --image черновик всё равно отправляется в Publisher: он сам
            // отклонит публикацию без фото.
            let photo = match image {
                Some(path) => {
                    let bytes = fs::read(&path)
                        .with_context(|| format!("не удалось прочитать {}", path.display()))?;
                    Some(with_manual_metadata(
                        PickedPhoto::from_bytes(bytes),
                        taken_at,
                        lat.zip(lon),
                    ))
                }
                None => None,
            };

            let author = client.current_user().await.map_err(map_client_error)?;
            let publisher =
                Publisher::new(Arc::clone(&client), Arc::clone(&client)).with_author(author);
            let post = publisher
                .publish(PostDraft { photo, caption })
                .await
                .map_err(map_client_error)?;

            println!("Пост опубликован");
            println!("id: {}", post.id());
            if let Some(created_at) = post.created_at() {
                println!("created_at: {created_at}");
            }
            if let Some(url) = post.image_url() {
                println!("image: {url}");
            }
        }
        Command::Whoami => match client.current_user().await.map_err(map_client_error)? {
            Some(user) => println!("{} (id={})", user.username, user.id),
            None => println!("Сессия не задана: укажите PARSE_SESSION_TOKEN"),
        },
    }

    Ok(())
}

async fn show_feed(
    settings: &Settings,
    client: Arc<ParseClient>,
    pages: u32,
    refresh: bool,
) -> Result<()> {
    let images = Arc::new(HttpImageLoader::new(settings.http_timeout())?);
    let geocoder = Arc::new(NominatimGeocoder::new(
        &settings.geocoder_url,
        settings.http_timeout(),
    )?);
    let formatter = TimeFormatter::new(&settings.time_format, settings.utc_offset()?)?;

    let mut feed = FeedController::new(client, settings.feed_config());
    let mut binder = CellBinder::new(images, geocoder, formatter);
    let rows: Vec<RowId> = (0..settings.feed_row_pool)
        .map(|_| binder.add_row())
        .collect();

    if refresh {
        feed.refresh();
    } else {
        feed.load_initial();
    }

    let mut pages_loaded = 0;
    let mut rendered = 0;
    while let Some(event) = feed.next_event().await {
        match event {
            FeedEvent::PageLoaded {
                offset,
                received,
                has_more,
            } => {
                pages_loaded += 1;
                info!(offset, received, has_more, "feed page loaded");
            }
            FeedEvent::LoadFailed { message } => {
                return Err(anyhow::anyhow!(message));
            }
            FeedEvent::StaleDiscarded { .. } => continue,
        }

        let mut batch_start = rendered;
        while rendered < feed.posts().len() {
            let row = rows[rendered % rows.len()];
            binder.unbind(row);
            binder.bind(row, &feed.posts()[rendered])?;
            rendered += 1;

            // Пул строк исчерпан: дожидаемся строк и печатаем их до переиспользования.
            if rendered % rows.len() == 0 || rendered == feed.posts().len() {
                while binder.next_change().await.is_some() {}
                for index in batch_start..rendered {
                    if let Some(view) = binder.view(rows[index % rows.len()]) {
                        print_row(index, view);
                    }
                }
                batch_start = rendered;
            }

            if pages_loaded < pages {
                feed.row_will_display(rendered - 1);
            }
        }
    }

    if feed.posts().is_empty() {
        println!("Постов пока нет");
    } else if !feed.state().has_more() {
        println!("Это все посты ({})", feed.posts().len());
    }
    Ok(())
}

/// Флаги командной строки важнее EXIF файла.
fn with_manual_metadata(
    mut photo: PickedPhoto,
    taken_at: Option<DateTime<Utc>>,
    coordinates: Option<(f64, f64)>,
) -> PickedPhoto {
    if taken_at.is_some() {
        photo.taken_at = taken_at;
    }
    if let Some((latitude, longitude)) = coordinates {
        photo.location = Some(GeoPoint {
            latitude,
            longitude,
        });
    }
    photo
}

fn print_row(index: usize, view: &RowView) {
    let image = view
        .image
        .as_ref()
        .map(|image| format!("{} ({} bytes)", image.content_type(), image.bytes.len()))
        .unwrap_or_else(|| "no image".to_string());

    println!(
        "[{index}] {} | {} | {} | {image}",
        view.author, view.caption, view.time_label
    );
}

fn map_client_error(err: PhotoFeedError) -> anyhow::Error {
    let message = match err {
        PhotoFeedError::Unauthorized => {
            "требуется авторизация: проверьте PARSE_SESSION_TOKEN и ключи приложения".to_string()
        }
        PhotoFeedError::NotFound => "ресурс не найден".to_string(),
        PhotoFeedError::Backend { message, .. } => message,
        PhotoFeedError::Validation(message) => message,
        PhotoFeedError::Http(err) => format!("ошибка HTTP: {err}"),
        PhotoFeedError::Decode(message) => format!("некорректный ответ сервера: {message}"),
        PhotoFeedError::Geocode(message) => format!("ошибка геокодирования: {message}"),
        PhotoFeedError::Image(message) => format!("ошибка изображения: {message}"),
    };
    anyhow::anyhow!(message)
}
