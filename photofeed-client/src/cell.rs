//! Привязка постов к переиспользуемым строкам ленты.
//!
//! У каждой строки есть поколение привязки. `bind`/`unbind` увеличивают его и
//! отменяют фоновые задачи строки; результат задачи применяется, только если
//! поколение строки не изменилось с момента её запуска.

use std::future::Future;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::{PhotoFeedError, PhotoFeedResult};
use crate::geocode::place_string;
use crate::media::Image;
use crate::models::{Placemark, Post};
use crate::ports::{Geocoder, ImageLoader};

/// Формат времени в подписи по умолчанию, например `3:04 PM`.
pub const DEFAULT_TIME_FORMAT: &str = "%-I:%M %p";

const LABEL_SEPARATOR: &str = " • ";

#[derive(Debug, Clone)]
/// Форматирование времени поста в заданном часовом поясе.
pub struct TimeFormatter {
    format: String,
    offset: FixedOffset,
}

impl TimeFormatter {
    /// Проверяет строку формата `strftime` заранее, чтобы форматирование не
    /// падало при отрисовке.
    pub fn new(format: impl Into<String>, offset: FixedOffset) -> PhotoFeedResult<Self> {
        let format = format.into();
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(PhotoFeedError::Validation(format!(
                "invalid time format: {format}"
            )));
        }
        Ok(Self { format, offset })
    }

    /// Время в настроенном поясе и формате.
    pub fn format(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.offset)
            .format(&self.format)
            .to_string()
    }
}

impl Default for TimeFormatter {
    fn default() -> Self {
        Self {
            format: DEFAULT_TIME_FORMAT.to_string(),
            offset: Utc.fix(),
        }
    }
}

/// Подпись строки: время и, если известно, место через `" • "`.
pub fn compose_label(time_text: &str, place: &str) -> String {
    match (time_text.is_empty(), place.is_empty()) {
        (_, true) => time_text.to_string(),
        (true, false) => place.to_string(),
        (false, false) => format!("{time_text}{LABEL_SEPARATOR}{place}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Индекс строки в пуле строк [`CellBinder`].
pub struct RowId(usize);

impl RowId {
    /// Позиция строки в пуле.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Видимое содержимое строки.
pub struct RowView {
    /// Имя автора; пустое, если автор не развёрнут.
    pub author: String,
    /// Подпись к фото.
    pub caption: String,
    /// Время и место.
    pub time_label: String,
    /// Фото; `None`, пока не загружено или не удалось загрузить.
    pub image: Option<Image>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Что произошло со строкой после применения результата фоновой задачи.
pub enum RowChange {
    /// Фото установлено.
    ImageSet(RowId),
    /// Фото не загрузилось, строка осталась без фото.
    ImageFailed(RowId),
    /// К подписи добавлено место.
    LabelSet(RowId),
    /// Место не определено, подпись осталась временем.
    LabelUnchanged(RowId),
    /// Строка уже привязана к другому посту, результат отброшен.
    Discarded(RowId),
}

#[derive(Debug)]
enum RowPayload {
    Image(PhotoFeedResult<Image>),
    Place(PhotoFeedResult<Vec<Placemark>>),
}

#[derive(Debug)]
struct RowUpdate {
    row: RowId,
    generation: u64,
    task: u64,
    payload: RowPayload,
}

#[derive(Debug, Default)]
struct RowSlot {
    generation: u64,
    bound_post: Option<String>,
    base_label: String,
    view: RowView,
    // Задачи, результат которых ещё не применён.
    tasks: Vec<(u64, AbortHandle)>,
}

impl RowSlot {
    fn cancel(&mut self) {
        for (_, task) in self.tasks.drain(..) {
            task.abort();
        }
        self.generation += 1;
    }
}

/// Привязывает посты к строкам и асинхронно догружает фото и место.
pub struct CellBinder<I, G>
where
    I: ImageLoader + ?Sized + 'static,
    G: Geocoder + ?Sized + 'static,
{
    images: Arc<I>,
    geocoder: Arc<G>,
    formatter: TimeFormatter,
    rows: Vec<RowSlot>,
    next_task: u64,
    updates_tx: mpsc::UnboundedSender<RowUpdate>,
    updates_rx: mpsc::UnboundedReceiver<RowUpdate>,
}

impl<I, G> CellBinder<I, G>
where
    I: ImageLoader + ?Sized + 'static,
    G: Geocoder + ?Sized + 'static,
{
    /// Создаёт binder без строк; строки добавляются через [`CellBinder::add_row`].
    pub fn new(images: Arc<I>, geocoder: Arc<G>, formatter: TimeFormatter) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            images,
            geocoder,
            formatter,
            rows: Vec::new(),
            next_task: 0,
            updates_tx,
            updates_rx,
        }
    }

    /// Добавляет пустую строку в пул.
    pub fn add_row(&mut self) -> RowId {
        self.rows.push(RowSlot::default());
        RowId(self.rows.len() - 1)
    }

    /// Текущее содержимое строки.
    pub fn view(&self, row: RowId) -> Option<&RowView> {
        self.rows.get(row.0).map(|slot| &slot.view)
    }

    /// Идентификатор поста, к которому сейчас привязана строка.
    pub fn bound_post(&self, row: RowId) -> Option<&str> {
        self.rows.get(row.0).and_then(|slot| slot.bound_post.as_deref())
    }

    /// Привязывает пост к строке.
    ///
    /// Отменяет прежние задачи строки, сразу выставляет автора, подпись и
    /// время, очищает фото и запускает загрузку фото и геокодирование.
    pub fn bind(&mut self, row: RowId, post: &Post) -> PhotoFeedResult<()> {
        let slot = self.rows.get_mut(row.0).ok_or(PhotoFeedError::NotFound)?;
        slot.cancel();
        let generation = slot.generation;

        slot.bound_post = Some(post.id().to_string());
        slot.view.author = post
            .author
            .as_ref()
            .map(|user| user.username.clone())
            .unwrap_or_default();
        slot.view.caption = post.caption.clone().unwrap_or_default();
        slot.base_label = post
            .display_time()
            .map(|time| self.formatter.format(time))
            .unwrap_or_default();
        slot.view.time_label = slot.base_label.clone();
        slot.view.image = None;

        if let Some(url) = post.image_url() {
            let images = Arc::clone(&self.images);
            let url = url.to_string();
            self.next_task += 1;
            let task = self.next_task;
            let work = async move { RowPayload::Image(images.load(&url).await) };
            let handle = spawn_update(self.updates_tx.clone(), row, generation, task, work);
            slot.tasks.push((task, handle));
        }

        if let Some(point) = post.location {
            let geocoder = Arc::clone(&self.geocoder);
            self.next_task += 1;
            let task = self.next_task;
            let work = async move { RowPayload::Place(geocoder.reverse(point).await) };
            let handle = spawn_update(self.updates_tx.clone(), row, generation, task, work);
            slot.tasks.push((task, handle));
        }

        Ok(())
    }

    /// Отвязывает строку перед переиспользованием: отменяет задачи и
    /// очищает фото.
    pub fn unbind(&mut self, row: RowId) {
        if let Some(slot) = self.rows.get_mut(row.0) {
            slot.cancel();
            slot.bound_post = None;
            slot.view.image = None;
        }
    }

    /// Есть ли незавершённые задачи у текущих привязок.
    pub fn has_pending(&self) -> bool {
        self.rows
            .iter()
            .any(|slot| slot.tasks.iter().any(|(_, task)| !task.is_finished()))
    }

    /// Ждёт ближайший результат и применяет его. `None`, если ждать нечего.
    pub async fn next_change(&mut self) -> Option<RowChange> {
        if let Ok(update) = self.updates_rx.try_recv() {
            return Some(self.apply(update));
        }
        // Завершённая задача уже отправила результат.
        if !self.has_pending() {
            let update = self.updates_rx.try_recv().ok()?;
            return Some(self.apply(update));
        }
        let update = self.updates_rx.recv().await?;
        Some(self.apply(update))
    }

    /// Применяет все уже пришедшие результаты.
    pub fn drain_changes(&mut self) -> Vec<RowChange> {
        let mut changes = Vec::new();
        while let Ok(update) = self.updates_rx.try_recv() {
            changes.push(self.apply(update));
        }
        changes
    }

    fn apply(&mut self, update: RowUpdate) -> RowChange {
        let row = update.row;
        let Some(slot) = self.rows.get_mut(row.0) else {
            return RowChange::Discarded(row);
        };
        if slot.generation != update.generation {
            debug!(
                row = row.0,
                generation = update.generation,
                current = slot.generation,
                "discarded stale row update"
            );
            return RowChange::Discarded(row);
        }
        slot.tasks.retain(|(task, _)| *task != update.task);

        match update.payload {
            RowPayload::Image(Ok(image)) => {
                slot.view.image = Some(image);
                RowChange::ImageSet(row)
            }
            RowPayload::Image(Err(err)) => {
                warn!(
                    row = row.0,
                    post = ?slot.bound_post,
                    error = %err,
                    "failed to load post image"
                );
                RowChange::ImageFailed(row)
            }
            RowPayload::Place(Ok(placemarks)) => {
                let place = placemarks.first().map(place_string).unwrap_or_default();
                if place.is_empty() {
                    return RowChange::LabelUnchanged(row);
                }
                slot.view.time_label = compose_label(&slot.base_label, &place);
                RowChange::LabelSet(row)
            }
            RowPayload::Place(Err(err)) => {
                warn!(row = row.0, post = ?slot.bound_post, error = %err, "reverse geocode failed");
                RowChange::LabelUnchanged(row)
            }
        }
    }
}

fn spawn_update<F>(
    tx: mpsc::UnboundedSender<RowUpdate>,
    row: RowId,
    generation: u64,
    task: u64,
    work: F,
) -> AbortHandle
where
    F: Future<Output = RowPayload> + Send + 'static,
{
    tokio::spawn(async move {
        let payload = work.await;
        let _ = tx.send(RowUpdate {
            row,
            generation,
            task,
            payload,
        });
    })
    .abort_handle()
}
