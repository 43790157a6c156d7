//! Лента постов с постраничной загрузкой.
//!
//! `FeedState` — чистый автомат состояния ленты, `FeedController` запускает
//! запросы к [`PostStore`] и применяет их результаты в задаче-владельце.
//! Каждый запрос помечается поколением: `load_initial`/`refresh` начинают
//! новое поколение, и ответы предыдущих поколений отбрасываются.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::PhotoFeedResult;
use crate::models::{DEFAULT_PAGE_SIZE, FeedPageRequest, Post};
use crate::ports::PostStore;

/// За сколько строк до конца списка подгружать следующую страницу.
pub const DEFAULT_LOOKAHEAD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Параметры пагинации ленты.
pub struct FeedConfig {
    /// Размер страницы.
    pub page_size: u32,
    /// Порог подгрузки в строках от конца списка.
    pub lookahead: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Выданный запрос страницы вместе с поколением, для которого он выдан.
pub struct FetchTicket {
    /// Поколение ленты на момент выдачи.
    pub generation: u64,
    /// Параметры запроса.
    pub request: FeedPageRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Результат применения ответа к ленте.
pub enum FeedEvent {
    /// Страница применена.
    PageLoaded {
        /// Смещение страницы.
        offset: u32,
        /// Сколько записей пришло.
        received: usize,
        /// Есть ли ещё страницы.
        has_more: bool,
    },
    /// Запрос завершился ошибкой; текст предназначен пользователю.
    LoadFailed {
        /// Описание ошибки.
        message: String,
    },
    /// Ответ устаревшего поколения, лента не изменена.
    StaleDiscarded {
        /// Поколение отброшенного ответа.
        generation: u64,
    },
}

#[derive(Debug)]
/// Состояние ленты: посты и флаги загрузки.
pub struct FeedState {
    config: FeedConfig,
    posts: Vec<Post>,
    is_loading: bool,
    has_more: bool,
    is_refreshing: bool,
    generation: u64,
}

impl FeedState {
    /// Пустая лента; размер страницы не меньше 1.
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config: FeedConfig {
                page_size: config.page_size.max(1),
                lookahead: config.lookahead,
            },
            posts: Vec::new(),
            is_loading: false,
            has_more: true,
            is_refreshing: false,
            generation: 0,
        }
    }

    /// Посты в порядке показа.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Идёт ли запрос страницы.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Остались ли ещё страницы.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Показывать ли индикатор pull-to-refresh.
    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing
    }

    /// Текущее поколение ленты.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Параметры пагинации.
    pub fn config(&self) -> FeedConfig {
        self.config
    }

    /// Сбрасывает ленту и выдаёт запрос первой страницы нового поколения.
    ///
    /// Список очищается сразу, не дожидаясь ответа.
    pub fn begin_initial(&mut self) -> FetchTicket {
        self.generation += 1;
        self.posts.clear();
        self.has_more = true;
        self.is_loading = true;
        self.ticket(0)
    }

    /// То же, что [`FeedState::begin_initial`], но с индикатором обновления.
    pub fn begin_refresh(&mut self) -> FetchTicket {
        self.is_refreshing = true;
        self.begin_initial()
    }

    /// Выдаёт запрос следующей страницы, если ничего не грузится и страницы
    /// ещё есть.
    pub fn begin_more(&mut self) -> Option<FetchTicket> {
        if self.is_loading || !self.has_more {
            return None;
        }
        self.is_loading = true;
        let offset = u32::try_from(self.posts.len()).unwrap_or(u32::MAX);
        Some(self.ticket(offset))
    }

    /// Попадает ли строка `index` в порог подгрузки.
    pub fn should_load_more(&self, index: usize) -> bool {
        index + self.config.lookahead >= self.posts.len()
    }

    /// Применяет ответ на запрос `ticket`.
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        result: PhotoFeedResult<Vec<Post>>,
    ) -> FeedEvent {
        if ticket.generation != self.generation {
            return FeedEvent::StaleDiscarded {
                generation: ticket.generation,
            };
        }

        self.is_loading = false;
        self.is_refreshing = false;

        match result {
            Ok(page) => {
                let received = page.len();
                if ticket.request.offset == 0 {
                    self.posts = page;
                } else {
                    self.posts.extend(page);
                }
                self.has_more = received >= ticket.request.limit as usize;
                FeedEvent::PageLoaded {
                    offset: ticket.request.offset,
                    received,
                    has_more: self.has_more,
                }
            }
            Err(err) => FeedEvent::LoadFailed {
                message: err.to_string(),
            },
        }
    }

    fn ticket(&self, offset: u32) -> FetchTicket {
        FetchTicket {
            generation: self.generation,
            request: FeedPageRequest::page(offset, self.config.page_size),
        }
    }
}

struct Completion {
    ticket: FetchTicket,
    result: PhotoFeedResult<Vec<Post>>,
}

/// Контроллер ленты: единственный владелец [`FeedState`].
///
/// Запросы выполняются в фоновых задачах tokio, а результаты приходят через
/// канал и применяются только в [`FeedController::next_event`] и
/// [`FeedController::drain_events`], то есть в задаче, которая владеет
/// контроллером.
pub struct FeedController<S: PostStore + ?Sized + 'static> {
    store: Arc<S>,
    state: FeedState,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl<S: PostStore + ?Sized + 'static> FeedController<S> {
    /// Создаёт контроллер поверх хранилища постов.
    pub fn new(store: Arc<S>, config: FeedConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            store,
            state: FeedState::new(config),
            completions_tx,
            completions_rx,
            in_flight: 0,
        }
    }

    /// Состояние ленты.
    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// Посты ленты.
    pub fn posts(&self) -> &[Post] {
        self.state.posts()
    }

    /// Есть ли запросы, ответы на которые ещё не применены.
    pub fn has_pending(&self) -> bool {
        self.in_flight > 0
    }

    /// Сбрасывает ленту и запрашивает первую страницу.
    pub fn load_initial(&mut self) {
        let ticket = self.state.begin_initial();
        self.issue(ticket);
    }

    /// Обновление жестом pull-to-refresh.
    pub fn refresh(&mut self) {
        let ticket = self.state.begin_refresh();
        self.issue(ticket);
    }

    /// Запрашивает следующую страницу; `false`, если запрос не нужен.
    pub fn load_more(&mut self) -> bool {
        match self.state.begin_more() {
            Some(ticket) => {
                self.issue(ticket);
                true
            }
            None => false,
        }
    }

    /// Вызывается при отрисовке строки `index`, подгружает следующую
    /// страницу у конца списка.
    pub fn row_will_display(&mut self, index: usize) -> bool {
        if !self.state.should_load_more(index) {
            return false;
        }
        self.load_more()
    }

    /// Ждёт ближайший ответ и применяет его. `None`, если запросов нет.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        Some(self.apply(completion))
    }

    /// Применяет все уже пришедшие ответы, не дожидаясь остальных.
    pub fn drain_events(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            events.push(self.apply(completion));
        }
        events
    }

    fn apply(&mut self, completion: Completion) -> FeedEvent {
        self.in_flight = self.in_flight.saturating_sub(1);
        let event = self.state.complete(&completion.ticket, completion.result);
        if let FeedEvent::StaleDiscarded { generation } = &event {
            debug!(
                generation,
                current = self.state.generation(),
                "discarded stale feed page"
            );
        }
        event
    }

    fn issue(&mut self, ticket: FetchTicket) {
        debug!(
            generation = ticket.generation,
            offset = ticket.request.offset,
            limit = ticket.request.limit,
            "fetching feed page"
        );
        self.in_flight += 1;

        let store = Arc::clone(&self.store);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = store.list_posts(ticket.request.clone()).await;
            // Получатель живёт в контроллере; если контроллер удалён, ответ не нужен.
            let _ = tx.send(Completion { ticket, result });
        });
    }
}
