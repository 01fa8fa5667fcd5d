use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use crate::query_runner::{QueryRunnerError, Row};
use crate::settings::{clamp_page_size, GridSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Loading,
    Error,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LoadError {
    message: String,
}

impl LoadError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<QueryRunnerError> for LoadError {
    fn from(error: QueryRunnerError) -> Self {
        Self::new(error.message())
    }
}

/// Where a grid's rows come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Whether a page query can be produced at all.
    fn is_available(&self) -> bool {
        true
    }

    async fn load_page(&self, offset: u64, limit: u64) -> Result<Vec<Row>, LoadError>;

    /// Total row count, `None` when it cannot be determined.
    async fn load_row_count(&self) -> Option<u64>;
}

/// Lets the grid presentation veto paging, for example during a macro
/// preview.
pub trait PagingGate {
    fn disable_load_next_page(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyLoading,
    Complete,
    Errored,
    Unavailable,
    Vetoed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { rows: usize, complete: bool },
    Skipped(SkipReason),
    /// A reload happened while the fetch was in flight; its result was dropped.
    Stale,
    Failed {
        message: String,
        newly_surfaced: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSnapshot {
    pub state: LoaderState,
    pub loaded_rows: usize,
    pub total_rows: Option<u64>,
    pub error_message: Option<String>,
    pub loaded_time: u128,
}

const MAX_TRACKED_ERRORS: usize = 64;

/// Surfaces each distinct, non-blank error text once. Only the most recent
/// texts are remembered.
#[derive(Debug, Default)]
pub struct ErrorDeduplicator {
    surfaced: VecDeque<String>,
}

impl ErrorDeduplicator {
    pub fn should_surface(&mut self, message: &str) -> bool {
        let message = message.trim();
        if message.is_empty() || self.surfaced.iter().any(|seen| seen == message) {
            return false;
        }
        if self.surfaced.len() == MAX_TRACKED_ERRORS {
            self.surfaced.pop_front();
        }
        self.surfaced.push_back(message.to_string());
        true
    }
}

#[must_use]
pub fn unix_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

#[derive(Debug)]
struct LoaderInner {
    state: LoaderState,
    rows: Arc<Vec<Row>>,
    total_rows: Option<u64>,
    /// Count supplied by the owner of the grid; never queried.
    known_total: Option<u64>,
    count_requested: bool,
    error_message: Option<String>,
    load_token: u64,
    loaded_time: u128,
    errors: ErrorDeduplicator,
}

impl LoaderInner {
    fn reset(&mut self, loaded_time: u128) {
        self.state = LoaderState::Idle;
        self.rows = Arc::new(Vec::new());
        self.total_rows = self.known_total;
        self.count_requested = self.known_total.is_some();
        self.error_message = None;
        self.load_token += 1;
        self.loaded_time = loaded_time;
    }

    fn reached_total(&self) -> bool {
        self.total_rows
            .is_some_and(|total| self.rows.len() as u64 >= total)
    }

    fn complete(&mut self) {
        self.state = LoaderState::Complete;
        if self.total_rows.is_none() {
            self.total_rows = Some(self.rows.len() as u64);
        }
    }
}

/// Incremental, page-at-a-time loader for one grid.
///
/// At most one page fetch is in flight. Every fetch and every reload bumps a
/// load token, and a response carrying an old token is discarded.
#[derive(Debug)]
pub struct GridLoader<S> {
    source: S,
    page_size: usize,
    inner: Mutex<LoaderInner>,
}

impl<S: PageSource> GridLoader<S> {
    #[must_use]
    pub fn new(source: S, settings: &GridSettings) -> Self {
        Self {
            source,
            page_size: settings.effective_page_size(),
            inner: Mutex::new(LoaderInner {
                state: LoaderState::Idle,
                rows: Arc::new(Vec::new()),
                total_rows: None,
                known_total: None,
                count_requested: false,
                error_message: None,
                load_token: 0,
                loaded_time: unix_timestamp_millis(),
                errors: ErrorDeduplicator::default(),
            }),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }

    #[must_use]
    pub fn with_loaded_time(self, loaded_time: u128) -> Self {
        self.lock().loaded_time = loaded_time;
        self
    }

    #[must_use]
    pub fn with_total_rows(self, total_rows: u64) -> Self {
        self.set_known_total(Some(total_rows));
        self
    }

    /// Uses a row count already known elsewhere instead of asking the source.
    /// `None` lets the next reload query the count again.
    pub fn set_known_total(&self, total_rows: Option<u64>) {
        let mut inner = self.lock();
        inner.known_total = total_rows;
        if let Some(total) = total_rows {
            inner.total_rows = Some(total);
            inner.count_requested = true;
        }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Rows loaded so far. The returned snapshot never changes; later pages
    /// produce a new vector.
    #[must_use]
    pub fn loaded_rows(&self) -> Arc<Vec<Row>> {
        Arc::clone(&self.lock().rows)
    }

    #[must_use]
    pub fn state(&self) -> LoaderState {
        self.lock().state
    }

    #[must_use]
    pub fn total_rows(&self) -> Option<u64> {
        self.lock().total_rows
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.lock().error_message.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> LoaderSnapshot {
        let inner = self.lock();
        LoaderSnapshot {
            state: inner.state,
            loaded_rows: inner.rows.len(),
            total_rows: inner.total_rows,
            error_message: inner.error_message.clone(),
            loaded_time: inner.loaded_time,
        }
    }

    pub async fn request_next_page(&self, gate: &impl PagingGate) -> LoadOutcome {
        if gate.disable_load_next_page() {
            return LoadOutcome::Skipped(SkipReason::Vetoed);
        }
        self.load_next_page().await
    }

    pub async fn load_next_page(&self) -> LoadOutcome {
        let (token, offset) = {
            let mut inner = self.lock();
            let skip = match inner.state {
                LoaderState::Loading => Some(SkipReason::AlreadyLoading),
                LoaderState::Complete => Some(SkipReason::Complete),
                LoaderState::Error => Some(SkipReason::Errored),
                LoaderState::Idle if !self.source.is_available() => Some(SkipReason::Unavailable),
                LoaderState::Idle => None,
            };
            if let Some(reason) = skip {
                return LoadOutcome::Skipped(reason);
            }
            inner.state = LoaderState::Loading;
            inner.load_token += 1;
            (inner.load_token, inner.rows.len() as u64)
        };

        let limit = self.page_size as u64;
        match self.source.load_page(offset, limit).await {
            Ok(page) => self.accept_page(token, page).await,
            Err(load_error) => self.fail(token, load_error.message()),
        }
    }

    /// Discards everything loaded and returns to idle.
    pub fn reload(&self) {
        self.lock().reset(unix_timestamp_millis());
    }

    /// Reloads when the grid was asked to refresh after it last loaded.
    pub fn apply_refresh_time(&self, refresh_time: u128) -> bool {
        self.reload_if_newer(refresh_time)
    }

    /// Reloads when a master grid loaded after this grid did.
    pub fn apply_master_loaded_time(&self, master_loaded_time: u128) -> bool {
        self.reload_if_newer(master_loaded_time)
    }

    fn reload_if_newer(&self, signal: u128) -> bool {
        let mut inner = self.lock();
        if signal <= inner.loaded_time {
            return false;
        }
        inner.reset(unix_timestamp_millis().max(signal));
        true
    }

    async fn accept_page(&self, token: u64, page: Vec<Row>) -> LoadOutcome {
        let fetched = page.len();
        {
            let mut inner = self.lock();
            if inner.load_token != token {
                debug!(rows = fetched, "discarding page from a superseded load");
                return LoadOutcome::Stale;
            }
            Arc::make_mut(&mut inner.rows).extend(page);

            if fetched < self.page_size || inner.reached_total() {
                inner.complete();
                return LoadOutcome::Loaded {
                    rows: fetched,
                    complete: true,
                };
            }
            if inner.count_requested {
                inner.state = LoaderState::Idle;
                return LoadOutcome::Loaded {
                    rows: fetched,
                    complete: false,
                };
            }
            inner.count_requested = true;
        }

        let total = self.source.load_row_count().await;

        let mut inner = self.lock();
        if inner.load_token != token {
            debug!("discarding row count from a superseded load");
            return LoadOutcome::Stale;
        }
        inner.total_rows = total;
        let complete = inner.reached_total();
        if complete {
            inner.complete();
        } else {
            inner.state = LoaderState::Idle;
        }
        LoadOutcome::Loaded {
            rows: fetched,
            complete,
        }
    }

    fn fail(&self, token: u64, message: &str) -> LoadOutcome {
        let mut inner = self.lock();
        if inner.load_token != token {
            debug!(error = message, "discarding failure from a superseded load");
            return LoadOutcome::Stale;
        }
        inner.state = LoaderState::Error;
        inner.error_message = Some(message.to_string());
        let newly_surfaced = inner.errors.should_surface(message);
        if newly_surfaced {
            error!(error = message, "failed to load grid page");
        }
        LoadOutcome::Failed {
            message: message.to_string(),
            newly_surfaced,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
