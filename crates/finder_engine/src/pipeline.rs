//! Paginated search, per-item enrichment and event delivery for one run.
//!
//! A run asks for the upstream total of every genre, then pages through each
//! genre in query order and enriches every playlist with its detail and
//! owner. Cancellation is checked before every total lookup, page fetch and
//! item, so at most the item in flight completes after a cancel is
//! observed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use finder_logging::{finder_debug, finder_error, finder_info, finder_warn};
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogClient, CatalogConnector};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sink::{ChannelResultSink, ResultSink};
use crate::{
    CatalogError, CredentialStore, Credentials, EnrichedRecord, FailureKind, FinishReason,
    PipelineConfig, PipelineEvent, PlaylistSummary, Query, RunError, RunId, RunOutcome,
    RunProgress, StartError, TotalEstimate,
};

/// Owns the collaborators for runs and enforces one active run at a time.
pub struct Pipeline {
    config: PipelineConfig,
    credentials: Arc<dyn CredentialStore>,
    connector: Arc<dyn CatalogConnector>,
    active: Arc<AtomicBool>,
    last_run_id: AtomicU64,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn CatalogConnector>,
    ) -> Self {
        Self {
            config,
            credentials,
            connector,
            active: Arc::new(AtomicBool::new(false)),
            last_run_id: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Validates configuration and credentials, then runs `query` on a
    /// dedicated background thread.
    ///
    /// Returns before any network call. Every started run delivers exactly one
    /// [`PipelineEvent::Finished`] through the handle.
    pub fn start(&self, query: Query) -> Result<RunHandle, StartError> {
        self.config.validate()?;
        let credentials = self.credentials.load()?;

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StartError::AlreadyRunning);
        }
        let active = ActiveGuard::new(self.active.clone());

        let run_id = self.last_run_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = RunCanceller::new();

        let background = BackgroundRun {
            run_id,
            query,
            credentials,
            config: self.config.clone(),
            connector: self.connector.clone(),
            cancel: cancel.clone(),
            sink: RunSink {
                inner: ChannelResultSink::new(event_tx),
                active,
            },
        };

        // A failed spawn drops the closure, and with it the active guard.
        thread::Builder::new()
            .name(format!("finder-run-{run_id}"))
            .spawn(move || background.run())
            .map_err(StartError::Spawn)?;

        Ok(RunHandle {
            run_id,
            cancel,
            event_rx,
        })
    }
}

/// Caller side of a run: the event stream plus the cancellation signal.
pub struct RunHandle {
    run_id: RunId,
    cancel: RunCanceller,
    event_rx: mpsc::Receiver<PipelineEvent>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Requests a cooperative stop. The run confirms with `Finished(Cancelled)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn canceller(&self) -> RunCanceller {
        self.cancel.clone()
    }

    /// Blocks for the next event; `None` once the run thread has exited and
    /// every event was drained.
    pub fn recv(&self) -> Option<PipelineEvent> {
        self.event_rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<PipelineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

/// Cloneable cancel signal that can be moved to another thread.
#[derive(Debug, Clone, Default)]
pub struct RunCanceller {
    token: CancellationToken,
}

impl RunCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Holds the pipeline's single run slot; frees it at most once.
struct ActiveGuard {
    flag: Arc<AtomicBool>,
    released: AtomicBool,
}

impl ActiveGuard {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            released: AtomicBool::new(false),
        }
    }

    /// Once released, the slot may already belong to the next run.
    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.flag.store(false, Ordering::Release);
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Frees the pipeline slot before the terminal event goes out, so a caller
/// reacting to `Finished` can start the next run straight away.
struct RunSink {
    inner: ChannelResultSink,
    active: ActiveGuard,
}

impl ResultSink for RunSink {
    fn emit(&self, event: PipelineEvent) {
        if matches!(event, PipelineEvent::Finished(_)) {
            self.active.release();
        }
        self.inner.emit(event);
    }
}

struct BackgroundRun {
    run_id: RunId,
    query: Query,
    credentials: Credentials,
    config: PipelineConfig,
    connector: Arc<dyn CatalogConnector>,
    cancel: RunCanceller,
    sink: RunSink,
}

impl BackgroundRun {
    fn run(self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                finder_error!("run {} could not build a runtime: {}", self.run_id, err);
                let outcome = RunOutcome {
                    run_id: self.run_id,
                    reason: FinishReason::Failed(RunError::new(
                        FailureKind::Runtime,
                        err.to_string(),
                    )),
                    records_emitted: 0,
                    items_skipped: 0,
                };
                self.sink.emit(PipelineEvent::Finished(outcome));
                return;
            }
        };

        runtime.block_on(async {
            let catalog = match self.connector.connect(&self.credentials).await {
                Ok(catalog) => catalog,
                Err(err) => {
                    finder_error!("run {} could not open a catalog session: {}", self.run_id, err);
                    let outcome = RunOutcome {
                        run_id: self.run_id,
                        reason: FinishReason::Failed(run_error(&err)),
                        records_emitted: 0,
                        items_skipped: 0,
                    };
                    self.sink.emit(PipelineEvent::Finished(outcome));
                    return;
                }
            };
            execute_run(
                catalog.as_ref(),
                &self.query,
                &self.config,
                &self.cancel,
                self.run_id,
                &self.sink,
            )
            .await;
        });
    }
}

/// Bookkeeping for one run; lives only as long as the run.
struct RunState {
    run_id: RunId,
    offsets: Vec<u32>,
    total_expected: Option<u64>,
    records_emitted: u64,
    items_processed: u64,
    items_skipped: u64,
    cancelled: bool,
}

impl RunState {
    fn new(run_id: RunId, query: &Query) -> Self {
        Self {
            run_id,
            offsets: vec![0; query.genres().len()],
            total_expected: None,
            records_emitted: 0,
            items_processed: 0,
            items_skipped: 0,
            cancelled: false,
        }
    }

    /// Cancellation checkpoint.
    fn observe_cancel(&mut self, cancel: &RunCanceller) -> bool {
        if cancel.is_cancelled() {
            self.cancelled = true;
        }
        self.cancelled
    }

    fn progress(&mut self) -> PipelineEvent {
        self.items_processed += 1;
        PipelineEvent::Progress(RunProgress {
            run_id: self.run_id,
            delta: 1,
            processed: self.items_processed,
        })
    }
}

enum ItemFailure {
    Skip(CatalogError),
    Fatal(RunError),
}

/// Runs `query` against an already connected catalog, emitting every event
/// (including the terminal `Finished`) into `sink`.
pub async fn execute_run(
    catalog: &dyn CatalogClient,
    query: &Query,
    config: &PipelineConfig,
    cancel: &RunCanceller,
    run_id: RunId,
    sink: &dyn ResultSink,
) -> RunOutcome {
    finder_info!(
        "run {} started genres={:?} page_size={}",
        run_id,
        query.genres(),
        config.page_size
    );
    let mut state = RunState::new(run_id, query);

    let reason = match drive(catalog, query, config, cancel, sink, &mut state).await {
        Ok(()) if state.cancelled => FinishReason::Cancelled,
        Ok(()) => FinishReason::Completed,
        Err(err) => {
            finder_error!("run {} failed: {}", run_id, err);
            FinishReason::Failed(err)
        }
    };

    let outcome = RunOutcome {
        run_id,
        reason,
        records_emitted: state.records_emitted,
        items_skipped: state.items_skipped,
    };
    finder_info!(
        "run {} finished reason={:?} records={} skipped={} expected={:?}",
        run_id,
        outcome.reason,
        outcome.records_emitted,
        outcome.items_skipped,
        state.total_expected
    );
    sink.emit(PipelineEvent::Finished(outcome.clone()));
    outcome
}

async fn drive(
    catalog: &dyn CatalogClient,
    query: &Query,
    config: &PipelineConfig,
    cancel: &RunCanceller,
    sink: &dyn ResultSink,
    state: &mut RunState,
) -> Result<(), RunError> {
    if let Some(count) = count_totals(catalog, query, config, cancel, state).await? {
        state.total_expected = Some(count);
        sink.emit(PipelineEvent::TotalKnown(TotalEstimate {
            count,
            per_item: config.per_item_latency,
        }));
    }

    let retry = config.retry_policy();
    for (index, genre) in query.genres().iter().enumerate() {
        loop {
            if state.observe_cancel(cancel) {
                return Ok(());
            }
            let offset = state.offsets[index];
            if config
                .max_offset
                .is_some_and(|max| offset.saturating_add(config.page_size) > max)
            {
                finder_debug!("genre {:?} reached offset cap at {}", genre, offset);
                break;
            }

            let page = match retry_with_backoff(&retry, cancel, move || {
                catalog.search(genre, config.page_size, offset)
            })
            .await
            {
                Ok(page) => page,
                Err(_) if state.observe_cancel(cancel) => return Ok(()),
                Err(err) => return Err(run_error(&err)),
            };
            finder_debug!(
                "genre {:?} offset={} items={} total={}",
                genre,
                offset,
                page.items.len(),
                page.total
            );
            if page.is_exhausted() {
                break;
            }
            if page.dropped_entries > 0 {
                finder_warn!(
                    "genre {:?} offset={} dropped {} empty entries",
                    genre,
                    offset,
                    page.dropped_entries
                );
            }

            for summary in &page.items {
                if state.observe_cancel(cancel) {
                    return Ok(());
                }
                match enrich(catalog, &retry, cancel, summary).await {
                    Ok(record) => {
                        sink.emit(state.progress());
                        sink.emit(PipelineEvent::Record(record));
                        state.records_emitted += 1;
                    }
                    Err(ItemFailure::Skip(_)) if state.observe_cancel(cancel) => return Ok(()),
                    Err(ItemFailure::Skip(err)) => {
                        finder_warn!("skipping playlist {}: {}", summary.id, err);
                        state.items_skipped += 1;
                        sink.emit(state.progress());
                    }
                    Err(ItemFailure::Fatal(err)) => return Err(err),
                }
                courtesy_delay(config.item_delay, cancel).await;
            }

            state.offsets[index] = offset.saturating_add(config.page_size);
        }
    }
    Ok(())
}

/// One `limit = 1` search per genre; `None` when any lookup failed or the run
/// was cancelled, so a partial sum is never reported.
async fn count_totals(
    catalog: &dyn CatalogClient,
    query: &Query,
    config: &PipelineConfig,
    cancel: &RunCanceller,
    state: &mut RunState,
) -> Result<Option<u64>, RunError> {
    let retry = config.retry_policy();
    let mut total = 0u64;
    for genre in query.genres() {
        if state.observe_cancel(cancel) {
            return Ok(None);
        }
        let genre = genre.as_str();
        match retry_with_backoff(&retry, cancel, move || catalog.search(genre, 1, 0)).await {
            Ok(page) => total = total.saturating_add(page.total),
            Err(_) if state.observe_cancel(cancel) => return Ok(None),
            Err(err @ CatalogError::Auth { .. }) => return Err(run_error(&err)),
            Err(err) => {
                finder_warn!("total count for {:?} failed, no estimate: {}", genre, err);
                return Ok(None);
            }
        }
    }
    Ok(Some(total))
}

async fn enrich(
    catalog: &dyn CatalogClient,
    retry: &RetryPolicy,
    cancel: &RunCanceller,
    summary: &PlaylistSummary,
) -> Result<EnrichedRecord, ItemFailure> {
    let playlist_id = summary.id.as_str();
    let detail = match retry_with_backoff(retry, cancel, move || {
        catalog.playlist_detail(playlist_id)
    })
    .await
    {
        Ok(detail) => detail,
        Err(err @ CatalogError::Auth { .. }) => return Err(ItemFailure::Fatal(run_error(&err))),
        Err(err) => return Err(ItemFailure::Skip(err)),
    };

    let owner_id = detail.owner.id.as_str();
    let owner = match retry_with_backoff(retry, cancel, move || catalog.user(owner_id)).await {
        Ok(profile) => Some(profile),
        Err(err @ CatalogError::Auth { .. }) => return Err(ItemFailure::Fatal(run_error(&err))),
        Err(err) => {
            finder_warn!("owner {} lookup failed, email unknown: {}", owner_id, err);
            None
        }
    };

    Ok(EnrichedRecord::from_lookups(detail, owner))
}

async fn courtesy_delay(delay: Duration, cancel: &RunCanceller) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {}
    }
}

fn run_error(err: &CatalogError) -> RunError {
    let kind = match err {
        CatalogError::Auth { .. } => FailureKind::Auth,
        CatalogError::Transient { .. } => FailureKind::Network,
        CatalogError::NotFound { .. }
        | CatalogError::UnexpectedStatus { .. }
        | CatalogError::Decode { .. } => FailureKind::Protocol,
        CatalogError::InvalidUrl(_) => FailureKind::Runtime,
    };
    RunError::new(kind, err.to_string())
}
