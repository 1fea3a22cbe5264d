//! Sync runner
//!
//! The SyncRunner owns one remote catalog and one local store and drives
//! every entry point against them:
//! - [`SyncRunner::sync`]: reconcile every linked book
//! - [`SyncRunner::quick_link`]: link unlinked books by ISBN/ASIN
//! - [`SyncRunner::candidates`] / [`SyncRunner::apply_selections`]:
//!   the two halves of human-assisted linking
//!
//! ## Run Flow
//!
//! ```text
//!  Idle ──► Fetching ──► Reconciling ──► Reporting ──► Idle
//!              │
//!              └── Config / Fetch error: back to Idle, store untouched
//! ```
//!
//! Both fetches run concurrently and must both succeed before any book is
//! read. Per-book failures end up in the report and never abort a run.

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::index::{ProgressLookup, RemoteCatalogIndex};
use crate::linking::{
    AutoLinker, CandidateSummary, InteractiveMatcher, LinkDecision, MatchSelection,
};
use crate::mapping::{FieldMappingTable, RemoteSources};
use crate::model::{BookId, LocalRecord};
use crate::reconcile::ReconciliationEngine;
use crate::report::{LinkReport, OutcomeStatus, RecordOutcome, SyncReport};
use crate::traits::{LocalStore, RemoteCatalog, WriteOptions};

/// Detail for a linked book whose remote item is missing from the fetch
pub const ITEM_NOT_FOUND: &str = "Audiobookshelf item not found";

/// Detail for a book the auto-linker could not place
pub const NO_UNIQUE_MATCH: &str = "No unique match found";

/// Runner lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Reconciling,
    Reporting,
}

/// Events emitted by the SyncRunner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// Lifecycle transition
    StateChanged { state: RunState },

    /// Fields written to a book
    RecordUpdated { book_id: BookId, changes: usize },

    /// Book left as is
    RecordSkipped { book_id: BookId, reason: Option<String> },

    /// Book could not be written
    RecordFailed { book_id: BookId, error: String },

    /// Remote id stored on a book
    BookLinked { book_id: BookId, remote_id: String },

    /// A run aborted before touching the store
    RunFailed { error: String },

    /// A sync run completed
    RunFinished {
        updated: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Orchestrates fetch, index, reconcile and apply
///
/// ## Lifecycle
///
/// 1. Create with [`SyncRunner::new()`], which validates the configuration
/// 2. Call any entry point, as often as needed
/// 3. Drain the event receiver, or drop it
///
/// One entry point runs at a time per runner; a second concurrent call
/// returns [`Error::RunInProgress`] immediately.
pub struct SyncRunner {
    /// Remote server payloads
    catalog: Box<dyn RemoteCatalog>,

    /// Local book library
    store: Box<dyn LocalStore>,

    config: SyncConfig,

    engine: ReconciliationEngine,

    /// Held for the whole of a run
    run_lock: Mutex<()>,

    state_tx: watch::Sender<RunState>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<RunEvent>,
}

impl SyncRunner {
    /// Create a new runner with the standard field table
    ///
    /// # Returns
    ///
    /// A tuple of (runner, event_receiver) where event_receiver yields run events
    pub fn new(
        catalog: Box<dyn RemoteCatalog>,
        store: Box<dyn LocalStore>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<RunEvent>)> {
        Self::with_table(catalog, store, config, FieldMappingTable::standard())
    }

    /// Create a new runner over a custom field table
    pub fn with_table(
        catalog: Box<dyn RemoteCatalog>,
        store: Box<dyn LocalStore>,
        config: SyncConfig,
        table: FieldMappingTable,
    ) -> Result<(Self, mpsc::Receiver<RunEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.runner.event_channel_capacity);
        let (state_tx, _) = watch::channel(RunState::Idle);
        let engine = ReconciliationEngine::new(table, config.columns.clone());

        let runner = Self {
            catalog,
            store,
            config,
            engine,
            run_lock: Mutex::new(()),
            state_tx,
            event_tx,
        };

        Ok((runner, event_rx))
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    /// Configuration in use
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Check that the remote server answers
    pub async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.catalog.ping()).await
    }

    /// Reconcile every linked book against fresh remote data
    ///
    /// # Returns
    ///
    /// - `Ok(SyncReport)`: the run completed; per-book failures are inside
    /// - `Err(Error::Fetch)`: a fetch failed, nothing was written
    /// - `Err(Error::RunInProgress)`: another entry point is running
    pub async fn sync(&self) -> Result<SyncReport> {
        let _guard = self.begin()?;
        let result = self.sync_internal().await;
        self.finish(&result);
        result
    }

    async fn sync_internal(&self) -> Result<SyncReport> {
        self.set_state(RunState::Fetching);
        let (items, profile) = tokio::try_join!(
            self.bounded("library items", self.catalog.list_library_items()),
            self.bounded("user profile", self.catalog.get_profile()),
        )?;

        let index = RemoteCatalogIndex::from_payload(&items);
        let progress = ProgressLookup::from_profile(&profile);
        info!(
            "Fetched {} items and {} progress records from {}",
            index.len(),
            progress.len(),
            self.catalog.name()
        );

        self.set_state(RunState::Reconciling);
        let mut report = SyncReport::default();
        for book_id in self.store.list_books().await? {
            if let Some(outcome) = self.sync_book(book_id, &index, &progress, &profile).await {
                self.emit_outcome(&outcome);
                report.push(outcome);
            }
        }

        self.set_state(RunState::Reporting);
        if let Err(e) = self.store.flush().await {
            error!("Failed to flush local store: {}", e);
        }
        info!(
            "Sync finished: {} processed, {} updated, {} skipped, {} failed",
            report.total, report.updated, report.skipped, report.failed
        );
        self.emit_event(RunEvent::RunFinished {
            updated: report.updated,
            skipped: report.skipped,
            failed: report.failed,
        });

        Ok(report)
    }

    /// Reconcile one book; `None` for books that are not linked
    async fn sync_book(
        &self,
        book_id: BookId,
        index: &RemoteCatalogIndex,
        progress: &ProgressLookup,
        profile: &Value,
    ) -> Option<RecordOutcome> {
        let record = match self.store.read(book_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to read book {}: {}", book_id, e);
                return Some(RecordOutcome::failed(
                    book_id,
                    format!("Book {}", book_id),
                    e.to_string(),
                ));
            }
        };

        let remote_id = record.remote_id()?;
        let title = record.display_title();

        let Some(item) = index.get(remote_id) else {
            debug!("{}", Error::no_matching_remote_item(remote_id));
            return Some(RecordOutcome::skipped(book_id, title).with_detail(ITEM_NOT_FOUND));
        };

        let sources = RemoteSources {
            item,
            progress: progress.get(remote_id),
            profile,
        };
        let reconciliation = self.engine.reconcile(&record, &sources);
        if reconciliation.is_empty() {
            debug!("Book {} already up to date", book_id);
            return Some(RecordOutcome::skipped(book_id, title));
        }

        let changes = reconciliation.change_lines();
        let outcome = match self
            .persist(&record.uuid, |fresh| reconciliation.updates.apply_to(fresh))
            .await
        {
            Ok(()) => {
                debug!("Updated book {}: {:?}", book_id, changes);
                RecordOutcome::updated(book_id, title, changes)
            }
            Err(e) => {
                warn!("Failed to update book {}: {}", book_id, e);
                RecordOutcome::failed(book_id, title, e.to_string()).with_changes(changes)
            }
        };
        Some(outcome)
    }

    /// Link every unlinked book whose ISBN or ASIN matches exactly one item
    pub async fn quick_link(&self) -> Result<LinkReport> {
        let _guard = self.begin()?;
        let result = self.quick_link_internal().await;
        self.finish(&result);
        result
    }

    async fn quick_link_internal(&self) -> Result<LinkReport> {
        self.set_state(RunState::Fetching);
        let items = self
            .bounded("library items", self.catalog.list_library_items())
            .await?;
        let index = RemoteCatalogIndex::from_payload(&items);
        let linker = AutoLinker::new(&index);

        self.set_state(RunState::Reconciling);
        let mut report = LinkReport::default();
        for book_id in self.store.list_books().await? {
            let record = match self.store.read(book_id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Failed to read book {}: {}", book_id, e);
                    let outcome =
                        RecordOutcome::failed(book_id, format!("Book {}", book_id), e.to_string());
                    self.emit_outcome(&outcome);
                    report.push(outcome);
                    continue;
                }
            };
            let title = record.display_title();

            let outcome = match linker.decide(&record) {
                LinkDecision::AlreadyLinked => continue,
                LinkDecision::NoUniqueMatch { ambiguities } => {
                    for ambiguity in &ambiguities {
                        debug!("Book {}: {}", book_id, Error::from(ambiguity));
                    }
                    RecordOutcome::skipped(book_id, title).with_detail(NO_UNIQUE_MATCH)
                }
                LinkDecision::Linked { item, matched_by } => {
                    debug!("Book {} matched {} by {}", book_id, item.id(), matched_by);
                    let detail = format!("Linked to \"{}\"", item.title());
                    self.link_book(&record, item.id(), detail).await
                }
            };
            self.emit_outcome(&outcome);
            report.push(outcome);
        }

        self.set_state(RunState::Reporting);
        info!(
            "Quick link finished: {} linked, {} skipped, {} failed",
            report.linked, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Rank every remote item against one book, for a human to choose from
    pub async fn candidates(&self, book_id: BookId) -> Result<Vec<CandidateSummary>> {
        let _guard = self.begin()?;
        let result = self.candidates_internal(book_id).await;
        self.finish(&result);
        result
    }

    async fn candidates_internal(&self, book_id: BookId) -> Result<Vec<CandidateSummary>> {
        self.set_state(RunState::Fetching);
        let (items, profile) = tokio::try_join!(
            self.bounded("library items", self.catalog.list_library_items()),
            self.bounded("user profile", self.catalog.get_profile()),
        )?;

        self.set_state(RunState::Reconciling);
        let record = self.store.read(book_id).await?;
        let index = RemoteCatalogIndex::from_payload(&items);
        let progress = ProgressLookup::from_profile(&profile);

        let ranked = InteractiveMatcher::new(&index)
            .with_progress(&progress)
            .rank(&record);

        self.set_state(RunState::Reporting);
        let connection = &self.config.connection;
        Ok(ranked
            .iter()
            .map(|c| c.summary().with_url(connection.item_url(c.item.id())))
            .collect())
    }

    /// Apply human choices made from [`SyncRunner::candidates`]
    pub async fn apply_selections(
        &self,
        selections: Vec<(BookId, MatchSelection)>,
    ) -> Result<LinkReport> {
        let _guard = self.begin()?;
        self.set_state(RunState::Reconciling);

        let mut report = LinkReport::default();
        for (book_id, selection) in selections {
            let record = match self.store.read(book_id).await {
                Ok(record) => record,
                Err(e) => {
                    let outcome =
                        RecordOutcome::failed(book_id, format!("Book {}", book_id), e.to_string());
                    self.emit_outcome(&outcome);
                    report.push(outcome);
                    continue;
                }
            };
            let title = record.display_title();

            let outcome = match selection {
                MatchSelection::Link(remote_id) if remote_id.is_empty() => {
                    let error = Error::invalid_input("empty remote id");
                    RecordOutcome::failed(book_id, title, error.to_string())
                }
                MatchSelection::Link(remote_id) => {
                    self.link_book(&record, &remote_id, "Linked successfully").await
                }
                MatchSelection::Skip => {
                    RecordOutcome::skipped(book_id, title).with_detail("Skipped by user")
                }
                MatchSelection::Cancelled => {
                    RecordOutcome::skipped(book_id, title).with_detail("Dialog cancelled")
                }
            };
            self.emit_outcome(&outcome);
            report.push(outcome);
        }

        self.set_state(RunState::Reporting);
        let result = Ok(report);
        self.finish(&result);
        result
    }

    /// Store `remote_id` on a book; failures become a failed outcome
    async fn link_book(
        &self,
        record: &LocalRecord,
        remote_id: &str,
        detail: impl Into<String>,
    ) -> RecordOutcome {
        let title = record.display_title();
        match self
            .persist(&record.uuid, |fresh| fresh.set_remote_id(remote_id))
            .await
        {
            Ok(()) => {
                info!("Linked book {} to {}", record.book_id, remote_id);
                self.emit_event(RunEvent::BookLinked {
                    book_id: record.book_id,
                    remote_id: remote_id.to_string(),
                });
                RecordOutcome::linked(record.book_id, title, detail)
            }
            Err(e) => {
                warn!("Failed to link book {}: {}", record.book_id, e);
                RecordOutcome::failed(record.book_id, title, e.to_string())
            }
        }
    }

    /// Re-resolve a book by uuid, edit a fresh copy and write it back
    ///
    /// Title and authors are always preserved.
    async fn persist(&self, uuid: &str, edit: impl FnOnce(&mut LocalRecord)) -> Result<()> {
        let id = self
            .store
            .resolve(uuid)
            .await?
            .ok_or_else(|| Error::record_not_found(uuid))?;

        let mut fresh = match self.store.read(id).await {
            Ok(record) => record,
            Err(Error::RecordNotFound(_)) => return Err(Error::record_not_found(uuid)),
            Err(e) => return Err(e),
        };
        edit(&mut fresh);

        self.store.write(id, &fresh, WriteOptions::default()).await
    }

    /// Run one fetch under the configured timeout
    ///
    /// Every failure comes back as [`Error::Fetch`].
    async fn bounded<T>(
        &self,
        what: &str,
        fetch: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout: Duration = self.config.runner.fetch_timeout();
        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e @ Error::Fetch(_))) => Err(e),
            Ok(Err(e)) => Err(Error::fetch(format!("Failed to retrieve {}: {}", what, e))),
            Err(_) => Err(Error::fetch(format!(
                "Timed out retrieving {} after {}s",
                what,
                timeout.as_secs()
            ))),
        }
    }

    /// Take the run lock or fail fast
    fn begin(&self) -> Result<MutexGuard<'_, ()>> {
        self.run_lock.try_lock().map_err(|_| {
            warn!("Run requested while another run is in progress");
            Error::RunInProgress
        })
    }

    fn finish<T>(&self, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_fatal() {
                error!("Run failed: {}", e);
            } else {
                warn!("Run failed: {}", e);
            }
            self.emit_event(RunEvent::RunFailed {
                error: e.to_string(),
            });
        }
        self.set_state(RunState::Idle);
    }

    fn set_state(&self, state: RunState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Run state {:?} -> {:?}", previous, state);
            self.emit_event(RunEvent::StateChanged { state });
        }
    }

    fn emit_outcome(&self, outcome: &RecordOutcome) {
        let event = match outcome.status {
            OutcomeStatus::Updated => RunEvent::RecordUpdated {
                book_id: outcome.book_id,
                changes: outcome.changes.len(),
            },
            // BookLinked is emitted at write time
            OutcomeStatus::Linked => return,
            OutcomeStatus::Skipped => RunEvent::RecordSkipped {
                book_id: outcome.book_id,
                reason: outcome.detail.clone(),
            },
            OutcomeStatus::Failed => RunEvent::RecordFailed {
                book_id: outcome.book_id,
                error: outcome.detail.clone().unwrap_or_default(),
            },
        };
        self.emit_event(event);
    }

    /// Emit a run event
    fn emit_event(&self, event: RunEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            // Nobody listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_event_equality() {
        let event = RunEvent::RecordSkipped {
            book_id: BookId(3),
            reason: Some(ITEM_NOT_FOUND.to_string()),
        };
        assert_eq!(event.clone(), event);
    }
}
