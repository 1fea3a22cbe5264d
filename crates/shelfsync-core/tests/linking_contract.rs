//! Contract Test: Linking
//!
//! Constraints verified:
//! - Quick link only links on a unique ISBN, then a unique ASIN
//! - Already linked books are never re-linked
//! - Candidate ranking puts title+author matches first
//! - Human selections are applied without touching title or authors
//! - A book that cannot be read is reported, not dropped

mod common;

use common::*;
use shelfsync_core::linking::MatchSelection;
use shelfsync_core::model::{BookId, REMOTE_ID_KEY};
use shelfsync_core::report::OutcomeStatus;
use shelfsync_core::runner::{NO_UNIQUE_MATCH, RunEvent, SyncRunner};
use shelfsync_core::store::MemoryLocalStore;
use shelfsync_core::traits::LocalStore;

fn runner_over(store: &MemoryLocalStore, catalog: &CannedCatalog) -> SyncRunner {
    let (runner, _events) = SyncRunner::new(
        Box::new(catalog.clone()),
        Box::new(store.clone()),
        config_with(all_columns()),
    )
    .expect("runner construction succeeds");
    runner
}

#[tokio::test]
async fn quick_link_requires_unique_identifier() {
    let catalog = CannedCatalog::new(library_payload(), profile_payload());
    let store = MemoryLocalStore::with_records([
        book(1, "Dune").with_identifier("isbn", "9780441013593"),
        book(2, "Emma").with_identifier("isbn", "111"),
        book(3, "Emma").with_identifier("isbn", "111").with_identifier("asin", "B00EMMA"),
        linked_book(4, "Dune", "li_elsewhere").with_identifier("isbn", "9780441013593"),
        book(5, "No Identifiers"),
    ]);
    let runner = runner_over(&store, &catalog);

    let report = runner.quick_link().await.expect("quick link succeeds");

    assert_eq!(report.linked, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total(), 4, "already linked book is not considered");

    assert_eq!(report.entries[0].detail.as_deref(), Some("Linked to \"Dune\""));
    assert_eq!(report.entries[1].detail.as_deref(), Some(NO_UNIQUE_MATCH));

    let read_remote = |id| {
        let store = store.clone();
        async move {
            store
                .read(BookId(id))
                .await
                .unwrap()
                .identifiers
                .get(REMOTE_ID_KEY)
                .cloned()
        }
    };
    assert_eq!(read_remote(1).await.as_deref(), Some("li_dune"));
    assert_eq!(read_remote(2).await, None);
    assert_eq!(read_remote(3).await.as_deref(), Some("li_emma_2"));
    assert_eq!(read_remote(4).await.as_deref(), Some("li_elsewhere"));

    assert_eq!(catalog.profile_calls(), 0, "quick link needs only the catalog");
}

#[tokio::test]
async fn candidates_rank_and_flag_progress() {
    let catalog = CannedCatalog::new(library_payload(), profile_payload());
    let store = MemoryLocalStore::with_records([book(1, "emma").with_author("Jane Austen")]);
    let runner = runner_over(&store, &catalog);

    let candidates = runner.candidates(BookId(1)).await.unwrap();

    let ids: Vec<&str> = candidates.iter().map(|c| c.remote_id.as_str()).collect();
    assert_eq!(ids, vec!["li_emma_1", "li_emma_2", "li_dune"]);
    assert_eq!(candidates[0].score, 2);
    assert_eq!(candidates[2].score, 0);
    assert!(candidates[2].in_progress);
    assert!(!candidates[0].in_progress);
    assert_eq!(
        candidates[0].url.as_deref(),
        Some("http://abs.test/audiobookshelf/item/li_emma_1")
    );
}

#[tokio::test]
async fn candidates_for_unknown_book_is_an_error() {
    let catalog = CannedCatalog::new(library_payload(), profile_payload());
    let runner = runner_over(&MemoryLocalStore::new(), &catalog);

    let result = runner.candidates(BookId(42)).await;
    assert!(matches!(result, Err(shelfsync_core::Error::RecordNotFound(_))));
}

#[tokio::test]
async fn selections_link_skip_and_cancel() {
    let catalog = CannedCatalog::new(library_payload(), profile_payload());
    let store = MemoryLocalStore::with_records([
        book(1, "Dune").with_author("Frank Herbert"),
        book(2, "Emma"),
        book(3, "Persuasion"),
    ]);
    let (runner, mut events) = SyncRunner::new(
        Box::new(catalog.clone()),
        Box::new(store.clone()),
        config_with(all_columns()),
    )
    .unwrap();

    let report = runner
        .apply_selections(vec![
            (BookId(1), MatchSelection::Link("li_dune".to_string())),
            (BookId(2), MatchSelection::Skip),
            (BookId(3), MatchSelection::Cancelled),
            (BookId(9), MatchSelection::Link("li_emma_1".to_string())),
        ])
        .await
        .unwrap();

    assert_eq!(report.linked, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.entries[1].detail.as_deref(), Some("Skipped by user"));
    assert_eq!(report.entries[2].detail.as_deref(), Some("Dialog cancelled"));
    assert_eq!(report.entries[3].status, OutcomeStatus::Failed);

    let dune = store.read(BookId(1)).await.unwrap();
    assert_eq!(dune.remote_id(), Some("li_dune"));
    assert_eq!(dune.title, "Dune");
    assert_eq!(dune.authors, vec!["Frank Herbert".to_string()]);
    assert_eq!(store.read(BookId(2)).await.unwrap().remote_id(), None);

    let mut linked = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunEvent::BookLinked { book_id, remote_id } = event {
            linked.push((book_id, remote_id));
        }
    }
    assert_eq!(linked, vec![(BookId(1), "li_dune".to_string())]);
    assert_eq!(catalog.items_calls(), 0, "selections are applied without refetching");
}

#[tokio::test]
async fn quick_link_reports_unreadable_books() {
    let catalog = CannedCatalog::new(library_payload(), profile_payload());
    let inner = MemoryLocalStore::with_records([
        book(1, "Dune").with_identifier("isbn", "9780441013593"),
        book(2, "Emma").with_identifier("asin", "B00EMMA"),
    ]);
    let store = FaultyStore::new(inner.clone()).failing_read(BookId(2));
    let (runner, mut events) = SyncRunner::new(
        Box::new(catalog),
        Box::new(store),
        config_with(all_columns()),
    )
    .unwrap();

    let report = runner.quick_link().await.expect("read failures do not abort quick link");

    assert_eq!(report.linked, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total(), 2);

    let emma = &report.entries[1];
    assert_eq!(emma.book_id, BookId(2));
    assert_eq!(emma.status, OutcomeStatus::Failed);
    assert_eq!(emma.title, "Book 2");
    assert_eq!(emma.detail.as_deref(), Some("Local store error: Book 2 is locked"));
    assert_eq!(inner.read(BookId(2)).await.unwrap().remote_id(), None);

    let mut failed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunEvent::RecordFailed { book_id, .. } = event {
            failed.push(book_id);
        }
    }
    assert_eq!(failed, vec![BookId(2)]);
}
