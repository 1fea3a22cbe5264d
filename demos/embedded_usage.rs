//! Minimal embedding example for shelfsync-core
//!
//! This example demonstrates using shelfsync-core as a library in a custom
//! application. The remote catalog and local store are supplied by the
//! application; the runner only orchestrates.

use serde_json::{Value, json};
use shelfsync_core::config::{ColumnSelection, ConnectionConfig, SyncConfig};
use shelfsync_core::model::{BookId, LocalRecord, REMOTE_ID_KEY};
use shelfsync_core::{
    FieldKey, LocalStore, MatchSelection, MemoryLocalStore, RemoteCatalog, Result, RunEvent,
    SyncRunner,
};

/// Custom remote catalog serving an in-process snapshot
struct EmbeddedCatalog {
    items: Value,
    profile: Value,
}

#[async_trait::async_trait]
impl RemoteCatalog for EmbeddedCatalog {
    async fn list_library_items(&self) -> Result<Value> {
        println!("[Embedded] Listing library items");
        Ok(self.items.clone())
    }

    async fn get_profile(&self) -> Result<Value> {
        println!("[Embedded] Fetching profile");
        Ok(self.profile.clone())
    }

    fn name(&self) -> &'static str {
        "embedded"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Embedded shelfsync-core Example ===\n");

    // Create custom components
    let catalog = EmbeddedCatalog {
        items: json!({
            "results": [
                {
                    "id": "li_hobbit",
                    "numFiles": 12,
                    "media": {
                        "duration": 40000.0,
                        "metadata": {
                            "title": "The Hobbit",
                            "authorName": "J.R.R. Tolkien",
                            "narratorName": "Andy Serkis",
                            "isbn": "9780008376123"
                        }
                    }
                },
                {
                    "id": "li_persuasion",
                    "media": {"metadata": {"title": "Persuasion", "authorName": "Jane Austen", "asin": "B0PERSUADE"}}
                }
            ]
        }),
        profile: json!({
            "mediaProgress": [
                {"libraryItemId": "li_hobbit", "progress": 0.5, "currentTime": 20000.0, "isFinished": false}
            ],
            "bookmarks": []
        }),
    };

    let store = MemoryLocalStore::with_records([
        LocalRecord::new(BookId(1), "uuid-1", "The Hobbit")
            .with_author("J.R.R. Tolkien")
            .with_identifier("isbn", "9780008376123"),
        LocalRecord::new(BookId(2), "uuid-2", "Persuasion")
            .with_author("Jane Austen")
            .with_identifier("asin", "B0PERSUADE"),
        LocalRecord::new(BookId(3), "uuid-3", "Emma").with_author("Jane Austen"),
    ]);

    let columns = ColumnSelection::new()
        .with(FieldKey::Narrator, "#abs_narrator")
        .with(FieldKey::FileCount, "#abs_numfiles")
        .with(FieldKey::ProgressInt, "#abs_progint");
    let config = SyncConfig::new(ConnectionConfig::new(
        "http://abs.embedded",
        "lib_main",
        "embedded-key",
    ))
    .with_columns(columns);

    // Create runner
    println!("1. Creating runner...");
    let (runner, mut event_rx) =
        SyncRunner::new(Box::new(catalog), Box::new(store.clone()), config)?;

    // Spawn event listener (optional)
    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !matches!(event, RunEvent::StateChanged { .. }) {
                println!("[Event] {:?}", event);
            }
        }
    });

    println!("2. Linking books by ISBN/ASIN...");
    let links = runner.quick_link().await?;
    println!("{}\n", links);

    println!("3. Ranking candidates for the book left unlinked...");
    let candidates = runner.candidates(BookId(3)).await?;
    for candidate in &candidates {
        println!(
            "   {:>3}  {} by {} ({})",
            candidate.score, candidate.title, candidate.author, candidate.remote_id
        );
    }
    runner
        .apply_selections(vec![(BookId(3), MatchSelection::Skip)])
        .await?;

    println!("\n4. Syncing linked books...");
    let report = runner.sync().await?;
    println!("{}\n", report);
    for entry in &report.entries {
        for change in &entry.changes {
            println!("   {}: {}", entry.title, change);
        }
    }

    println!("\n5. Syncing again (nothing should change)...");
    let report = runner.sync().await?;
    println!("{}", report);

    let hobbit = store.read(BookId(1)).await?;
    println!(
        "\nThe Hobbit is linked to {:?}",
        hobbit.identifier(REMOTE_ID_KEY)
    );

    drop(runner);
    let _ = event_listener.await;

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Remote catalog and local store are supplied by the application");
    println!("- No global state");
    println!("- Reports are plain values the application can render");

    Ok(())
}
