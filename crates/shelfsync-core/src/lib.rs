// # shelfsync-core
//
// Core library for linking local books to Audiobookshelf items and keeping
// their metadata columns in sync.
//
// ## Architecture Overview
//
// - **RemoteCatalog**: Trait for fetching library items and the user profile
// - **LocalStore**: Trait for reading and writing local book records
// - **RemoteCatalogIndex** / **ProgressLookup**: Per-run lookup structures
// - **FieldMappingTable**: Declarative source of every syncable column
// - **ReconciliationEngine**: Pure diff of one book against remote data
// - **AutoLinker** / **InteractiveMatcher**: Linking by identifier or by ranking
// - **SyncRunner**: Orchestrates fetch → index → reconcile → apply → report
//
// ## Design Principles
//
// 1. **Pure core**: Matching and reconciliation never perform I/O
// 2. **Fail fast, fail small**: Fetch and config errors abort before any
//    write; per-book errors only land in the report
// 3. **Minimal writes**: Unchanged columns are never rewritten
// 4. **Library-First**: The daemon is a thin shell over this crate

pub mod config;
pub mod error;
pub mod index;
pub mod linking;
pub mod mapping;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod runner;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{ColumnSelection, ConnectionConfig, ScheduleConfig, SyncConfig};
pub use error::{Error, Result};
pub use index::{ProgressLookup, RemoteCatalogIndex};
pub use linking::{AutoLinker, InteractiveMatcher, MatchSelection};
pub use mapping::{FieldKey, FieldMappingTable};
pub use model::{BookId, FieldValue, LocalRecord};
pub use reconcile::ReconciliationEngine;
pub use report::{LinkReport, SyncReport};
pub use runner::{RunEvent, RunState, SyncRunner};
pub use store::{JsonFileLocalStore, MemoryLocalStore};
pub use traits::{LocalStore, RemoteCatalog};
