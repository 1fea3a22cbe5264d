//! Per-run lookup structures over fetched remote data
//!
//! - [`RemoteCatalogIndex`]: remote items by id, ISBN and ASIN
//! - [`ProgressLookup`]: progress records by remote item id
//!
//! Both are built once per run from the raw payloads and are read-only
//! afterwards.

pub mod catalog;
pub mod progress;

pub use catalog::RemoteCatalogIndex;
pub use progress::ProgressLookup;
