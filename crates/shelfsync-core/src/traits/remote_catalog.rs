// # Remote Catalog Trait
//
// Defines the interface for fetching raw payloads from an Audiobookshelf
// server.
//
// ## Implementations
//
// - HTTP: `shelfsync-audiobookshelf` crate
// - Tests: canned in-memory catalogs
//
// ## Usage
//
// ```rust,ignore
// use shelfsync_core::RemoteCatalog;
//
// async fn dump(catalog: &dyn RemoteCatalog) -> shelfsync_core::Result<()> {
//     let items = catalog.list_library_items().await?;
//     let me = catalog.get_profile().await?;
//     println!("{} / {}", items, me);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde_json::Value;

/// Trait for remote catalog implementations
///
/// Implementations return the server's JSON payloads untouched. Envelope
/// unwrapping and indexing happen in
/// [`RemoteCatalogIndex`](crate::index::RemoteCatalogIndex) and
/// [`ProgressLookup`](crate::index::ProgressLookup).
///
/// Implementations perform one request per call and never retry. Every
/// failure (connection, non-2xx status, undecodable body) is reported as
/// [`Error::Fetch`](crate::Error::Fetch). The runner bounds each call with
/// its own timeout.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Fetch every item of the configured library
    ///
    /// The payload is either `{"results": [...]}` or a bare list.
    async fn list_library_items(&self) -> Result<Value, crate::Error>;

    /// Fetch the authenticated user's profile
    ///
    /// Progress records live under `mediaProgress`, bookmarks under
    /// `bookmarks`.
    async fn get_profile(&self) -> Result<Value, crate::Error>;

    /// Check that the server answers at all
    ///
    /// Defaults to success for catalogs with no notion of liveness.
    async fn ping(&self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Catalog name, for logs
    fn name(&self) -> &'static str;
}
