//! Core traits for shelfsync
//!
//! This module defines the seams between the reconciliation core and the
//! outside world.
//!
//! - [`RemoteCatalog`]: Fetch library items and the user profile from the server
//! - [`LocalStore`]: Enumerate, read and write local book records

pub mod local_store;
pub mod remote_catalog;

pub use local_store::{LocalStore, WriteOptions};
pub use remote_catalog::RemoteCatalog;
