//! Storage tiers for version records
//!
//! # Modules
//!
//! - [`store`]: `VersionStore` / `DurableStore` contracts shared by both tiers
//! - [`cache`]: SQLite cache with per-entry and index expiry
//! - [`document`]: JSON document store with a working copy and a remote mirror
//! - [`error`]: `StoreError` and its structured kinds

pub mod cache;
pub mod document;
pub mod error;
pub mod store;

pub use cache::SqliteCache;
pub use document::DocumentStore;
pub use error::{StoreError, StoreErrorKind};
pub use store::{DurableStore, VersionStore};
