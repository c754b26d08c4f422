//! In-memory storage backend for TrackLens.
//!
//! This crate provides an in-memory implementation of the `TrackerStore`,
//! `MetadataStore` and `UserStore` traits from `tracklens-storage`, using
//! papaya lock-free HashMaps for concurrent access.
//!
//! # Example
//!
//! ```ignore
//! use tracklens_db_memory::InMemoryStore;
//! use tracklens_storage::{EntityQuery, TrackerStore};
//!
//! let store = InMemoryStore::from_snapshot_file("demo.json")?;
//! let people = store.tracked_entities(&EntityQuery::new("nEenWmSyUEp")).await?;
//! ```

pub mod snapshot;
pub mod storage;
mod store_impl;

pub use snapshot::Snapshot;
pub use storage::InMemoryStore;
pub use tracklens_storage::{MetadataStore, StorageError, TrackerStore, UserStore};
