//! # tracklens-storage
//!
//! Read-side storage abstraction for TrackLens.
//!
//! This crate defines the traits and record types the analytics engine reads
//! through. It does not contain any implementations; those are provided by
//! separate crates such as `tracklens-db-memory`.
//!
//! ## Overview
//!
//! - [`TrackerStore`] fetches tracked entities, enrollments and events.
//! - [`MetadataStore`] looks up programs, stages, data elements, attributes,
//!   option sets, organisation units and tracked entity types.
//! - [`UserStore`] resolves the requesting user's assigned organisation units.
//!
//! ## Example
//!
//! ```ignore
//! use tracklens_storage::{EntityQuery, StorageError, TrackedEntity, TrackerStore};
//!
//! async fn people(store: &dyn TrackerStore) -> Result<Vec<TrackedEntity>, StorageError> {
//!     let query = EntityQuery::new("nEenWmSyUEp").with_geometry_only(true);
//!     store.tracked_entities(&query).await
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{MetadataStore, TrackerStore, UserStore};
pub use types::{
    DateRange, Enrollment, EnrollmentQuery, EnrollmentStatus, EntityQuery, Event, EventQuery,
    EventStatus, Geometry, TrackedEntity, UserAccount,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared tracker store.
pub type DynTrackerStore = std::sync::Arc<dyn TrackerStore>;

/// Type alias for a shared metadata store.
pub type DynMetadataStore = std::sync::Arc<dyn MetadataStore>;

/// Type alias for a shared user store.
pub type DynUserStore = std::sync::Arc<dyn UserStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tracklens_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{MetadataStore, TrackerStore, UserStore};
    pub use crate::types::{
        DateRange, Enrollment, EnrollmentQuery, EnrollmentStatus, EntityQuery, Event, EventQuery,
        EventStatus, Geometry, TrackedEntity, UserAccount,
    };
    pub use crate::{DynMetadataStore, DynTrackerStore, DynUserStore, StorageResult};
}
