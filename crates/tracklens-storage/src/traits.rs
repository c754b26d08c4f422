//! Storage traits for the read-side storage abstraction.
//!
//! The analytics engine only ever reads. Writers (data entry, metadata
//! maintenance) live outside this workspace.

use async_trait::async_trait;
use tracklens_core::{
    DataElement, OptionSet, OrganisationUnit, Program, ProgramIndicator, ProgramStage,
    TrackedEntityAttribute, TrackedEntityType,
};

use crate::error::StorageError;
use crate::types::{
    Enrollment, EnrollmentQuery, EntityQuery, Event, EventQuery, TrackedEntity, UserAccount,
};

/// Tracker data access: tracked entities, their enrollments and events.
///
/// Implementations must be thread-safe (`Send + Sync`). The engine issues one
/// [`TrackerStore::tracked_entities`] call per request and then fans out
/// enrollment and event reads per program and program stage concurrently.
///
/// # Example
///
/// ```ignore
/// use tracklens_storage::{EventQuery, StorageError, TrackerStore};
///
/// async fn birth_events(store: &dyn TrackerStore, enrollments: Vec<String>) -> Result<usize, StorageError> {
///     let query = EventQuery { program_stage: "A03MvHHogjR".into(), enrollments };
///     Ok(store.events(&query).await?.len())
/// }
/// ```
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Returns every tracked entity matching the pre-filter.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn tracked_entities(&self, query: &EntityQuery)
    -> Result<Vec<TrackedEntity>, StorageError>;

    /// Returns the enrollments in `query.program` for the listed entities.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn enrollments(&self, query: &EnrollmentQuery) -> Result<Vec<Enrollment>, StorageError>;

    /// Returns the events of `query.program_stage` for the listed enrollments.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn events(&self, query: &EventQuery) -> Result<Vec<Event>, StorageError>;
}

/// Metadata lookups by UID.
///
/// All lookups return `Ok(None)` for unknown UIDs; errors are reserved for
/// infrastructure failures.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn program(&self, uid: &str) -> Result<Option<Program>, StorageError>;

    async fn program_stage(&self, uid: &str) -> Result<Option<ProgramStage>, StorageError>;

    async fn data_element(&self, uid: &str) -> Result<Option<DataElement>, StorageError>;

    async fn attribute(&self, uid: &str) -> Result<Option<TrackedEntityAttribute>, StorageError>;

    async fn option_set(&self, uid: &str) -> Result<Option<OptionSet>, StorageError>;

    async fn program_indicator(&self, uid: &str)
    -> Result<Option<ProgramIndicator>, StorageError>;

    async fn tracked_entity_type(
        &self,
        uid: &str,
    ) -> Result<Option<TrackedEntityType>, StorageError>;

    async fn org_unit(&self, uid: &str) -> Result<Option<OrganisationUnit>, StorageError>;

    /// Direct children of `uid`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if `uid` is not a known org unit.
    async fn org_unit_children(&self, uid: &str) -> Result<Vec<OrganisationUnit>, StorageError>;

    /// `uid` itself followed by every unit below it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if `uid` is not a known org unit.
    async fn org_unit_descendants(&self, uid: &str)
    -> Result<Vec<OrganisationUnit>, StorageError>;
}

/// Resolves the requesting principal.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user(&self, username: &str) -> Result<Option<UserAccount>, StorageError>;
}
