use std::path::Path;
use std::sync::Arc;

use papaya::HashMap as PapayaHashMap;
use tracklens_core::{
    DataElement, OptionSet, OrganisationUnit, Program, ProgramIndicator, ProgramStage,
    TrackedEntityAttribute, TrackedEntityType,
};
use tracklens_storage::{Enrollment, Event, StorageError, TrackedEntity, UserAccount};

use crate::snapshot::Snapshot;

type Table<V> = Arc<PapayaHashMap<String, V>>;

fn table<V>() -> Table<V> {
    Arc::new(PapayaHashMap::new())
}

/// In-memory tracker storage backed by papaya lock-free HashMaps.
///
/// Every table is keyed by UID. Reads take a pinned guard and clone out the
/// matching records, so concurrent queries never block each other.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    pub(crate) entities: Table<TrackedEntity>,
    pub(crate) enrollments: Table<Enrollment>,
    pub(crate) events: Table<Event>,
    pub(crate) programs: Table<Program>,
    pub(crate) program_stages: Table<ProgramStage>,
    pub(crate) data_elements: Table<DataElement>,
    pub(crate) attributes: Table<TrackedEntityAttribute>,
    pub(crate) option_sets: Table<OptionSet>,
    pub(crate) program_indicators: Table<ProgramIndicator>,
    pub(crate) tracked_entity_types: Table<TrackedEntityType>,
    pub(crate) org_units: Table<OrganisationUnit>,
    pub(crate) users: Table<UserAccount>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entities: table(),
            enrollments: table(),
            events: table(),
            programs: table(),
            program_stages: table(),
            data_elements: table(),
            attributes: table(),
            option_sets: table(),
            program_indicators: table(),
            tracked_entity_types: table(),
            org_units: table(),
            users: table(),
        }
    }

    /// Creates a store pre-populated from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        store.load(snapshot);
        store
    }

    /// Reads a JSON snapshot from disk.
    pub fn from_snapshot_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StorageError::connection_error(format!("cannot read {}: {e}", path.display()))
        })?;
        let snapshot = Snapshot::from_json(&json)?;
        let store = Self::from_snapshot(snapshot);
        tracing::info!(
            path = %path.display(),
            entities = store.entity_count(),
            "loaded tracker snapshot"
        );
        Ok(store)
    }

    /// Inserts every record of `snapshot`, replacing records with the same UID.
    pub fn load(&self, snapshot: Snapshot) {
        snapshot.programs.into_iter().for_each(|p| self.insert_program(p));
        snapshot
            .program_stages
            .into_iter()
            .for_each(|s| self.insert_program_stage(s));
        snapshot
            .data_elements
            .into_iter()
            .for_each(|d| self.insert_data_element(d));
        snapshot.attributes.into_iter().for_each(|a| self.insert_attribute(a));
        snapshot.option_sets.into_iter().for_each(|o| self.insert_option_set(o));
        snapshot
            .program_indicators
            .into_iter()
            .for_each(|i| self.insert_program_indicator(i));
        snapshot
            .tracked_entity_types
            .into_iter()
            .for_each(|t| self.insert_tracked_entity_type(t));
        snapshot
            .organisation_units
            .into_iter()
            .for_each(|o| self.insert_org_unit(o));
        snapshot.users.into_iter().for_each(|u| self.insert_user(u));
        snapshot
            .tracked_entities
            .into_iter()
            .for_each(|e| self.insert_tracked_entity(e));
        snapshot.enrollments.into_iter().for_each(|e| self.insert_enrollment(e));
        snapshot.events.into_iter().for_each(|e| self.insert_event(e));
    }

    pub fn insert_tracked_entity(&self, entity: TrackedEntity) {
        self.entities.pin().insert(entity.uid.clone(), entity);
    }

    pub fn insert_enrollment(&self, enrollment: Enrollment) {
        self.enrollments.pin().insert(enrollment.uid.clone(), enrollment);
    }

    pub fn insert_event(&self, event: Event) {
        self.events.pin().insert(event.uid.clone(), event);
    }

    pub fn insert_program(&self, program: Program) {
        self.programs.pin().insert(program.uid.clone(), program);
    }

    pub fn insert_program_stage(&self, stage: ProgramStage) {
        self.program_stages.pin().insert(stage.uid.clone(), stage);
    }

    pub fn insert_data_element(&self, data_element: DataElement) {
        self.data_elements
            .pin()
            .insert(data_element.uid.clone(), data_element);
    }

    pub fn insert_attribute(&self, attribute: TrackedEntityAttribute) {
        self.attributes.pin().insert(attribute.uid.clone(), attribute);
    }

    pub fn insert_option_set(&self, option_set: OptionSet) {
        self.option_sets.pin().insert(option_set.uid.clone(), option_set);
    }

    pub fn insert_program_indicator(&self, indicator: ProgramIndicator) {
        self.program_indicators
            .pin()
            .insert(indicator.uid.clone(), indicator);
    }

    pub fn insert_tracked_entity_type(&self, tet: TrackedEntityType) {
        self.tracked_entity_types.pin().insert(tet.uid.clone(), tet);
    }

    pub fn insert_org_unit(&self, org_unit: OrganisationUnit) {
        self.org_units.pin().insert(org_unit.uid.clone(), org_unit);
    }

    pub fn insert_user(&self, user: UserAccount) {
        self.users.pin().insert(user.username.clone(), user);
    }

    pub fn entity_count(&self) -> usize {
        self.entities.pin().len()
    }

    pub fn event_count(&self) -> usize {
        self.events.pin().len()
    }
}
