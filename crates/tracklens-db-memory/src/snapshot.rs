//! JSON snapshot format used to seed an [`InMemoryStore`](crate::InMemoryStore).

use serde::{Deserialize, Serialize};
use tracklens_core::{
    DataElement, OptionSet, OrganisationUnit, Program, ProgramIndicator, ProgramStage,
    TrackedEntityAttribute, TrackedEntityType,
};
use tracklens_storage::{Enrollment, Event, TrackedEntity, UserAccount};

/// Everything an in-memory store holds, in one serializable document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub programs: Vec<Program>,
    pub program_stages: Vec<ProgramStage>,
    pub data_elements: Vec<DataElement>,
    pub attributes: Vec<TrackedEntityAttribute>,
    pub option_sets: Vec<OptionSet>,
    pub program_indicators: Vec<ProgramIndicator>,
    pub tracked_entity_types: Vec<TrackedEntityType>,
    pub organisation_units: Vec<OrganisationUnit>,
    pub users: Vec<UserAccount>,
    pub tracked_entities: Vec<TrackedEntity>,
    pub enrollments: Vec<Enrollment>,
    pub events: Vec<Event>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
