//! Record and query types shared by storage backends and the analytics engine.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use time::Date;
use tracklens_core::AnalyticsDateTime;

/// Status of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    #[default]
    Active,
    Completed,
    Schedule,
    Overdue,
    Skipped,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Schedule => "SCHEDULE",
            Self::Overdue => "OVERDUE",
            Self::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            "SCHEDULE" => Some(Self::Schedule),
            "OVERDUE" => Some(Self::Overdue),
            "SKIPPED" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Point geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub longitude: f64,
    pub latitude: f64,
}

impl Geometry {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// GeoJSON rendering, `{"type":"Point","coordinates":[lon,lat]}`.
    pub fn to_geojson(&self) -> String {
        serde_json::json!({
            "type": "Point",
            "coordinates": [self.longitude, self.latitude],
        })
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub uid: String,
    pub tracked_entity_type: String,
    pub org_unit: String,
    pub created: AnalyticsDateTime,
    pub last_updated: AnalyticsDateTime,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub last_updated_by: Option<String>,
    #[serde(default)]
    pub stored_by: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// Attribute UID to stored value.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub uid: String,
    pub tracked_entity: String,
    pub program: String,
    pub org_unit: String,
    #[serde(default)]
    pub status: EnrollmentStatus,
    pub enrollment_date: AnalyticsDateTime,
    #[serde(default)]
    pub incident_date: Option<AnalyticsDateTime>,
    #[serde(default)]
    pub completed_date: Option<AnalyticsDateTime>,
    pub created: AnalyticsDateTime,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub uid: String,
    pub enrollment: String,
    pub program_stage: String,
    pub org_unit: String,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub occurred_date: Option<AnalyticsDateTime>,
    #[serde(default)]
    pub scheduled_date: Option<AnalyticsDateTime>,
    pub created: AnalyticsDateTime,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// Data element UID to stored value.
    #[serde(default)]
    pub data_values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Assigned data-capture organisation units.
    #[serde(default)]
    pub org_units: Vec<String>,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, datetime: &AnalyticsDateTime) -> bool {
        let date = datetime.date();
        date >= self.start && date <= self.end
    }

    /// True when `datetime` falls in any of `ranges`; an empty slice matches everything.
    pub fn any_contains(ranges: &[DateRange], datetime: &AnalyticsDateTime) -> bool {
        ranges.is_empty() || ranges.iter().any(|r| r.contains(datetime))
    }
}

/// Entity-level pre-filter pushed down to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityQuery {
    pub tracked_entity_type: String,
    /// Effective org unit set; `None` means unrestricted.
    pub org_units: Option<HashSet<String>>,
    pub created: Vec<DateRange>,
    pub last_updated: Vec<DateRange>,
    pub geometry_only: bool,
}

impl EntityQuery {
    #[must_use]
    pub fn new(tracked_entity_type: impl Into<String>) -> Self {
        Self {
            tracked_entity_type: tracked_entity_type.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_org_units(mut self, org_units: HashSet<String>) -> Self {
        self.org_units = Some(org_units);
        self
    }

    #[must_use]
    pub fn with_created(mut self, ranges: Vec<DateRange>) -> Self {
        self.created = ranges;
        self
    }

    #[must_use]
    pub fn with_last_updated(mut self, ranges: Vec<DateRange>) -> Self {
        self.last_updated = ranges;
        self
    }

    #[must_use]
    pub fn with_geometry_only(mut self, geometry_only: bool) -> Self {
        self.geometry_only = geometry_only;
        self
    }

    /// Evaluates the pre-filter against one entity.
    pub fn matches(&self, entity: &TrackedEntity) -> bool {
        entity.tracked_entity_type == self.tracked_entity_type
            && self
                .org_units
                .as_ref()
                .is_none_or(|set| set.contains(&entity.org_unit))
            && DateRange::any_contains(&self.created, &entity.created)
            && DateRange::any_contains(&self.last_updated, &entity.last_updated)
            && (!self.geometry_only || entity.geometry.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentQuery {
    pub program: String,
    pub tracked_entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub program_stage: String,
    pub enrollments: Vec<String>,
}
