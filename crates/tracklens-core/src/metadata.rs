//! Tracker metadata model.
//!
//! These are plain descriptor types: programs, stages, data elements,
//! attributes, option sets, organisation units and tracked entity types.
//! They are loaded from a store and never mutated by the analytics layer.

use serde::{Deserialize, Serialize};

use crate::value_type::{AggregationType, ValueType};

/// Common accessors shared by every identifiable metadata object.
pub trait NamedObject {
    fn uid(&self) -> &str;
    fn name(&self) -> &str;
    fn code(&self) -> Option<&str> {
        None
    }
    fn short_name(&self) -> Option<&str> {
        None
    }
    fn description(&self) -> Option<&str> {
        None
    }

    /// Short name when requested and present, otherwise the name.
    fn display_name(&self, short: bool) -> &str {
        if short {
            self.short_name().unwrap_or_else(|| self.name())
        } else {
            self.name()
        }
    }
}

macro_rules! named_object {
    ($ty:ty) => {
        impl NamedObject for $ty {
            fn uid(&self) -> &str {
                &self.uid
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn code(&self) -> Option<&str> {
                self.code.as_deref()
            }
            fn short_name(&self) -> Option<&str> {
                self.short_name.as_deref()
            }
            fn description(&self) -> Option<&str> {
                self.description.as_deref()
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tracked_entity_type: Option<String>,
    /// Program attributes in display order.
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub stages: Vec<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
    /// Custom label for the enrollment date, e.g. "Date of enrollment".
    #[serde(default)]
    pub enrollment_date_label: Option<String>,
    #[serde(default)]
    pub incident_date_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStage {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub program: String,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub data_elements: Vec<String>,
    /// Custom label for the occurred date, e.g. "Report date".
    #[serde(default)]
    pub execution_date_label: Option<String>,
    #[serde(default)]
    pub due_date_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataElement {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub aggregation_type: AggregationType,
    #[serde(default)]
    pub option_set: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityAttribute {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub aggregation_type: AggregationType,
    #[serde(default)]
    pub option_set: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionItem {
    pub uid: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSet {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionItem>,
}

impl OptionSet {
    pub fn option_by_code(&self, code: &str) -> Option<&OptionItem> {
        self.options.iter().find(|o| o.code == code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationUnit {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    /// Materialized ancestry, `/root/.../self`.
    pub path: String,
    pub level: u32,
}

impl OrganisationUnit {
    /// UIDs from the root down to this unit.
    pub fn ancestry(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// True when `uid` is this unit or one of its ancestors.
    pub fn is_within(&self, uid: &str) -> bool {
        self.ancestry().any(|a| a == uid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityType {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorAggregation {
    Sum,
    Average,
    #[default]
    Count,
    Min,
    Max,
    Last,
}

/// Enrollment-level derived value: one data element of one stage aggregated
/// over the enrollment's events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramIndicator {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub program: String,
    pub program_stage: String,
    #[serde(default)]
    pub data_element: Option<String>,
    #[serde(default)]
    pub aggregation: IndicatorAggregation,
    #[serde(default)]
    pub decimals: Option<u8>,
}

named_object!(Program);
named_object!(ProgramStage);
named_object!(DataElement);
named_object!(TrackedEntityAttribute);
named_object!(OptionSet);
named_object!(OrganisationUnit);
named_object!(TrackedEntityType);
named_object!(ProgramIndicator);

#[cfg(test)]
mod tests {
    use super::*;

    fn bo() -> OrganisationUnit {
        OrganisationUnit {
            uid: "O6uvpzGd5pu".into(),
            code: Some("OU_264".into()),
            name: "Bo".into(),
            short_name: None,
            description: None,
            parent: Some("ImspTQPwCqd".into()),
            path: "/ImspTQPwCqd/O6uvpzGd5pu".into(),
            level: 2,
        }
    }

    #[test]
    fn test_org_unit_ancestry() {
        let ou = bo();
        let ancestry: Vec<&str> = ou.ancestry().collect();
        assert_eq!(ancestry, vec!["ImspTQPwCqd", "O6uvpzGd5pu"]);
        assert!(ou.is_within("ImspTQPwCqd"));
        assert!(ou.is_within("O6uvpzGd5pu"));
        assert!(!ou.is_within("fdc6uOvgoji"));
    }

    #[test]
    fn test_display_name_prefers_short_name() {
        let mut ou = bo();
        assert_eq!(ou.display_name(true), "Bo");
        ou.short_name = Some("Bo D".into());
        assert_eq!(ou.display_name(true), "Bo D");
        assert_eq!(ou.display_name(false), "Bo");
    }

    #[test]
    fn test_deserialize_custom_date_labels() {
        let stage: ProgramStage = serde_json::from_str(
            r#"{"uid":"A03MvHHogjR","name":"Birth","program":"IpHINAT79UW","executionDateLabel":"Report date"}"#,
        )
        .unwrap();
        assert_eq!(stage.execution_date_label.as_deref(), Some("Report date"));
        assert!(stage.due_date_label.is_none());
        let program: Program =
            serde_json::from_str(r#"{"uid":"IpHINAT79UW","name":"Child Programme"}"#).unwrap();
        assert!(program.enrollment_date_label.is_none());
    }

    #[test]
    fn test_deserialize_data_element_defaults() {
        let de: DataElement = serde_json::from_str(
            r#"{"uid":"UXz7xuGCEhU","name":"MCH Weight (g)","valueType":"NUMBER","aggregationType":"AVERAGE"}"#,
        )
        .unwrap();
        assert_eq!(de.value_type, ValueType::Number);
        assert_eq!(de.aggregation_type, AggregationType::Average);
        assert!(de.option_set.is_none());
        assert_eq!(de.code(), None);
    }

    #[test]
    fn test_option_lookup_by_code() {
        let set = OptionSet {
            uid: "pC3N9N77UmT".into(),
            code: None,
            name: "Gender".into(),
            short_name: None,
            description: None,
            options: vec![
                OptionItem {
                    uid: "rBvjJYbMCVx".into(),
                    code: "Male".into(),
                    name: "Male".into(),
                },
                OptionItem {
                    uid: "Mnp3oXrpAbK".into(),
                    code: "Female".into(),
                    name: "Female".into(),
                },
            ],
        };
        assert_eq!(set.option_by_code("Female").unwrap().uid, "Mnp3oXrpAbK");
        assert!(set.option_by_code("Other").is_none());
    }
}
