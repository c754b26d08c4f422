pub mod error;
pub mod metadata;
pub mod time;
pub mod uid;
pub mod value_type;

pub use error::{CoreError, ErrorCategory, Result};
pub use metadata::{
    DataElement, IndicatorAggregation, NamedObject, OptionItem, OptionSet, OrganisationUnit, Program,
    ProgramIndicator, ProgramStage, TrackedEntityAttribute, TrackedEntityType,
};
pub use time::{AnalyticsDateTime, now_utc};
pub use uid::{UID_LENGTH, is_valid_uid, validate_uid};
pub use value_type::{AggregationType, ValueKind, ValueType};
