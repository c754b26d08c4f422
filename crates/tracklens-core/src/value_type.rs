use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Declared value type of an attribute or data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    #[default]
    Text,
    LongText,
    Number,
    Integer,
    IntegerPositive,
    IntegerNegative,
    IntegerZeroOrPositive,
    Percentage,
    Boolean,
    TrueOnly,
    Date,
    Datetime,
    Age,
    Coordinate,
    Email,
    PhoneNumber,
    OrganisationUnit,
    Geojson,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::LongText => "LONG_TEXT",
            Self::Number => "NUMBER",
            Self::Integer => "INTEGER",
            Self::IntegerPositive => "INTEGER_POSITIVE",
            Self::IntegerNegative => "INTEGER_NEGATIVE",
            Self::IntegerZeroOrPositive => "INTEGER_ZERO_OR_POSITIVE",
            Self::Percentage => "PERCENTAGE",
            Self::Boolean => "BOOLEAN",
            Self::TrueOnly => "TRUE_ONLY",
            Self::Date => "DATE",
            Self::Datetime => "DATETIME",
            Self::Age => "AGE",
            Self::Coordinate => "COORDINATE",
            Self::Email => "EMAIL",
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::OrganisationUnit => "ORGANISATION_UNIT",
            Self::Geojson => "GEOJSON",
        }
    }

    /// Rendering family for grid cells.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number
            | Self::Integer
            | Self::IntegerPositive
            | Self::IntegerNegative
            | Self::IntegerZeroOrPositive
            | Self::Percentage => ValueKind::Numeric,
            Self::Boolean => ValueKind::Boolean,
            Self::TrueOnly => ValueKind::TrueOnly,
            Self::Date | Self::Age => ValueKind::Date,
            Self::Datetime => ValueKind::DateTime,
            Self::Coordinate | Self::Geojson => ValueKind::Coordinate,
            Self::Text
            | Self::LongText
            | Self::Email
            | Self::PhoneNumber
            | Self::OrganisationUnit => ValueKind::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind() == ValueKind::Numeric
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_uppercase()))
            .map_err(|_| CoreError::invalid_value_type(s))
    }
}

/// Closed set of rendering families. Every grid cell is formatted through
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Numeric,
    Boolean,
    TrueOnly,
    Date,
    DateTime,
    Coordinate,
}

impl ValueKind {
    /// Short type name reported in grid headers.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Numeric => "double",
            Self::Boolean | Self::TrueOnly => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Coordinate => "coordinate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationType {
    Sum,
    Average,
    Count,
    Min,
    Max,
    Last,
    #[default]
    None,
}
