//! Dimension token grammar.
//!
//! ```text
//! token   := path (':' suffix)*
//! path    := segment ('.' segment){0,2}
//! segment := name ('[' '-'? digits ']')?
//! suffix  := OP ':' value (';' value)*      filter clause
//!          | item (';' item)*               item list (ou, pe only)
//! ```
//!
//! This module is purely syntactic. Whether a segment names a program, a
//! stage, a data element or a static column is decided in [`crate::resolve`].

use std::fmt;
use std::sync::LazyLock;

use crate::error::QueryError;

/// Value token meaning "no value recorded".
pub const NO_VALUE: &str = "NV";

static SEGMENT_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([A-Za-z0-9_]+)(?:\[(-?\d+)\])?$").expect("Invalid segment regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ieq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Like,
    Ilike,
    Nlike,
    Nilike,
}

impl Operator {
    /// Case-insensitive keyword lookup.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EQ" => Some(Self::Eq),
            "IEQ" => Some(Self::Ieq),
            "NE" | "NEQ" => Some(Self::Ne),
            "GT" => Some(Self::Gt),
            "GE" => Some(Self::Ge),
            "LT" => Some(Self::Lt),
            "LE" => Some(Self::Le),
            "IN" => Some(Self::In),
            "LIKE" => Some(Self::Like),
            "ILIKE" => Some(Self::Ilike),
            "NLIKE" => Some(Self::Nlike),
            "NILIKE" => Some(Self::Nilike),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ieq => "IEQ",
            Self::Ne => "NE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::In => "IN",
            Self::Like => "LIKE",
            Self::Ilike => "ILIKE",
            Self::Nlike => "NLIKE",
            Self::Nilike => "NILIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    /// The `NV` sentinel.
    NoValue,
    Value(String),
}

impl FilterValue {
    fn parse(raw: &str) -> Self {
        if raw == NO_VALUE {
            Self::NoValue
        } else {
            Self::Value(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub operator: Operator,
    pub values: Vec<FilterValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub offset: Option<i32>,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{}[{offset}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One parsed dimension, filter, header or sort token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionToken {
    pub raw: String,
    pub path: Vec<PathSegment>,
    pub items: Vec<String>,
    pub filters: Vec<FilterClause>,
}

impl DimensionToken {
    /// Column key: the path as written, offsets included, suffixes dropped.
    pub fn key(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The path with offsets removed, used to key metadata items.
    pub fn plain_key(&self) -> String {
        self.path
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn leaf(&self) -> &PathSegment {
        // parse() guarantees at least one segment
        &self.path[self.path.len() - 1]
    }

    pub fn has_suffix(&self) -> bool {
        !self.items.is_empty() || !self.filters.is_empty()
    }
}

/// Splits a comma-separated parameter value into tokens, ignoring empties.
pub fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_dimension(raw: &str) -> Result<DimensionToken, QueryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QueryError::invalid_dimension(raw, "empty dimension"));
    }
    let parts: Vec<&str> = raw.split(':').collect();
    let path = parse_path(raw, parts.first().copied().unwrap_or_default())?;

    let mut items = Vec::new();
    let mut filters = Vec::new();
    let mut i = 1;
    while i < parts.len() {
        let part = parts[i];
        if let Some(operator) = Operator::parse(part) {
            let Some(first) = parts.get(i + 1) else {
                return Err(QueryError::invalid_dimension(
                    raw,
                    format!("operator {operator} has no values"),
                ));
            };
            // values may carry times, so ':' only ends them before another operator
            let mut text = first.to_string();
            i += 2;
            while i < parts.len() && !starts_clause(&parts, i) {
                text.push(':');
                text.push_str(parts[i]);
                i += 1;
            }
            let values: Vec<FilterValue> = text
                .split(';')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(FilterValue::parse)
                .collect();
            if values.is_empty() {
                return Err(QueryError::invalid_dimension(
                    raw,
                    format!("operator {operator} has no values"),
                ));
            }
            filters.push(FilterClause { operator, values });
        } else if items.is_empty() && filters.is_empty() {
            items = part
                .split(';')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if items.is_empty() {
                return Err(QueryError::invalid_dimension(raw, "empty item list"));
            }
            i += 1;
        } else {
            return Err(QueryError::invalid_dimension(
                raw,
                format!("unexpected `{part}`, expected an operator"),
            ));
        }
    }

    Ok(DimensionToken {
        raw: raw.to_string(),
        path,
        items,
        filters,
    })
}

/// An operator followed by at least one more part.
fn starts_clause(parts: &[&str], i: usize) -> bool {
    Operator::parse(parts[i]).is_some() && i + 1 < parts.len()
}

fn parse_path(raw: &str, text: &str) -> Result<Vec<PathSegment>, QueryError> {
    let segments: Vec<&str> = text.split('.').collect();
    if segments.len() > 3 {
        return Err(QueryError::invalid_dimension(
            raw,
            "a dimension path has at most three segments",
        ));
    }
    let last = segments.len() - 1;
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let parsed = parse_segment(raw, segment)?;
            if parsed.offset.is_some() && (segments.len() == 1 || i == last && segments.len() == 3)
            {
                return Err(QueryError::invalid_dimension(
                    raw,
                    "an offset attaches to a program or stage segment",
                ));
            }
            Ok(parsed)
        })
        .collect()
}

/// Parses one `name[offset]` segment; errors name the enclosing token `raw`.
pub fn parse_segment(raw: &str, segment: &str) -> Result<PathSegment, QueryError> {
    let caps = SEGMENT_REGEX.captures(segment).ok_or_else(|| {
        QueryError::invalid_dimension(raw, format!("malformed segment `{segment}`"))
    })?;
    let offset = match caps.get(2) {
        Some(m) => Some(m.as_str().parse::<i32>().map_err(|_| {
            QueryError::invalid_dimension(raw, format!("offset out of range in `{segment}`"))
        })?),
        None => None,
    };
    Ok(PathSegment {
        name: caps[1].to_string(),
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_uid() {
        let t = parse_dimension("w75KJ2mc4zz").unwrap();
        assert_eq!(t.path.len(), 1);
        assert_eq!(t.key(), "w75KJ2mc4zz");
        assert!(!t.has_suffix());
    }

    #[test]
    fn parses_stage_path_with_offsets() {
        let t = parse_dimension("IpHINAT79UW[-1].A03MvHHogjR[2].a3kGcGDCuk6").unwrap();
        assert_eq!(t.path[0].offset, Some(-1));
        assert_eq!(t.path[1].offset, Some(2));
        assert_eq!(t.path[2].offset, None);
        assert_eq!(t.key(), "IpHINAT79UW[-1].A03MvHHogjR[2].a3kGcGDCuk6");
        assert_eq!(t.plain_key(), "IpHINAT79UW.A03MvHHogjR.a3kGcGDCuk6");
        assert_eq!(t.leaf().name, "a3kGcGDCuk6");
    }

    #[test]
    fn parses_filter_with_no_value_sentinel() {
        let t = parse_dimension("WSGAb5XwJ3Y.edqlbukwRfQ[1].rHgrmXfa57b:IN:0;NV").unwrap();
        assert_eq!(t.filters.len(), 1);
        assert_eq!(t.filters[0].operator, Operator::In);
        assert_eq!(
            t.filters[0].values,
            vec![FilterValue::Value("0".into()), FilterValue::NoValue]
        );
    }

    #[test]
    fn operators_are_case_insensitive() {
        let t = parse_dimension("w75KJ2mc4zz:eq:James").unwrap();
        assert_eq!(t.filters[0].operator, Operator::Eq);
        let t = parse_dimension("lw1SqmMlnfh:gt:180:lt:200").unwrap();
        assert_eq!(t.filters.len(), 2);
        assert_eq!(t.filters[1].operator, Operator::Lt);
        assert_eq!(Operator::parse("Ieq"), Some(Operator::Ieq));
        assert_eq!(Operator::parse("neq"), Some(Operator::Ne));
    }

    #[test]
    fn filter_values_keep_their_colons() {
        let t = parse_dimension("lastupdated:GT:2015-11-01 09:00:00").unwrap();
        assert_eq!(t.key(), "lastupdated");
        assert_eq!(
            t.filters[0].values,
            vec![FilterValue::Value("2015-11-01 09:00:00".into())]
        );

        let t = parse_dimension("created:GE:2015-11-01 09:00:LT:2016-01-01 00:00").unwrap();
        assert_eq!(t.filters.len(), 2);
        assert_eq!(
            t.filters[0].values,
            vec![FilterValue::Value("2015-11-01 09:00".into())]
        );
        assert_eq!(t.filters[1].operator, Operator::Lt);
        assert_eq!(
            t.filters[1].values,
            vec![FilterValue::Value("2016-01-01 00:00".into())]
        );
    }

    #[test]
    fn parses_item_lists() {
        let t = parse_dimension("ou:USER_ORGUNIT;ImspTQPwCqd").unwrap();
        assert_eq!(t.items, vec!["USER_ORGUNIT", "ImspTQPwCqd"]);
        assert!(t.filters.is_empty());
        let t = parse_dimension("WSGAb5XwJ3Y.ou:O6uvpzGd5pu;LEVEL-3").unwrap();
        assert_eq!(t.key(), "WSGAb5XwJ3Y.ou");
        assert_eq!(t.items.len(), 2);
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in [
            "",
            "a.b.c.d",
            "w75KJ2mc4zz:EQ",
            "w75KJ2mc4zz:EQ:;",
            "bad-segment",
            "w75KJ2mc4zz[1]",
            "IpHINAT79UW.A03MvHHogjR.a3kGcGDCuk6[1]",
            "ou:A:B",
            "IpHINAT79UW..a3kGcGDCuk6",
        ] {
            let err = parse_dimension(bad).unwrap_err();
            assert!(
                matches!(err, QueryError::InvalidDimension { .. }),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn split_list_ignores_blanks() {
        let parts: Vec<&str> = split_list("a, b,,c ").collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
    }
}
