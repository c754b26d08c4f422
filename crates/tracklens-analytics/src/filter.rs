//! Row-level filter evaluation.

use std::cmp::Ordering;

use tracklens_core::{AnalyticsDateTime, ValueKind};
use tracklens_storage::DateRange;

use crate::format::parse_bool;
use crate::parser::{FilterClause, FilterValue, Operator};

/// Evaluates one clause against a cell's raw stored value.
///
/// `None` and the empty string both count as "no value". Positive operators
/// are disjunctive over the clause values; the negated ones (`NE`, `NLIKE`,
/// `NILIKE`) must hold for every value.
pub fn matches(clause: &FilterClause, value: Option<&str>, kind: ValueKind) -> bool {
    let value = value.filter(|v| !v.is_empty());
    let mut results = clause
        .values
        .iter()
        .map(|expected| matches_one(clause.operator, expected, value, kind));
    if is_negated(clause.operator) {
        results.all(|r| r)
    } else {
        results.any(|r| r)
    }
}

/// All clauses must match.
pub fn matches_all(clauses: &[FilterClause], value: Option<&str>, kind: ValueKind) -> bool {
    clauses.iter().all(|clause| matches(clause, value, kind))
}

/// Each group is one period item list; the value must fall in every group.
/// Absent or unparsable values never match a non-empty group.
pub fn matches_dates(groups: &[Vec<DateRange>], value: Option<&str>) -> bool {
    if groups.is_empty() {
        return true;
    }
    let Some(datetime) = value.and_then(|v| v.parse::<AnalyticsDateTime>().ok()) else {
        return false;
    };
    groups
        .iter()
        .all(|ranges| ranges.iter().any(|range| range.contains(&datetime)))
}

fn is_negated(operator: Operator) -> bool {
    matches!(operator, Operator::Ne | Operator::Nlike | Operator::Nilike)
}

fn matches_one(
    operator: Operator,
    expected: &FilterValue,
    actual: Option<&str>,
    kind: ValueKind,
) -> bool {
    let expected = match expected {
        FilterValue::NoValue => {
            return if is_negated(operator) {
                actual.is_some()
            } else {
                actual.is_none()
            };
        }
        FilterValue::Value(v) => v.as_str(),
    };
    let Some(actual) = actual else {
        // an absent value differs from every concrete value
        return is_negated(operator);
    };

    match operator {
        Operator::Eq | Operator::In => equals(actual, expected, kind),
        Operator::Ne => !equals(actual, expected, kind),
        Operator::Ieq => actual.eq_ignore_ascii_case(expected),
        Operator::Gt => compare(actual, expected) == Ordering::Greater,
        Operator::Ge => compare(actual, expected) != Ordering::Less,
        Operator::Lt => compare(actual, expected) == Ordering::Less,
        Operator::Le => compare(actual, expected) != Ordering::Greater,
        Operator::Like => actual.contains(expected),
        Operator::Nlike => !actual.contains(expected),
        Operator::Ilike => contains_ignore_case(actual, expected),
        Operator::Nilike => !contains_ignore_case(actual, expected),
    }
}

fn equals(actual: &str, expected: &str, kind: ValueKind) -> bool {
    match kind {
        ValueKind::Numeric => match (actual.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => actual == expected,
        },
        ValueKind::Boolean | ValueKind::TrueOnly => {
            match (parse_bool(actual), parse_bool(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => actual == expected,
            }
        }
        _ => actual == expected,
    }
}

/// Numeric when both sides are numbers, chronological when both are dates,
/// lexicographic otherwise.
pub fn compare(actual: &str, expected: &str) -> Ordering {
    if let (Ok(a), Ok(b)) = (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        return a.total_cmp(&b);
    }
    if let (Ok(a), Ok(b)) = (
        actual.parse::<AnalyticsDateTime>(),
        expected.parse::<AnalyticsDateTime>(),
    ) {
        return a.cmp(&b);
    }
    actual.cmp(expected)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
