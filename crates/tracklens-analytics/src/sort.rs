//! Composite-key row ordering.

use std::cmp::Ordering;

use tracklens_core::ValueKind;

use crate::row::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort on the planned column at `column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub key: String,
    pub column: usize,
    pub direction: SortDirection,
}

/// Comparable form of a cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SortValue {
    #[default]
    Missing,
    Number(f64),
    Text(String),
}

impl SortValue {
    pub fn from_raw(raw: Option<&str>, kind: ValueKind) -> Self {
        match raw {
            None | Some("") => Self::Missing,
            Some(raw) if kind == ValueKind::Numeric => raw
                .trim()
                .parse::<f64>()
                .map(Self::Number)
                .unwrap_or_else(|_| Self::Text(raw.to_string())),
            Some(raw) => Self::Text(raw.to_string()),
        }
    }

    fn cmp_present(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

/// Orders two values; absent values go last whichever the direction.
fn compare_values(a: &SortValue, b: &SortValue, direction: SortDirection) -> Ordering {
    match (a, b) {
        (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
        (SortValue::Missing, _) => Ordering::Greater,
        (_, SortValue::Missing) => Ordering::Less,
        _ => match direction {
            SortDirection::Asc => a.cmp_present(b),
            SortDirection::Desc => b.cmp_present(a),
        },
    }
}

/// Sorts by `keys` left to right, then by entity UID ascending.
///
/// Without keys rows are ordered by last update, newest first.
pub fn sort_rows(rows: &mut [Row], keys: &[SortKey]) {
    if keys.is_empty() {
        rows.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.entity_uid.cmp(&b.entity_uid))
        });
        return;
    }
    let missing = SortValue::Missing;
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let left = a.cell(key.column).map_or(&missing, |c| &c.sort);
                let right = b.cell(key.column).map_or(&missing, |c| &c.sort);
                compare_values(left, right, key.direction)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entity_uid.cmp(&b.entity_uid))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Cell;
    use tracklens_core::AnalyticsDateTime;

    fn row(uid: &str, updated: &str, values: &[Option<&str>]) -> Row {
        Row {
            entity_uid: uid.into(),
            last_updated: updated.parse::<AnalyticsDateTime>().unwrap(),
            cells: values
                .iter()
                .map(|v| Cell {
                    raw: v.map(str::to_string),
                    display: v.unwrap_or_default().to_string(),
                    sort: SortValue::from_raw(*v, ValueKind::Numeric),
                    no_data: false,
                })
                .collect(),
        }
    }

    fn uids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.entity_uid.as_str()).collect()
    }

    fn key(column: usize, direction: SortDirection) -> SortKey {
        SortKey {
            key: format!("c{column}"),
            column,
            direction,
        }
    }

    #[test]
    fn desc_reverses_asc_for_distinct_keys() {
        let mut rows = vec![
            row("a", "2022-01-01", &[Some("3")]),
            row("b", "2022-01-01", &[Some("10")]),
            row("c", "2022-01-01", &[Some("1")]),
        ];
        sort_rows(&mut rows, &[key(0, SortDirection::Asc)]);
        let asc: Vec<String> = uids(&rows).into_iter().map(String::from).collect();
        assert_eq!(asc, vec!["c", "a", "b"]);
        sort_rows(&mut rows, &[key(0, SortDirection::Desc)]);
        let mut desc: Vec<String> = uids(&rows).into_iter().map(String::from).collect();
        desc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn missing_values_sort_last_both_ways() {
        let mut rows = vec![
            row("a", "2022-01-01", &[None]),
            row("b", "2022-01-01", &[Some("2")]),
            row("c", "2022-01-01", &[Some("1")]),
        ];
        sort_rows(&mut rows, &[key(0, SortDirection::Asc)]);
        assert_eq!(uids(&rows), vec!["c", "b", "a"]);
        sort_rows(&mut rows, &[key(0, SortDirection::Desc)]);
        assert_eq!(uids(&rows), vec!["b", "c", "a"]);
    }

    #[test]
    fn composite_keys_then_uid() {
        let mut rows = vec![
            row("d", "2022-01-01", &[Some("1"), Some("5")]),
            row("b", "2022-01-01", &[Some("1"), Some("7")]),
            row("c", "2022-01-01", &[Some("0"), Some("7")]),
            row("a", "2022-01-01", &[Some("1"), Some("7")]),
        ];
        sort_rows(
            &mut rows,
            &[key(0, SortDirection::Desc), key(1, SortDirection::Asc)],
        );
        assert_eq!(uids(&rows), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn default_order_is_last_updated_desc() {
        let mut rows = vec![
            row("a", "2021-05-01", &[]),
            row("c", "2022-05-01", &[]),
            row("b", "2022-05-01", &[]),
        ];
        sort_rows(&mut rows, &[]);
        assert_eq!(uids(&rows), vec!["b", "c", "a"]);
    }
}
