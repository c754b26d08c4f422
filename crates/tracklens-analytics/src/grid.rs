//! The response grid and its JSON shape.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracklens_core::ValueType;

use crate::metadata::MetadataItem;
use crate::pager::PagerKind;
use crate::planner::QueryPlan;
use crate::resolve::ColumnSource;
use crate::row::Row;

pub const NO_DATA: &str = "ND";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridHeader {
    /// Column id.
    pub name: String,
    /// Display name.
    pub column: String,
    pub value_type: ValueType,
    #[serde(rename = "type")]
    pub type_name: String,
    pub hidden: bool,
    pub meta: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_set: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_empty: bool,
}

impl GridHeader {
    pub fn new(name: impl Into<String>, column: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            value_type,
            type_name: value_type.kind().type_name().to_string(),
            hidden: false,
            meta: true,
            option_set: None,
            is_empty: false,
        }
    }
}

/// Row-context marker for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellContext {
    pub value_status: String,
}

impl CellContext {
    pub fn no_data() -> Self {
        Self {
            value_status: NO_DATA.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GridMetaData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pager: Option<PagerKind>,
    pub items: IndexMap<String, MetadataItem>,
    pub dimensions: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub headers: Vec<GridHeader>,
    pub rows: Vec<Vec<String>>,
    /// Row index to column index to marker.
    pub row_context: BTreeMap<usize, BTreeMap<usize, CellContext>>,
    pub meta_data: Option<GridMetaData>,
    /// Omit `rows` from the serialized form.
    pub skip_data: bool,
}

impl Grid {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn header_width(&self) -> usize {
        self.headers.len()
    }

    pub fn height(&self) -> usize {
        if self.skip_data { 0 } else { self.rows.len() }
    }

    pub fn pager(&self) -> Option<&PagerKind> {
        self.meta_data.as_ref().and_then(|m| m.pager.as_ref())
    }

    /// Builds the response from the paged rows.
    pub fn assemble(plan: QueryPlan, rows: Vec<Row>, pager: Option<PagerKind>) -> Self {
        let skip_data = plan.options.skip_data;
        let headers = plan
            .output
            .iter()
            .filter_map(|&index| plan.columns.get(index).map(|column| (index, column)))
            .map(|(index, column)| {
                let mut header =
                    GridHeader::new(&column.key, &column.display_name, column.value_type);
                header.option_set = column.option_set.as_ref().map(|set| set.uid.clone());
                header.is_empty = matches!(column.source, ColumnSource::Static(_))
                    && rows
                        .iter()
                        .all(|row| row.cell(index).is_none_or(|cell| cell.display.is_empty()));
                header
            })
            .collect();

        let mut row_context = BTreeMap::new();
        let mut grid_rows = Vec::new();
        if !skip_data {
            for (row_index, row) in rows.iter().enumerate() {
                let mut values = Vec::with_capacity(plan.output.len());
                for (column_index, &index) in plan.output.iter().enumerate() {
                    let cell = row.cell(index);
                    values.push(cell.map(|c| c.display.clone()).unwrap_or_default());
                    if plan.options.row_context && cell.is_some_and(|c| c.no_data) {
                        row_context
                            .entry(row_index)
                            .or_insert_with(BTreeMap::new)
                            .insert(column_index, CellContext::no_data());
                    }
                }
                grid_rows.push(values);
            }
        }

        let meta_data = (!plan.options.skip_meta).then(|| GridMetaData {
            pager,
            items: plan.registry.into_items(),
            dimensions: plan.dimensions,
        });

        Self {
            headers,
            rows: grid_rows,
            row_context,
            meta_data,
            skip_data,
        }
    }
}

impl Serialize for Grid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("headers", &self.headers)?;
        if !self.skip_data {
            map.serialize_entry("rows", &self.rows)?;
        }
        map.serialize_entry("width", &self.width())?;
        map.serialize_entry("height", &self.height())?;
        map.serialize_entry("headerWidth", &self.header_width())?;
        map.serialize_entry("rowContext", &self.row_context)?;
        if let Some(meta_data) = &self.meta_data {
            map.serialize_entry("metaData", meta_data)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid() -> Grid {
        let mut row_context = BTreeMap::new();
        row_context.insert(1, BTreeMap::from([(0, CellContext::no_data())]));
        Grid {
            headers: vec![GridHeader::new(
                "IpHINAT79UW.A03MvHHogjR.a3kGcGDCuk6",
                "MCH Apgar Score, Child Programme, Birth",
                ValueType::Number,
            )],
            rows: vec![vec!["2".into()], vec!["".into()]],
            row_context,
            meta_data: Some(GridMetaData {
                pager: Some(PagerKind::Estimated {
                    page: 1,
                    page_size: 50,
                    is_last_page: true,
                }),
                ..Default::default()
            }),
            skip_data: false,
        }
    }

    #[test]
    fn serializes_dimensions_and_row_context() {
        let value = serde_json::to_value(grid()).unwrap();
        assert_eq!(value["width"], 1);
        assert_eq!(value["headerWidth"], 1);
        assert_eq!(value["height"], 2);
        assert_eq!(value["rowContext"], json!({"1": {"0": {"valueStatus": "ND"}}}));
        assert_eq!(
            value["headers"][0],
            json!({
                "name": "IpHINAT79UW.A03MvHHogjR.a3kGcGDCuk6",
                "column": "MCH Apgar Score, Child Programme, Birth",
                "valueType": "NUMBER",
                "type": "double",
                "hidden": false,
                "meta": true
            })
        );
        assert_eq!(value["metaData"]["pager"]["isLastPage"], true);
    }

    #[test]
    fn skip_flags_drop_sections() {
        let mut g = grid();
        g.skip_data = true;
        g.meta_data = None;
        let value = serde_json::to_value(&g).unwrap();
        assert!(value.get("rows").is_none());
        assert!(value.get("metaData").is_none());
        assert_eq!(value["height"], 0);
        assert_eq!(value["width"], 1);
    }
}
