//! Query-string decoding.
//!
//! Only decodes and type-checks values; tokens are interpreted later by the
//! parser and planner.

use time::Date;
use tracing::debug;
use url::form_urlencoded;

use crate::error::QueryError;
use crate::id_scheme::IdScheme;
use crate::orgunit::OuMode;
use crate::parser::split_list;
use crate::sort::SortDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayProperty {
    #[default]
    Name,
    ShortName,
}

impl DisplayProperty {
    pub fn is_short(&self) -> bool {
        matches!(self, Self::ShortName)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub dimensions: Vec<String>,
    pub filters: Vec<String>,
    pub headers: Vec<String>,
    /// Sort keys in the order they appeared across `asc` and `desc`.
    pub sort: Vec<(String, SortDirection)>,
    pub programs: Vec<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub total_pages: bool,
    pub paging: bool,
    pub row_context: bool,
    pub display_property: DisplayProperty,
    pub include_metadata_details: bool,
    pub skip_meta: bool,
    pub skip_data: bool,
    pub output_id_scheme: Option<IdScheme>,
    pub data_id_scheme: Option<IdScheme>,
    pub ou_mode: Option<OuMode>,
    /// `programStatus` and `enrollmentStatus` tokens, `[PROG.]STATUS`.
    pub program_status: Vec<String>,
    /// `[PROG.STAGE.]STATUS` tokens.
    pub event_status: Vec<String>,
    pub last_updated: Vec<String>,
    pub created: Vec<String>,
    pub enrollment_date: Vec<String>,
    pub event_date: Vec<String>,
    pub relative_period_date: Option<Date>,
    pub coordinates_only: bool,
    pub geometry_only: bool,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            filters: Vec::new(),
            headers: Vec::new(),
            sort: Vec::new(),
            programs: Vec::new(),
            page: None,
            page_size: None,
            total_pages: false,
            paging: true,
            row_context: false,
            display_property: DisplayProperty::Name,
            include_metadata_details: false,
            skip_meta: false,
            skip_data: false,
            output_id_scheme: None,
            data_id_scheme: None,
            ou_mode: None,
            program_status: Vec::new(),
            event_status: Vec::new(),
            last_updated: Vec::new(),
            created: Vec::new(),
            enrollment_date: Vec::new(),
            event_date: Vec::new(),
            relative_period_date: None,
            coordinates_only: false,
            geometry_only: false,
        }
    }
}

fn parse_bool(param: &str, value: &str) -> Result<bool, QueryError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(QueryError::invalid_parameter(
            param,
            format!("expected true or false, got `{other}`"),
        )),
    }
}

fn parse_u64(param: &str, value: &str) -> Result<u64, QueryError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| QueryError::invalid_parameter(param, format!("`{value}` is not a number")))
}

fn parse_scheme(param: &str, value: &str) -> Result<IdScheme, QueryError> {
    IdScheme::parse(value).ok_or_else(|| {
        QueryError::invalid_parameter(param, format!("unsupported id scheme `{value}`"))
    })
}

fn push_list(target: &mut Vec<String>, value: &str) {
    target.extend(split_list(value).map(str::to_string));
}

impl QueryParams {
    /// Decodes an `application/x-www-form-urlencoded` query string.
    ///
    /// Repeatable parameters accumulate and are split on commas. Unknown
    /// parameters are ignored.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for values that fail to parse.
    pub fn parse_query(query: &str) -> Result<Self, QueryError> {
        let mut params = Self::default();
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            params.apply(&name, &value)?;
        }
        Ok(params)
    }

    fn apply(&mut self, name: &str, value: &str) -> Result<(), QueryError> {
        match name {
            "dimension" => push_list(&mut self.dimensions, value),
            "filter" => push_list(&mut self.filters, value),
            "headers" => push_list(&mut self.headers, value),
            "asc" => self
                .sort
                .extend(split_list(value).map(|k| (k.to_string(), SortDirection::Asc))),
            "desc" => self
                .sort
                .extend(split_list(value).map(|k| (k.to_string(), SortDirection::Desc))),
            "program" => {
                for program in split_list(value) {
                    if !self.programs.iter().any(|p| p == program) {
                        self.programs.push(program.to_string());
                    }
                }
            }
            "page" => self.page = Some(parse_u64(name, value)?),
            "pageSize" => self.page_size = Some(parse_u64(name, value)?),
            "totalPages" => self.total_pages = parse_bool(name, value)?,
            "paging" => self.paging = parse_bool(name, value)?,
            "rowContext" => self.row_context = parse_bool(name, value)?,
            "includeMetadataDetails" => self.include_metadata_details = parse_bool(name, value)?,
            "skipMeta" => self.skip_meta = parse_bool(name, value)?,
            "skipData" => self.skip_data = parse_bool(name, value)?,
            "coordinatesOnly" => self.coordinates_only = parse_bool(name, value)?,
            "geometryOnly" => self.geometry_only = parse_bool(name, value)?,
            "displayProperty" => {
                self.display_property = match value.trim().to_ascii_uppercase().as_str() {
                    "NAME" => DisplayProperty::Name,
                    "SHORTNAME" => DisplayProperty::ShortName,
                    _ => {
                        return Err(QueryError::invalid_parameter(
                            name,
                            format!("expected NAME or SHORTNAME, got `{value}`"),
                        ));
                    }
                }
            }
            "outputIdScheme" => self.output_id_scheme = Some(parse_scheme(name, value)?),
            "dataIdScheme" => self.data_id_scheme = Some(parse_scheme(name, value)?),
            "ouMode" => {
                self.ou_mode = Some(OuMode::parse(value).ok_or_else(|| {
                    QueryError::invalid_parameter(name, format!("unknown ouMode `{value}`"))
                })?)
            }
            "programStatus" | "enrollmentStatus" => push_list(&mut self.program_status, value),
            "eventStatus" => push_list(&mut self.event_status, value),
            "lastUpdated" => push_list(&mut self.last_updated, value),
            "created" => push_list(&mut self.created, value),
            "enrollmentDate" => push_list(&mut self.enrollment_date, value),
            "eventDate" => push_list(&mut self.event_date, value),
            "relativePeriodDate" => {
                let date = tracklens_core::time::parse_date(value)
                    .map_err(|e| QueryError::invalid_parameter(name, e.to_string()))?;
                self.relative_period_date = Some(date);
            }
            other => debug!(param = other, "ignoring unsupported query parameter"),
        }
        Ok(())
    }

    /// True when entities must carry a geometry.
    pub fn requires_geometry(&self) -> bool {
        self.coordinates_only || self.geometry_only
    }
}
