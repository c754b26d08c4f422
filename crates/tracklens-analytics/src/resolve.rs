//! Second parsing step: binds token segments to metadata.

use std::sync::Arc;

use tracklens_core::{
    DataElement, NamedObject, OptionSet, Program, ProgramIndicator, ProgramStage,
    TrackedEntityAttribute, ValueKind, ValueType, is_valid_uid,
};
use tracklens_storage::{DateRange, EnrollmentStatus, EventStatus};

use crate::error::QueryError;
use crate::metadata::MetadataCache;
use crate::parser::{DimensionToken, FilterClause, FilterValue, Operator, PathSegment};
use crate::period::PeriodResolver;

pub const OU: &str = "ou";
pub const PE: &str = "pe";

macro_rules! keyword_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $key:literal $(| $alias:literal)*, $display:literal, $vt:ident;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Case-insensitive keyword lookup, aliases included.
            pub fn parse(s: &str) -> Option<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($key $(| $alias)* => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn key(&self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }

            pub fn display_name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $display,)+
                }
            }

            pub fn value_type(&self) -> ValueType {
                match self {
                    $(Self::$variant => ValueType::$vt,)+
                }
            }
        }
    };
}

keyword_enum! {
    /// Columns every tracked entity has.
    StaticColumn {
        TrackedEntityInstanceUid => "trackedentityinstanceuid", "Tracked entity instance", Text;
        TrackedEntity => "trackedentity", "Tracked entity", Text;
        LastUpdated => "lastupdated", "Last updated", Datetime;
        LastUpdatedByDisplayName => "lastupdatedbydisplayname", "Last updated by", Text;
        Created => "created", "Created", Datetime;
        CreatedByDisplayName => "createdbydisplayname", "Created by", Text;
        StoredBy => "storedby", "Stored by", Text;
        Geometry => "geometry", "Geometry", Text;
        Longitude => "longitude", "Longitude", Number;
        Latitude => "latitude", "Latitude", Number;
        OuName => "ouname", "Organisation unit name", Text;
        OuCode => "oucode", "Organisation unit code", Text;
        OuNameHierarchy => "ounamehierarchy", "Organisation unit hierarchy", Text;
    }
}

impl StaticColumn {
    /// Block projected ahead of attributes when no `headers` are given.
    pub const DEFAULT_BLOCK: [StaticColumn; 12] = [
        StaticColumn::TrackedEntityInstanceUid,
        StaticColumn::LastUpdated,
        StaticColumn::LastUpdatedByDisplayName,
        StaticColumn::Created,
        StaticColumn::CreatedByDisplayName,
        StaticColumn::StoredBy,
        StaticColumn::Geometry,
        StaticColumn::Longitude,
        StaticColumn::Latitude,
        StaticColumn::OuName,
        StaticColumn::OuCode,
        StaticColumn::OuNameHierarchy,
    ];

    pub fn is_org_unit_related(&self) -> bool {
        matches!(self, Self::OuName | Self::OuCode | Self::OuNameHierarchy)
    }
}

keyword_enum! {
    /// Program-scoped enrollment fields, `PROG[n].field`.
    EnrollmentField {
        EnrollmentDate => "enrollmentdate" | "enrollment_date", "Enrollment date", Datetime;
        IncidentDate => "incidentdate" | "incident_date", "Incident date", Datetime;
        ProgramStatus => "programstatus" | "program_status" | "enrollmentstatus" | "enrollment_status",
            "Program Status", Text;
        OuName => "ouname", "Organisation Unit Name", Text;
        OuCode => "oucode", "Organisation Unit Code", Text;
        Ou => "ou", "Organisation unit", Text;
    }
}

keyword_enum! {
    /// Stage-scoped event fields, `PROG.STAGE[n].field` or `STAGE[n].field`.
    EventField {
        OccurredDate => "occurreddate" | "eventdate" | "event_date" | "executiondate" | "execution_date",
            "Event Date", Datetime;
        ScheduledDate => "scheduleddate" | "scheduled_date" | "duedate" | "due_date",
            "Scheduled Date", Datetime;
        EventStatus => "eventstatus" | "event_status", "Event Status", Text;
        OuName => "ouname", "Organisation Unit Name", Text;
        OuCode => "oucode", "Organisation Unit Code", Text;
        Ou => "ou", "Organisation unit", Text;
    }
}

impl EnrollmentField {
    /// The program's custom label when it defines one.
    pub fn label<'a>(&self, program: &'a Program) -> &'a str {
        let custom = match self {
            Self::EnrollmentDate => program.enrollment_date_label.as_deref(),
            Self::IncidentDate => program.incident_date_label.as_deref(),
            _ => None,
        };
        custom.unwrap_or_else(|| self.display_name())
    }
}

impl EventField {
    /// The stage's custom label when it defines one.
    pub fn label<'a>(&self, stage: &'a ProgramStage) -> &'a str {
        let custom = match self {
            Self::OccurredDate => stage.execution_date_label.as_deref(),
            Self::ScheduledDate => stage.due_date_label.as_deref(),
            _ => None,
        };
        custom.unwrap_or_else(|| self.display_name())
    }
}

/// Where a projected column's value comes from.
#[derive(Debug, Clone)]
pub enum ColumnSource {
    Static(StaticColumn),
    Attribute(Arc<TrackedEntityAttribute>),
    Enrollment {
        program: Arc<Program>,
        offset: Option<i32>,
        field: EnrollmentField,
    },
    Indicator {
        program: Arc<Program>,
        offset: Option<i32>,
        indicator: Arc<ProgramIndicator>,
    },
    Event {
        program: Arc<Program>,
        program_offset: Option<i32>,
        stage: Arc<ProgramStage>,
        stage_offset: Option<i32>,
        field: EventField,
    },
    DataElement {
        program: Arc<Program>,
        program_offset: Option<i32>,
        stage: Arc<ProgramStage>,
        stage_offset: Option<i32>,
        element: Arc<DataElement>,
    },
}

impl ColumnSource {
    /// The enrollment this column reads from, with its offset.
    pub fn program(&self) -> Option<(&Arc<Program>, Option<i32>)> {
        match self {
            Self::Static(_) | Self::Attribute(_) => None,
            Self::Enrollment {
                program, offset, ..
            }
            | Self::Indicator {
                program, offset, ..
            } => Some((program, *offset)),
            Self::Event {
                program,
                program_offset,
                ..
            }
            | Self::DataElement {
                program,
                program_offset,
                ..
            } => Some((program, *program_offset)),
        }
    }

    pub fn stage(&self) -> Option<&Arc<ProgramStage>> {
        match self {
            Self::Event { stage, .. } | Self::DataElement { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Missing values in this column are reported as "no data".
    pub fn is_program_scoped(&self) -> bool {
        self.program().is_some()
    }

    /// Bare label of an enrollment or event field, custom labels applied.
    pub fn field_label(&self) -> Option<&str> {
        match self {
            Self::Enrollment { program, field, .. } => Some(field.label(program)),
            Self::Event { stage, field, .. } => Some(field.label(stage)),
            _ => None,
        }
    }

    /// Canonical form of an item on this column, `None` when it cannot match.
    fn canonical_item(&self, item: &str) -> Option<String> {
        match self {
            Self::Enrollment {
                field: EnrollmentField::ProgramStatus,
                ..
            } => EnrollmentStatus::parse(item).map(|s| s.as_str().to_string()),
            Self::Event {
                field: EventField::EventStatus,
                ..
            } => EventStatus::parse(item).map(|s| s.as_str().to_string()),
            _ => Some(item.to_string()),
        }
    }
}

/// A token bound to exactly one projected column.
#[derive(Debug, Clone)]
pub struct Dimension {
    /// Column id, offsets included.
    pub key: String,
    /// Path with offsets stripped.
    pub plain_key: String,
    pub display_name: String,
    pub value_type: ValueType,
    pub option_set: Option<Arc<OptionSet>>,
    pub source: ColumnSource,
    pub filters: Vec<FilterClause>,
    /// Period items on a date column. Each entry is one item list; the value
    /// must fall in one of its ranges.
    pub date_filters: Vec<Vec<DateRange>>,
}

impl Dimension {
    pub fn kind(&self) -> ValueKind {
        self.value_type.kind()
    }

    fn new(display_name: String, value_type: ValueType, source: ColumnSource) -> Self {
        Self {
            key: String::new(),
            plain_key: String::new(),
            display_name,
            value_type,
            option_set: None,
            source,
            filters: Vec::new(),
            date_filters: Vec::new(),
        }
    }

    pub fn static_column(column: StaticColumn) -> Self {
        Self {
            key: column.key().to_string(),
            plain_key: column.key().to_string(),
            ..Self::new(
                column.display_name().to_string(),
                column.value_type(),
                ColumnSource::Static(column),
            )
        }
    }

    pub fn attribute(
        key: String,
        attribute: Arc<TrackedEntityAttribute>,
        option_set: Option<Arc<OptionSet>>,
        short: bool,
    ) -> Self {
        Self {
            plain_key: key.clone(),
            key,
            option_set,
            ..Self::new(
                attribute.display_name(short).to_string(),
                attribute.value_type,
                ColumnSource::Attribute(attribute),
            )
        }
    }
}

/// Outcome of resolving one token.
#[derive(Debug, Clone)]
pub enum ResolvedDimension {
    Column(Dimension),
    /// `ou:`, `PROG.ou:` or `STAGE.ou:`; restricts rows, projects nothing.
    OrgUnit {
        program: Option<Arc<Program>>,
        stage: Option<Arc<ProgramStage>>,
        items: Vec<String>,
    },
    /// `pe:`; restricts the entity creation date.
    Period { items: Vec<String> },
}

fn offset_suffix(offset: Option<i32>) -> String {
    offset.map(|n| format!(" ({n})")).unwrap_or_default()
}

/// `label, Program (po)[, Stage (so)]`, each offset next to its own segment.
fn scoped_label(
    label: &str,
    program: &Program,
    program_offset: Option<i32>,
    stage: Option<(&ProgramStage, Option<i32>)>,
    short: bool,
) -> String {
    let mut text = format!(
        "{label}, {}{}",
        program.display_name(short),
        offset_suffix(program_offset)
    );
    if let Some((stage, stage_offset)) = stage {
        text.push_str(&format!(
            ", {}{}",
            stage.display_name(short),
            offset_suffix(stage_offset)
        ));
    }
    text
}

pub struct DimensionResolver<'a> {
    cache: &'a MetadataCache,
    periods: PeriodResolver,
    short: bool,
}

impl<'a> DimensionResolver<'a> {
    pub fn new(cache: &'a MetadataCache, periods: PeriodResolver, short: bool) -> Self {
        Self {
            cache,
            periods,
            short,
        }
    }

    /// # Errors
    ///
    /// `InvalidDimension` naming the token when a segment does not resolve,
    /// when the path is inconsistent (stage outside its program, data element
    /// outside its stage), when an operator targets `ou` or `pe`, or when an
    /// item on a date column is not a period.
    pub async fn resolve(&self, token: &DimensionToken) -> Result<ResolvedDimension, QueryError> {
        match token.path.as_slice() {
            [single] => self.resolve_single(token, single).await,
            [scope, leaf] => {
                if let Some(program) = self.cache.program(&scope.name).await? {
                    return self
                        .resolve_program_leaf(token, program, scope.offset, leaf)
                        .await;
                }
                // a bare stage is scoped to the program that owns it
                let Some(stage) = self.cache.program_stage(&scope.name).await? else {
                    return Err(unknown(token, "program or program stage", &scope.name));
                };
                let program = self.program(token, &stage.program).await?;
                self.resolve_stage_leaf(token, program, None, stage, scope.offset, leaf)
                    .await
            }
            [program, stage, leaf] => {
                let program_offset = program.offset;
                let program = self.program(token, &program.name).await?;
                let stage_offset = stage.offset;
                let stage = self.stage(token, &program, &stage.name).await?;
                self.resolve_stage_leaf(token, program, program_offset, stage, stage_offset, leaf)
                    .await
            }
            _ => Err(QueryError::invalid_dimension(
                &token.raw,
                "a dimension path has one to three segments",
            )),
        }
    }

    async fn resolve_single(
        &self,
        token: &DimensionToken,
        segment: &PathSegment,
    ) -> Result<ResolvedDimension, QueryError> {
        let name = segment.name.as_str();
        if name == OU {
            return self.org_unit_dimension(token, None, None);
        }
        if name == PE {
            if !token.filters.is_empty() {
                return Err(QueryError::invalid_dimension(
                    &token.raw,
                    "the period dimension takes items, not operators",
                ));
            }
            if token.items.is_empty() {
                return Err(QueryError::invalid_dimension(&token.raw, "no period selected"));
            }
            return Ok(ResolvedDimension::Period {
                items: token.items.clone(),
            });
        }
        if let Some(column) = StaticColumn::parse(name) {
            return self.bind(Dimension::static_column(column), token);
        }
        if let Some(attribute) = self.cache.attribute(name).await? {
            let option_set = self.option_set_of(attribute.option_set.as_deref()).await?;
            let dimension = Dimension::attribute(name.to_string(), attribute, option_set, self.short);
            return self.bind(dimension, token);
        }
        Err(unknown(token, "attribute or static dimension", name))
    }

    async fn resolve_program_leaf(
        &self,
        token: &DimensionToken,
        program: Arc<Program>,
        offset: Option<i32>,
        leaf: &PathSegment,
    ) -> Result<ResolvedDimension, QueryError> {
        let name = leaf.name.as_str();
        if name == OU && offset.is_none() && token.has_suffix() {
            return self.org_unit_dimension(token, Some(program), None);
        }

        if let Some(field) = EnrollmentField::parse(name) {
            let display = scoped_label(field.label(&program), &program, offset, None, self.short);
            let source = ColumnSource::Enrollment {
                program,
                offset,
                field,
            };
            return self.bind(Dimension::new(display, field.value_type(), source), token);
        }

        if program.indicators.iter().any(|uid| uid == name)
            && let Some(indicator) = self.cache.program_indicator(name).await?
        {
            let display = scoped_label(
                indicator.display_name(self.short),
                &program,
                offset,
                None,
                self.short,
            );
            let source = ColumnSource::Indicator {
                program,
                offset,
                indicator,
            };
            return self.bind(Dimension::new(display, ValueType::Number, source), token);
        }

        if offset.is_none()
            && program.attributes.iter().any(|uid| uid == name)
            && let Some(attribute) = self.cache.attribute(name).await?
        {
            let option_set = self.option_set_of(attribute.option_set.as_deref()).await?;
            let dimension = Dimension::attribute(String::new(), attribute, option_set, self.short);
            return self.bind(dimension, token);
        }

        if program.stages.iter().any(|uid| uid == name) {
            return Err(QueryError::invalid_dimension(
                &token.raw,
                format!("stage `{name}` needs a data element or event field"),
            ));
        }
        if !is_valid_uid(name) {
            return Err(unknown(token, "program item", name));
        }
        Err(QueryError::invalid_dimension(
            &token.raw,
            format!("`{name}` is not part of program `{}`", program.uid),
        ))
    }

    async fn resolve_stage_leaf(
        &self,
        token: &DimensionToken,
        program: Arc<Program>,
        program_offset: Option<i32>,
        stage: Arc<ProgramStage>,
        stage_offset: Option<i32>,
        leaf: &PathSegment,
    ) -> Result<ResolvedDimension, QueryError> {
        let name = leaf.name.as_str();
        if name == OU && program_offset.is_none() && stage_offset.is_none() && token.has_suffix()
        {
            return self.org_unit_dimension(token, Some(program), Some(stage));
        }

        if let Some(field) = EventField::parse(name) {
            let display = scoped_label(
                field.label(&stage),
                &program,
                program_offset,
                Some((&stage, stage_offset)),
                self.short,
            );
            let source = ColumnSource::Event {
                program,
                program_offset,
                stage,
                stage_offset,
                field,
            };
            return self.bind(Dimension::new(display, field.value_type(), source), token);
        }

        if EnrollmentField::parse(name).is_some() {
            return Err(QueryError::invalid_dimension(
                &token.raw,
                format!(
                    "`{name}` is not supported for program stage `{}`, only event fields are",
                    stage.uid
                ),
            ));
        }
        if !stage.data_elements.iter().any(|uid| uid == name) {
            if !is_valid_uid(name) {
                return Err(unknown(token, "data element", name));
            }
            return Err(QueryError::invalid_dimension(
                &token.raw,
                format!("`{name}` is not a data element of stage `{}`", stage.uid),
            ));
        }
        let element = self
            .cache
            .data_element(name)
            .await?
            .ok_or_else(|| unknown(token, "data element", name))?;
        let option_set = self.option_set_of(element.option_set.as_deref()).await?;
        let display = scoped_label(
            element.display_name(self.short),
            &program,
            program_offset,
            Some((&stage, stage_offset)),
            self.short,
        );
        let value_type = element.value_type;
        let source = ColumnSource::DataElement {
            program,
            program_offset,
            stage,
            stage_offset,
            element,
        };
        let dimension = Dimension {
            option_set,
            ..Dimension::new(display, value_type, source)
        };
        self.bind(dimension, token)
    }

    /// Attaches the token's key, operator clauses and items to `dimension`.
    ///
    /// Items on date columns are period expressions; items on status fields
    /// must name a status; any other items become an `IN` clause.
    fn bind(
        &self,
        mut dimension: Dimension,
        token: &DimensionToken,
    ) -> Result<ResolvedDimension, QueryError> {
        if !matches!(dimension.source, ColumnSource::Static(_)) {
            dimension.key = token.key();
            dimension.plain_key = token.plain_key();
        }
        dimension.filters = token.filters.clone();
        if token.items.is_empty() {
            return Ok(ResolvedDimension::Column(dimension));
        }

        if matches!(dimension.kind(), ValueKind::Date | ValueKind::DateTime) {
            let mut ranges = Vec::new();
            for item in &token.items {
                let resolved = self.periods.resolve(item).map_err(|err| match err {
                    QueryError::MissingAnchorDate(_) => err,
                    _ => QueryError::invalid_dimension(
                        &token.raw,
                        format!("date time is not parsable: `{item}`"),
                    ),
                })?;
                ranges.extend(resolved.date_ranges());
            }
            dimension.date_filters.push(ranges);
            return Ok(ResolvedDimension::Column(dimension));
        }

        let mut values = Vec::with_capacity(token.items.len());
        for item in &token.items {
            let value = dimension.source.canonical_item(item).ok_or_else(|| {
                QueryError::invalid_dimension(&token.raw, format!("unknown status `{item}`"))
            })?;
            values.push(FilterValue::Value(value));
        }
        dimension.filters.push(FilterClause {
            operator: Operator::In,
            values,
        });
        Ok(ResolvedDimension::Column(dimension))
    }

    fn org_unit_dimension(
        &self,
        token: &DimensionToken,
        program: Option<Arc<Program>>,
        stage: Option<Arc<ProgramStage>>,
    ) -> Result<ResolvedDimension, QueryError> {
        if !token.filters.is_empty() {
            return Err(QueryError::invalid_dimension(
                &token.raw,
                "the org unit dimension takes items, not operators",
            ));
        }
        if token.items.is_empty() {
            return Err(QueryError::invalid_dimension(
                &token.raw,
                "no organisation unit selected",
            ));
        }
        Ok(ResolvedDimension::OrgUnit {
            program,
            stage,
            items: token.items.clone(),
        })
    }

    async fn program(
        &self,
        token: &DimensionToken,
        uid: &str,
    ) -> Result<Arc<Program>, QueryError> {
        self.cache
            .program(uid)
            .await?
            .ok_or_else(|| unknown(token, "program", uid))
    }

    async fn stage(
        &self,
        token: &DimensionToken,
        program: &Program,
        uid: &str,
    ) -> Result<Arc<ProgramStage>, QueryError> {
        let stage = self
            .cache
            .program_stage(uid)
            .await?
            .ok_or_else(|| unknown(token, "program stage", uid))?;
        if stage.program != program.uid {
            return Err(QueryError::invalid_dimension(
                &token.raw,
                format!("stage `{uid}` does not belong to program `{}`", program.uid),
            ));
        }
        Ok(stage)
    }

    async fn option_set_of(&self, uid: Option<&str>) -> Result<Option<Arc<OptionSet>>, QueryError> {
        match uid {
            Some(uid) => Ok(self.cache.option_set(uid).await?),
            None => Ok(None),
        }
    }
}

/// Unresolvable segment; malformed identifiers are reported as such.
fn unknown(token: &DimensionToken, what: &str, name: &str) -> QueryError {
    let message = if is_valid_uid(name) {
        format!("unknown {what} `{name}`")
    } else {
        format!("`{name}` is not a valid UID")
    };
    QueryError::invalid_dimension(&token.raw, message)
}
