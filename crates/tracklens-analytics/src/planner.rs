//! Query planning: turns decoded parameters into an ordered projection,
//! push-down predicates, a page window and the metadata dictionary.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};
use tracklens_core::{OptionSet, Program, ProgramStage, TrackedEntityType, validate_uid};
use tracklens_storage::{DateRange, EnrollmentStatus, EntityQuery, EventStatus, UserAccount};

use crate::config::AnalyticsConfig;
use crate::error::QueryError;
use crate::id_scheme::IdScheme;
use crate::metadata::{DimensionType, MetadataCache, MetadataItem, MetadataRegistry};
use crate::orgunit::{OrgUnitResolver, OrgUnitSelection, USER_ORGUNIT};
use crate::pager::Paging;
use crate::params::QueryParams;
use crate::parser::{parse_dimension, parse_segment};
use crate::period::{PeriodResolver, ResolvedPeriod};
use crate::resolve::{
    ColumnSource, Dimension, DimensionResolver, EnrollmentField, EventField, ResolvedDimension,
    StaticColumn,
};
use crate::sort::SortKey;

/// Row-level condition on the selected enrollment of a program.
#[derive(Debug, Clone)]
pub enum EnrollmentCondition {
    Status(Vec<EnrollmentStatus>),
    EnrollmentDate(Vec<DateRange>),
    /// The enrollment's org unit is in the selection.
    OrgUnit(OrgUnitSelection),
    /// Some event of `stage` in the enrollment is in the selection.
    EventOrgUnit {
        stage: String,
        selection: OrgUnitSelection,
    },
}

/// Satisfied when any of `programs` has a selected enrollment meeting
/// `condition`.
#[derive(Debug, Clone)]
pub struct EnrollmentFilter {
    pub programs: Vec<String>,
    pub offset: Option<i32>,
    pub condition: EnrollmentCondition,
}

#[derive(Debug, Clone)]
pub enum EventCondition {
    Status(Vec<EventStatus>),
    OccurredDate(Vec<DateRange>),
}

/// Pre-filter on fetched stage instances. A `None` scope matches any.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub program: Option<String>,
    pub stage: Option<String>,
    pub condition: EventCondition,
}

impl EventFilter {
    pub fn applies_to(&self, stage: &ProgramStage) -> bool {
        match (&self.stage, &self.program) {
            (Some(uid), _) => *uid == stage.uid,
            (None, Some(program)) => *program == stage.program,
            (None, None) => true,
        }
    }
}

/// Rendering switches carried from the request into assembly.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub row_context: bool,
    pub skip_meta: bool,
    pub skip_data: bool,
    pub short_names: bool,
    pub output_id_scheme: Option<IdScheme>,
    pub data_id_scheme: Option<IdScheme>,
}

impl OutputOptions {
    /// Scheme for option-coded data values.
    pub fn data_scheme(&self) -> Option<IdScheme> {
        self.data_id_scheme.or(self.output_id_scheme)
    }
}

#[derive(Debug)]
pub struct QueryPlan {
    pub tracked_entity_type: Arc<TrackedEntityType>,
    /// Every projected column, hidden auxiliary ones included.
    pub columns: Vec<Dimension>,
    /// Indices into `columns` that become grid headers, in order.
    pub output: Vec<usize>,
    pub sort: Vec<SortKey>,
    pub entity_query: EntityQuery,
    /// Entities must be enrolled in at least one of these.
    pub required_programs: Vec<String>,
    /// Programs whose enrollments are fetched.
    pub enrollment_programs: Vec<String>,
    /// Stages whose events are fetched.
    pub stages: Vec<Arc<ProgramStage>>,
    pub enrollment_filters: Vec<EnrollmentFilter>,
    pub event_filters: Vec<EventFilter>,
    pub paging: Paging,
    pub options: OutputOptions,
    pub registry: MetadataRegistry,
    pub dimensions: IndexMap<String, Vec<String>>,
}

impl QueryPlan {
    pub fn output_columns(&self) -> impl Iterator<Item = &Dimension> {
        self.output.iter().filter_map(|&i| self.columns.get(i))
    }
}

/// Accumulates columns and metadata while a plan is being built.
struct PlanBuilder {
    columns: Vec<Dimension>,
    registry: MetadataRegistry,
    dimensions: IndexMap<String, Vec<String>>,
    periods: Vec<String>,
    entity_org_units: Option<HashSet<String>>,
    created: Vec<DateRange>,
    last_updated: Vec<DateRange>,
    enrollment_filters: Vec<EnrollmentFilter>,
    event_filters: Vec<EventFilter>,
    short: bool,
}

impl PlanBuilder {
    fn new(details: bool, short: bool) -> Self {
        Self {
            columns: Vec::new(),
            registry: MetadataRegistry::new(details),
            dimensions: IndexMap::new(),
            periods: Vec::new(),
            entity_org_units: None,
            created: Vec::new(),
            last_updated: Vec::new(),
            enrollment_filters: Vec::new(),
            event_filters: Vec::new(),
            short,
        }
    }

    fn find_column(&self, key: &str) -> Option<usize> {
        let canonical = StaticColumn::parse(key).map_or(key, |c| c.key());
        self.columns.iter().position(|c| c.key == canonical)
    }

    /// Adds a column, merging filters into an existing one with the same key.
    fn add_column(&mut self, dimension: Dimension) -> usize {
        if let Some(index) = self.find_column(&dimension.key) {
            let column = &mut self.columns[index];
            column.filters.extend(dimension.filters);
            column.date_filters.extend(dimension.date_filters);
            return index;
        }
        self.columns.push(dimension);
        self.columns.len() - 1
    }

    fn register_program(&mut self, program: &Program) {
        self.registry
            .register(program.uid.clone(), MetadataItem::program(program, self.short));
    }

    fn register_option_set(&mut self, option_set: &OptionSet) {
        self.registry.register(
            option_set.uid.clone(),
            MetadataItem::option_set(option_set, self.short),
        );
        for option in &option_set.options {
            self.registry
                .register(option.uid.clone(), MetadataItem::option(option));
        }
    }

    fn option_uids(option_set: Option<&Arc<OptionSet>>) -> Vec<String> {
        option_set
            .map(|set| set.options.iter().map(|o| o.uid.clone()).collect())
            .unwrap_or_default()
    }

    fn collect_periods(&mut self, resolved: &ResolvedPeriod) -> Vec<DateRange> {
        if let ResolvedPeriod::Relative { keyword, .. } = resolved {
            self.registry
                .register_detail(keyword.keyword(), MetadataItem::relative_period(*keyword));
        }
        for period in resolved.periods() {
            if !self.periods.contains(&period.iso) {
                self.periods.push(period.iso.clone());
            }
            self.registry
                .register_detail(period.iso.clone(), MetadataItem::period(period));
        }
        resolved.date_ranges()
    }

    fn apply_org_units(&mut self, key: &str, selection: &OrgUnitSelection) {
        self.dimensions
            .insert(key.to_string(), selection.selected_uids());
        for ou in &selection.selected {
            self.registry
                .register_detail(ou.uid.clone(), MetadataItem::org_unit(ou, self.short));
        }
        if let Some(user_units) = &selection.user_org_units {
            self.registry
                .register_detail(USER_ORGUNIT, MetadataItem::user_org_units(user_units.clone()));
        }
    }

    /// Date and org unit fields are described under their path, e.g.
    /// `IpHINAT79UW.enrollmentdate`.
    fn register_field_label(&mut self, column: &Dimension, dimension_type: Option<DimensionType>) {
        if let (Some(label), Some(dimension_type)) = (column.source.field_label(), dimension_type) {
            self.registry.register_detail(
                column.plain_key.clone(),
                MetadataItem::static_column(label, dimension_type),
            );
        }
    }

    /// Registers the descriptors each column references.
    fn register_columns(&mut self) {
        let columns = self.columns.clone();
        for column in &columns {
            match &column.source {
                ColumnSource::Static(static_column) => {
                    if static_column.is_org_unit_related() {
                        self.registry.register_detail(
                            static_column.key(),
                            MetadataItem::static_column(
                                static_column.display_name(),
                                DimensionType::OrganisationUnit,
                            ),
                        );
                    }
                }
                ColumnSource::Attribute(attribute) => {
                    self.registry.register(
                        attribute.uid.clone(),
                        MetadataItem::attribute(attribute, self.short),
                    );
                    self.dimensions
                        .entry(attribute.uid.clone())
                        .or_insert_with(|| Self::option_uids(column.option_set.as_ref()));
                }
                ColumnSource::Enrollment { program, field, .. } => {
                    self.register_program(program);
                    let dimension_type = match field {
                        EnrollmentField::EnrollmentDate | EnrollmentField::IncidentDate => {
                            Some(DimensionType::Period)
                        }
                        EnrollmentField::OuName | EnrollmentField::OuCode => {
                            Some(DimensionType::OrganisationUnit)
                        }
                        _ => None,
                    };
                    self.register_field_label(column, dimension_type);
                }
                ColumnSource::Indicator {
                    program, indicator, ..
                } => {
                    self.register_program(program);
                    self.registry.register(
                        indicator.uid.clone(),
                        MetadataItem::indicator(indicator, self.short),
                    );
                }
                ColumnSource::Event {
                    program,
                    stage,
                    field,
                    ..
                } => {
                    self.register_program(program);
                    self.registry.register(
                        stage.uid.clone(),
                        MetadataItem::program_stage(stage, self.short),
                    );
                    let dimension_type = match field {
                        EventField::OccurredDate | EventField::ScheduledDate => {
                            Some(DimensionType::Period)
                        }
                        EventField::OuName | EventField::OuCode => {
                            Some(DimensionType::OrganisationUnit)
                        }
                        _ => None,
                    };
                    self.register_field_label(column, dimension_type);
                }
                ColumnSource::DataElement {
                    program,
                    stage,
                    element,
                    ..
                } => {
                    self.register_program(program);
                    self.registry.register(
                        stage.uid.clone(),
                        MetadataItem::program_stage(stage, self.short),
                    );
                    let item = MetadataItem::data_element(element, self.short, true);
                    self.registry.register(element.uid.clone(), item.clone());
                    self.registry.register(column.plain_key.clone(), item);
                    self.dimensions
                        .entry(column.plain_key.clone())
                        .or_insert_with(|| Self::option_uids(column.option_set.as_ref()));
                }
            }
            if let Some(option_set) = &column.option_set {
                self.register_option_set(option_set);
            }
        }
    }
}

fn push_unique(target: &mut Vec<String>, value: &str) {
    if !target.iter().any(|v| v == value) {
        target.push(value.to_string());
    }
}

pub struct QueryPlanner<'a> {
    metadata: &'a MetadataCache,
    config: &'a AnalyticsConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(metadata: &'a MetadataCache, config: &'a AnalyticsConfig) -> Self {
        Self { metadata, config }
    }

    /// Builds the plan for one request.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown tracked entity type, `InvalidDimension` for
    /// tokens that do not resolve, `UnknownDimension` for header and sort
    /// keys outside the plan, `MissingAnchorDate` and `InvalidParameter` for
    /// bad period and status parameters.
    pub async fn plan(
        &self,
        tracked_entity_type: &str,
        params: &QueryParams,
        user: Option<&UserAccount>,
    ) -> Result<QueryPlan, QueryError> {
        let short = params.display_property.is_short();
        let tet = self
            .metadata
            .tracked_entity_type(tracked_entity_type)
            .await?
            .ok_or_else(|| QueryError::not_found("TrackedEntityType", tracked_entity_type))?;
        let periods = PeriodResolver::new(
            params.relative_period_date,
            self.config.financial_year_start,
        );
        let resolver = DimensionResolver::new(self.metadata, periods, short);
        let ou_mode = params.ou_mode.unwrap_or(self.config.default_ou_mode);
        let mut builder = PlanBuilder::new(params.include_metadata_details, short);

        let listed = self.listed_programs(&tet, params).await?;
        for program in &listed {
            builder.register_program(program);
        }

        // dimension and filter tokens
        let mut requested = Vec::new();
        let tokens = params
            .dimensions
            .iter()
            .map(|raw| (raw, true))
            .chain(params.filters.iter().map(|raw| (raw, false)));
        for (raw, is_dimension) in tokens {
            let token = parse_dimension(raw)?;
            match resolver.resolve(&token).await? {
                ResolvedDimension::Column(dimension) => {
                    let index = builder.add_column(dimension);
                    if is_dimension && !requested.contains(&index) {
                        requested.push(index);
                    }
                }
                ResolvedDimension::OrgUnit {
                    program,
                    stage,
                    items,
                } => {
                    let selection = OrgUnitResolver::new(self.metadata)
                        .resolve(&token.raw, &items, ou_mode, user)
                        .await?;
                    builder.registry.register_detail(
                        "ou",
                        MetadataItem::dimension(
                            "ou",
                            "Organisation unit",
                            DimensionType::OrganisationUnit,
                        ),
                    );
                    match (program, stage) {
                        (None, _) => {
                            builder.apply_org_units("ou", &selection);
                            builder.entity_org_units = Some(match builder.entity_org_units.take() {
                                Some(current) => current
                                    .intersection(&selection.effective)
                                    .cloned()
                                    .collect(),
                                None => selection.effective.clone(),
                            });
                        }
                        (Some(program), None) => {
                            builder.register_program(&program);
                            builder.apply_org_units(&token.key(), &selection);
                            builder.enrollment_filters.push(EnrollmentFilter {
                                programs: vec![program.uid.clone()],
                                offset: None,
                                condition: EnrollmentCondition::OrgUnit(selection),
                            });
                        }
                        (Some(program), Some(stage)) => {
                            builder.register_program(&program);
                            builder.registry.register(
                                stage.uid.clone(),
                                MetadataItem::program_stage(&stage, short),
                            );
                            builder.apply_org_units(&token.key(), &selection);
                            builder.enrollment_filters.push(EnrollmentFilter {
                                programs: vec![program.uid.clone()],
                                offset: None,
                                condition: EnrollmentCondition::EventOrgUnit {
                                    stage: stage.uid.clone(),
                                    selection,
                                },
                            });
                        }
                    }
                }
                ResolvedDimension::Period { items } => {
                    for item in &items {
                        let resolved = periods.resolve(item)?;
                        let ranges = builder.collect_periods(&resolved);
                        builder.created.extend(ranges);
                    }
                }
            }
        }

        // `programStatus=PROG` requests the status column without a constraint
        for token in &params.program_status {
            if let Some(program) = self.bare_status_program(token).await? {
                let key = format!("{}.{}", program.uid, EnrollmentField::ProgramStatus.key());
                let token = parse_dimension(&key)?;
                if let ResolvedDimension::Column(dimension) = resolver.resolve(&token).await? {
                    let index = builder.add_column(dimension);
                    if !requested.contains(&index) {
                        requested.push(index);
                    }
                }
            }
        }

        // header projection
        let mut output = Vec::new();
        if params.headers.is_empty() {
            for column in StaticColumn::DEFAULT_BLOCK {
                output.push(builder.add_column(Dimension::static_column(column)));
            }
            for index in self.default_attributes(&tet, &listed, &mut builder, short).await? {
                if !output.contains(&index) {
                    output.push(index);
                }
            }
            for index in requested {
                if !output.contains(&index) {
                    output.push(index);
                }
            }
        } else {
            for header in &params.headers {
                let index = self.auxiliary_column(&resolver, &mut builder, header).await?;
                if !output.contains(&index) {
                    output.push(index);
                }
            }
        }

        let mut sort = Vec::with_capacity(params.sort.len());
        for (key, direction) in &params.sort {
            let column = self.auxiliary_column(&resolver, &mut builder, key).await?;
            sort.push(SortKey {
                key: key.clone(),
                column,
                direction: *direction,
            });
        }

        // entity-level period parameters
        for token in &params.created {
            let resolved = periods.resolve(token)?;
            let ranges = builder.collect_periods(&resolved);
            builder.created.extend(ranges);
        }
        for token in &params.last_updated {
            let resolved = periods.resolve(token)?;
            let ranges = builder.collect_periods(&resolved);
            builder.last_updated.extend(ranges);
        }

        let column_programs: Vec<String> = {
            let mut programs = Vec::new();
            for column in &builder.columns {
                if let Some((program, _)) = column.source.program() {
                    push_unique(&mut programs, &program.uid);
                }
            }
            programs
        };
        let default_scope: Vec<String> = if listed.is_empty() {
            column_programs.clone()
        } else {
            listed.iter().map(|p| p.uid.clone()).collect()
        };

        self.enrollment_date_filters(&periods, params, &default_scope, &mut builder)
            .await?;
        self.status_filters(params, &default_scope, &mut builder)
            .await?;
        self.event_date_filters(&periods, params, &mut builder)
            .await?;

        builder.register_columns();
        builder.registry.register_detail(
            "pe",
            MetadataItem::dimension("pe", "Period", DimensionType::Period),
        );
        let pe = std::mem::take(&mut builder.periods);
        builder.dimensions.insert("pe".to_string(), pe);

        // fetch lists
        let mut enrollment_programs = column_programs;
        for program in &listed {
            push_unique(&mut enrollment_programs, &program.uid);
        }
        for filter in &builder.enrollment_filters {
            for program in &filter.programs {
                push_unique(&mut enrollment_programs, program);
            }
        }
        let stages = self
            .fetched_stages(&builder.columns, &builder.enrollment_filters)
            .await?;

        let entity_query = EntityQuery {
            tracked_entity_type: tet.uid.clone(),
            org_units: builder.entity_org_units.take(),
            created: std::mem::take(&mut builder.created),
            last_updated: std::mem::take(&mut builder.last_updated),
            geometry_only: params.requires_geometry(),
        };

        let paging = Paging::from_params(
            params.page,
            params.page_size,
            params.paging,
            params.total_pages,
            self.config,
        )?;

        debug!(
            tracked_entity_type = %tet.uid,
            columns = builder.columns.len(),
            output = output.len(),
            sort_keys = sort.len(),
            programs = enrollment_programs.len(),
            stages = stages.len(),
            "query planned"
        );

        Ok(QueryPlan {
            tracked_entity_type: tet,
            columns: builder.columns,
            output,
            sort,
            entity_query,
            required_programs: listed.iter().map(|p| p.uid.clone()).collect(),
            enrollment_programs,
            stages,
            enrollment_filters: builder.enrollment_filters,
            event_filters: builder.event_filters,
            paging,
            options: OutputOptions {
                row_context: params.row_context,
                skip_meta: params.skip_meta,
                skip_data: params.skip_data,
                short_names: short,
                output_id_scheme: params.output_id_scheme,
                data_id_scheme: params.data_id_scheme,
            },
            registry: builder.registry,
            dimensions: builder.dimensions,
        })
    }

    async fn listed_programs(
        &self,
        tet: &TrackedEntityType,
        params: &QueryParams,
    ) -> Result<Vec<Arc<Program>>, QueryError> {
        let mut listed = Vec::with_capacity(params.programs.len());
        for uid in &params.programs {
            validate_uid(uid)?;
            let program = self.metadata.program(uid).await?.ok_or_else(|| {
                QueryError::invalid_parameter("program", format!("unknown program `{uid}`"))
            })?;
            if let Some(type_uid) = &program.tracked_entity_type
                && *type_uid != tet.uid
            {
                return Err(QueryError::invalid_parameter(
                    "program",
                    format!(
                        "program `{uid}` does not track entities of type `{}`",
                        tet.uid
                    ),
                ));
            }
            listed.push(program);
        }
        Ok(listed)
    }

    /// Program attributes for the listed programs, or the type's attributes.
    async fn default_attributes(
        &self,
        tet: &TrackedEntityType,
        listed: &[Arc<Program>],
        builder: &mut PlanBuilder,
        short: bool,
    ) -> Result<Vec<usize>, QueryError> {
        let mut uids: Vec<String> = Vec::new();
        if listed.is_empty() {
            for uid in &tet.attributes {
                push_unique(&mut uids, uid);
            }
        } else {
            for program in listed {
                for uid in &program.attributes {
                    push_unique(&mut uids, uid);
                }
            }
        }

        let mut indices = Vec::with_capacity(uids.len());
        for uid in uids {
            let Some(attribute) = self.metadata.attribute(&uid).await? else {
                warn!(attribute = %uid, "attribute referenced by metadata is missing");
                continue;
            };
            let option_set = match attribute.option_set.as_deref() {
                Some(set) => self.metadata.option_set(set).await?,
                None => None,
            };
            let dimension = Dimension::attribute(uid, attribute, option_set, short);
            indices.push(builder.add_column(dimension));
        }
        Ok(indices)
    }

    /// Resolves a header or sort key to a column, adding a hidden one when
    /// the key is resolvable but was not requested.
    async fn auxiliary_column(
        &self,
        resolver: &DimensionResolver<'_>,
        builder: &mut PlanBuilder,
        key: &str,
    ) -> Result<usize, QueryError> {
        if let Some(index) = builder.find_column(key) {
            return Ok(index);
        }
        let token = match parse_dimension(key) {
            Ok(token) if !token.has_suffix() => token,
            _ => return Err(QueryError::unknown_dimension(key)),
        };
        match resolver.resolve(&token).await {
            Ok(ResolvedDimension::Column(dimension)) => Ok(builder.add_column(dimension)),
            Ok(_) => Err(QueryError::unknown_dimension(key)),
            Err(QueryError::InvalidDimension { .. }) => Err(QueryError::unknown_dimension(key)),
            Err(other) => Err(other),
        }
    }

    /// `enrollmentDate=[PROG[n].]PERIODS`.
    async fn enrollment_date_filters(
        &self,
        periods: &PeriodResolver,
        params: &QueryParams,
        default_scope: &[String],
        builder: &mut PlanBuilder,
    ) -> Result<(), QueryError> {
        for token in &params.enrollment_date {
            let (scope, period_text) = match token.rsplit_once('.') {
                Some((scope, period)) => (Some(scope), period),
                None => (None, token.as_str()),
            };
            let mut ranges = Vec::new();
            for item in period_text.split(';').filter(|s| !s.is_empty()) {
                let resolved = periods.resolve(item)?;
                ranges.extend(builder.collect_periods(&resolved));
            }
            let (programs, offset) = match scope {
                Some(scope) => {
                    let segment = parse_segment(token, scope)?;
                    let program = self.scoped_program(token, &segment.name).await?;
                    builder.register_program(&program);
                    (vec![program.uid.clone()], segment.offset)
                }
                None => (self.require_scope("enrollmentDate", default_scope)?, None),
            };
            builder.enrollment_filters.push(EnrollmentFilter {
                programs,
                offset,
                condition: EnrollmentCondition::EnrollmentDate(ranges),
            });
        }
        Ok(())
    }

    /// `programStatus=[PROG.]STATUS` and `eventStatus=[PROG[.STAGE].]STATUS`.
    async fn status_filters(
        &self,
        params: &QueryParams,
        default_scope: &[String],
        builder: &mut PlanBuilder,
    ) -> Result<(), QueryError> {
        for token in &params.program_status {
            if self.bare_status_program(token).await?.is_some() {
                continue;
            }
            let (scope, status) = match token.rsplit_once('.') {
                Some((scope, status)) => (Some(scope), status),
                None => (None, token.as_str()),
            };
            let status = EnrollmentStatus::parse(status).ok_or_else(|| {
                QueryError::invalid_parameter(
                    "programStatus",
                    format!("unknown enrollment status `{status}`"),
                )
            })?;
            let programs = match scope {
                Some(uid) => {
                    let program = self.scoped_program(token, uid).await?;
                    builder.register_program(&program);
                    vec![program.uid.clone()]
                }
                None => self.require_scope("programStatus", default_scope)?,
            };
            builder.enrollment_filters.push(EnrollmentFilter {
                programs,
                offset: None,
                condition: EnrollmentCondition::Status(vec![status]),
            });
        }

        for token in &params.event_status {
            let (scope, status) = match token.rsplit_once('.') {
                Some((scope, status)) => (Some(scope), status),
                None => (None, token.as_str()),
            };
            let status = EventStatus::parse(status).ok_or_else(|| {
                QueryError::invalid_parameter(
                    "eventStatus",
                    format!("unknown event status `{status}`"),
                )
            })?;
            let (program, stage) = self.event_scope(token, scope).await?;
            builder.event_filters.push(EventFilter {
                program,
                stage,
                condition: EventCondition::Status(vec![status]),
            });
        }
        Ok(())
    }

    /// `eventDate=[PROG[.STAGE].]PERIODS`.
    async fn event_date_filters(
        &self,
        periods: &PeriodResolver,
        params: &QueryParams,
        builder: &mut PlanBuilder,
    ) -> Result<(), QueryError> {
        for token in &params.event_date {
            let (scope, period_text) = match token.rsplit_once('.') {
                Some((scope, period)) => (Some(scope), period),
                None => (None, token.as_str()),
            };
            let mut ranges = Vec::new();
            for item in period_text.split(';').filter(|s| !s.is_empty()) {
                let resolved = periods.resolve(item)?;
                ranges.extend(builder.collect_periods(&resolved));
            }
            let (program, stage) = self.event_scope(token, scope).await?;
            builder.event_filters.push(EventFilter {
                program,
                stage,
                condition: EventCondition::OccurredDate(ranges),
            });
        }
        Ok(())
    }

    /// The program named by a `programStatus` value that carries no status.
    async fn bare_status_program(&self, token: &str) -> Result<Option<Arc<Program>>, QueryError> {
        if token.contains('.') || EnrollmentStatus::parse(token).is_some() {
            return Ok(None);
        }
        Ok(self.metadata.program(token).await?)
    }

    async fn scoped_program(&self, token: &str, uid: &str) -> Result<Arc<Program>, QueryError> {
        self.metadata.program(uid).await?.ok_or_else(|| {
            QueryError::invalid_dimension(token, format!("unknown program `{uid}`"))
        })
    }

    async fn event_scope(
        &self,
        token: &str,
        scope: Option<&str>,
    ) -> Result<(Option<String>, Option<String>), QueryError> {
        let Some(scope) = scope else {
            return Ok((None, None));
        };
        let (program_uid, stage_uid) = match scope.split_once('.') {
            Some((program, stage)) => (program, Some(stage)),
            None => (scope, None),
        };
        let program = self.scoped_program(token, program_uid).await?;
        let Some(stage_uid) = stage_uid else {
            return Ok((Some(program.uid.clone()), None));
        };
        let stage = self
            .metadata
            .program_stage(stage_uid)
            .await?
            .filter(|stage| stage.program == program.uid)
            .ok_or_else(|| {
                QueryError::invalid_dimension(
                    token,
                    format!("`{stage_uid}` is not a stage of program `{}`", program.uid),
                )
            })?;
        Ok((Some(program.uid.clone()), Some(stage.uid.clone())))
    }

    fn require_scope(&self, param: &str, scope: &[String]) -> Result<Vec<String>, QueryError> {
        if scope.is_empty() {
            return Err(QueryError::invalid_parameter(
                param,
                "requires a program, either as a prefix or through the program parameter",
            ));
        }
        Ok(scope.to_vec())
    }

    /// Stages referenced by event and data element columns, by indicators
    /// and by stage org unit conditions.
    async fn fetched_stages(
        &self,
        columns: &[Dimension],
        enrollment_filters: &[EnrollmentFilter],
    ) -> Result<Vec<Arc<ProgramStage>>, QueryError> {
        let mut stages: Vec<Arc<ProgramStage>> = Vec::new();
        for filter in enrollment_filters {
            if let EnrollmentCondition::EventOrgUnit { stage, .. } = &filter.condition
                && !stages.iter().any(|s| s.uid == *stage)
                && let Some(stage) = self.metadata.program_stage(stage).await?
            {
                stages.push(stage);
            }
        }
        for column in columns {
            let stage = match &column.source {
                ColumnSource::Event { stage, .. } | ColumnSource::DataElement { stage, .. } => {
                    Some(Arc::clone(stage))
                }
                ColumnSource::Indicator { indicator, .. } => {
                    self.metadata.program_stage(&indicator.program_stage).await?
                }
                _ => None,
            };
            if let Some(stage) = stage
                && !stages.iter().any(|s| s.uid == stage.uid)
            {
                stages.push(stage);
            }
        }
        Ok(stages)
    }
}
