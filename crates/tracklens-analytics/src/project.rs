//! Projection of fetched records onto the planned columns.

use std::collections::HashMap;
use std::sync::Arc;

use tracklens_core::{
    IndicatorAggregation, NamedObject, OrganisationUnit, ProgramIndicator, ProgramStage, ValueKind,
};
use tracklens_storage::{DateRange, Enrollment, Event, TrackedEntity};

use crate::filter;
use crate::format::{format, format_datetime, format_f64};
use crate::id_scheme::translate_option;
use crate::instances::{EnrollmentArena, EventArena};
use crate::planner::{
    EnrollmentCondition, EnrollmentFilter, EventCondition, EventFilter, QueryPlan,
};
use crate::resolve::{ColumnSource, Dimension, EnrollmentField, EventField, StaticColumn};
use crate::row::{Cell, Row};
use crate::sort::SortValue;

const HIERARCHY_SEPARATOR: &str = " / ";

/// True when `event` of `stage` passes every applicable event filter.
pub(crate) fn event_matches(filters: &[EventFilter], stage: &ProgramStage, event: &Event) -> bool {
    filters
        .iter()
        .filter(|f| f.applies_to(stage))
        .all(|f| match &f.condition {
            EventCondition::Status(statuses) => statuses.contains(&event.status),
            EventCondition::OccurredDate(ranges) => event
                .occurred_date
                .is_some_and(|date| DateRange::any_contains(ranges, &date)),
        })
}

pub(crate) struct Projector<'a> {
    pub plan: &'a QueryPlan,
    pub enrollments: &'a EnrollmentArena,
    pub events: &'a EventArena,
    pub org_units: &'a HashMap<String, Arc<OrganisationUnit>>,
}

impl Projector<'_> {
    /// Builds the row for `entity`, or `None` when a predicate rejects it.
    pub fn project(&self, entity: &TrackedEntity) -> Option<Row> {
        let required = &self.plan.required_programs;
        if !required.is_empty()
            && !required
                .iter()
                .any(|program| self.enrollments.is_enrolled(&entity.uid, program))
        {
            return None;
        }
        if !self
            .plan
            .enrollment_filters
            .iter()
            .all(|f| self.enrollment_filter_matches(entity, f))
        {
            return None;
        }

        let mut cells = Vec::with_capacity(self.plan.columns.len());
        for column in &self.plan.columns {
            let cell = self.cell(entity, column);
            if !filter::matches_all(&column.filters, cell.raw.as_deref(), column.kind())
                || !filter::matches_dates(&column.date_filters, cell.raw.as_deref())
            {
                return None;
            }
            cells.push(cell);
        }
        Some(Row {
            entity_uid: entity.uid.clone(),
            last_updated: entity.last_updated,
            cells,
        })
    }

    fn enrollment_filter_matches(&self, entity: &TrackedEntity, filter: &EnrollmentFilter) -> bool {
        filter.programs.iter().any(|program| {
            self.enrollments
                .select(&entity.uid, program, filter.offset)
                .is_some_and(|enrollment| match &filter.condition {
                    EnrollmentCondition::Status(statuses) => statuses.contains(&enrollment.status),
                    EnrollmentCondition::EnrollmentDate(ranges) => {
                        DateRange::any_contains(ranges, &enrollment.enrollment_date)
                    }
                    EnrollmentCondition::OrgUnit(selection) => {
                        selection.contains(&enrollment.org_unit)
                    }
                    EnrollmentCondition::EventOrgUnit { stage, selection } => self
                        .events
                        .instances(&enrollment.uid, stage)
                        .iter()
                        .any(|event| selection.contains(&event.org_unit)),
                })
        })
    }

    fn cell(&self, entity: &TrackedEntity, column: &Dimension) -> Cell {
        match &column.source {
            ColumnSource::Static(static_column) => self.static_cell(entity, *static_column),
            ColumnSource::Attribute(attribute) => self.value_cell(
                column,
                entity.attributes.get(&attribute.uid).map(String::as_str),
                false,
            ),
            ColumnSource::Enrollment {
                program,
                offset,
                field,
            } => match self.enrollments.select(&entity.uid, &program.uid, *offset) {
                Some(enrollment) => self.enrollment_cell(column, enrollment, *field),
                None => Cell::no_data(),
            },
            ColumnSource::Indicator {
                program,
                offset,
                indicator,
            } => match self.enrollments.select(&entity.uid, &program.uid, *offset) {
                Some(enrollment) => self.indicator_cell(enrollment, indicator),
                None => Cell::no_data(),
            },
            ColumnSource::Event {
                program,
                program_offset,
                stage,
                stage_offset,
                field,
            } => match self.event(entity, &program.uid, *program_offset, &stage.uid, *stage_offset) {
                Some(event) => self.event_cell(column, event, *field),
                None => Cell::no_data(),
            },
            ColumnSource::DataElement {
                program,
                program_offset,
                stage,
                stage_offset,
                element,
            } => match self.event(entity, &program.uid, *program_offset, &stage.uid, *stage_offset) {
                Some(event) => self.value_cell(
                    column,
                    event.data_values.get(&element.uid).map(String::as_str),
                    true,
                ),
                None => Cell::no_data(),
            },
        }
    }

    fn event(
        &self,
        entity: &TrackedEntity,
        program: &str,
        program_offset: Option<i32>,
        stage: &str,
        stage_offset: Option<i32>,
    ) -> Option<&Event> {
        let enrollment = self.enrollments.select(&entity.uid, program, program_offset)?;
        self.events.select(&enrollment.uid, stage, stage_offset)
    }

    /// A stored data value; option codes go through the data id scheme.
    fn value_cell(&self, column: &Dimension, raw: Option<&str>, program_scoped: bool) -> Cell {
        let Some(raw) = raw else {
            return if program_scoped {
                Cell::no_data()
            } else {
                Cell::empty()
            };
        };
        let display = match &column.option_set {
            Some(option_set) => {
                translate_option(self.plan.options.data_scheme(), option_set, raw)
            }
            None => format(column.kind(), raw),
        };
        Cell {
            raw: Some(raw.to_string()),
            display,
            sort: SortValue::from_raw(Some(raw), column.kind()),
            no_data: false,
        }
    }

    fn static_cell(&self, entity: &TrackedEntity, column: StaticColumn) -> Cell {
        let kind = column.value_type().kind();
        let value = match column {
            StaticColumn::TrackedEntityInstanceUid | StaticColumn::TrackedEntity => {
                Some(entity.uid.clone())
            }
            StaticColumn::LastUpdated => Some(format_datetime(&entity.last_updated)),
            StaticColumn::LastUpdatedByDisplayName => entity.last_updated_by.clone(),
            StaticColumn::Created => Some(format_datetime(&entity.created)),
            StaticColumn::CreatedByDisplayName => entity.created_by.clone(),
            StaticColumn::StoredBy => entity.stored_by.clone(),
            StaticColumn::Geometry => entity.geometry.map(|g| g.to_geojson()),
            StaticColumn::Longitude => entity.geometry.map(|g| format_f64(g.longitude)),
            StaticColumn::Latitude => entity.geometry.map(|g| format_f64(g.latitude)),
            StaticColumn::OuName => self.org_unit_name(&entity.org_unit),
            StaticColumn::OuCode => self.org_unit_code(&entity.org_unit),
            StaticColumn::OuNameHierarchy => self.org_unit_hierarchy(&entity.org_unit),
        };
        plain_cell(value, kind, false)
    }

    fn enrollment_cell(
        &self,
        column: &Dimension,
        enrollment: &Enrollment,
        field: EnrollmentField,
    ) -> Cell {
        let value = match field {
            EnrollmentField::EnrollmentDate => Some(format_datetime(&enrollment.enrollment_date)),
            EnrollmentField::IncidentDate => enrollment.incident_date.as_ref().map(format_datetime),
            EnrollmentField::ProgramStatus => Some(enrollment.status.as_str().to_string()),
            EnrollmentField::OuName => self.org_unit_name(&enrollment.org_unit),
            EnrollmentField::OuCode => self.org_unit_code(&enrollment.org_unit),
            EnrollmentField::Ou => Some(self.org_unit_id(&enrollment.org_unit)),
        };
        plain_cell(value, column.kind(), true)
    }

    fn event_cell(&self, column: &Dimension, event: &Event, field: EventField) -> Cell {
        let value = match field {
            EventField::OccurredDate => event.occurred_date.as_ref().map(format_datetime),
            EventField::ScheduledDate => event.scheduled_date.as_ref().map(format_datetime),
            EventField::EventStatus => Some(event.status.as_str().to_string()),
            EventField::OuName => self.org_unit_name(&event.org_unit),
            EventField::OuCode => self.org_unit_code(&event.org_unit),
            EventField::Ou => Some(self.org_unit_id(&event.org_unit)),
        };
        plain_cell(value, column.kind(), true)
    }

    fn indicator_cell(&self, enrollment: &Enrollment, indicator: &ProgramIndicator) -> Cell {
        let events = self
            .events
            .instances(&enrollment.uid, &indicator.program_stage);
        let values: Vec<f64> = match &indicator.data_element {
            Some(element) => events
                .iter()
                .filter_map(|event| event.data_values.get(element))
                .filter_map(|value| value.trim().parse::<f64>().ok())
                .collect(),
            None => Vec::new(),
        };
        let result = match indicator.aggregation {
            IndicatorAggregation::Count => Some(match indicator.data_element {
                Some(_) => values.len() as f64,
                None => events.len() as f64,
            }),
            IndicatorAggregation::Sum => (!values.is_empty()).then(|| values.iter().sum()),
            IndicatorAggregation::Average => (!values.is_empty())
                .then(|| values.iter().sum::<f64>() / values.len() as f64),
            IndicatorAggregation::Min => values.iter().copied().reduce(f64::min),
            IndicatorAggregation::Max => values.iter().copied().reduce(f64::max),
            IndicatorAggregation::Last => values.last().copied(),
        };
        let Some(mut value) = result else {
            return Cell::no_data();
        };
        if let Some(decimals) = indicator.decimals {
            let factor = 10f64.powi(i32::from(decimals));
            value = (value * factor).round() / factor;
        }
        let rendered = format_f64(value);
        Cell {
            raw: Some(rendered.clone()),
            display: rendered,
            sort: SortValue::Number(value),
            no_data: false,
        }
    }

    fn org_unit_name(&self, uid: &str) -> Option<String> {
        self.org_units
            .get(uid)
            .map(|ou| ou.display_name(self.plan.options.short_names).to_string())
    }

    fn org_unit_code(&self, uid: &str) -> Option<String> {
        self.org_units.get(uid).and_then(|ou| ou.code.clone())
    }

    /// Org unit reference rendered with the output id scheme.
    fn org_unit_id(&self, uid: &str) -> String {
        match (self.plan.options.output_id_scheme, self.org_units.get(uid)) {
            (Some(scheme), Some(ou)) => scheme.object_id(ou.as_ref()),
            _ => uid.to_string(),
        }
    }

    fn org_unit_hierarchy(&self, uid: &str) -> Option<String> {
        let ou = self.org_units.get(uid)?;
        let names: Vec<String> = ou
            .ancestry()
            .map(|ancestor| {
                self.org_units
                    .get(ancestor)
                    .map(|a| a.display_name(self.plan.options.short_names).to_string())
                    .unwrap_or_else(|| ancestor.to_string())
            })
            .collect();
        Some(names.join(HIERARCHY_SEPARATOR))
    }
}

/// Cell for an already-rendered value.
fn plain_cell(value: Option<String>, kind: ValueKind, program_scoped: bool) -> Cell {
    match value {
        Some(value) => Cell {
            sort: SortValue::from_raw(Some(&value), kind),
            raw: Some(value.clone()),
            display: value,
            no_data: false,
        },
        None if program_scoped => Cell::no_data(),
        None => Cell::empty(),
    }
}
