//! End-to-end query tests against a seeded in-memory store.

use std::sync::Arc;

use serde_json::{Value, json};
use tracklens_analytics::csv::{CsvWriter, read_csv};
use tracklens_analytics::{AnalyticsConfig, AnalyticsEngine, Grid, QueryError};
use tracklens_db_memory::{InMemoryStore, Snapshot};

const PERSON: &str = "nEenWmSyUEp";
const CHILD_PROGRAMME: &str = "IpHINAT79UW";
const WEIGHT: &str = "IpHINAT79UW.A03MvHHogjR.UXz7xuGCEhU";
const APGAR: &str = "IpHINAT79UW.A03MvHHogjR.a3kGcGDCuk6";

// =============================================================================
// Fixture
// =============================================================================

struct Person {
    uid: &'static str,
    org_unit: &'static str,
    first_name: &'static str,
    created: &'static str,
    last_updated: &'static str,
    /// Enrollment date and status in the Child Programme.
    enrollment: Option<(&'static str, &'static str)>,
    /// Occurred date and status of the Birth event.
    visit: (&'static str, &'static str),
    weight: Option<&'static str>,
    apgar: Option<&'static str>,
}

const PEOPLE: &[Person] = &[
    Person {
        uid: "ebp9zX3uy7m",
        org_unit: "DiszpKrYNg8",
        first_name: "Anna",
        created: "2015-08-06T21:12:37.190",
        last_updated: "2015-08-06T21:20:41.753",
        enrollment: Some(("2015-07-01T00:00:00.000", "ACTIVE")),
        visit: ("2015-08-02T00:00:00.000", "COMPLETED"),
        weight: Some("4000"),
        apgar: Some("3"),
    },
    Person {
        uid: "dNpxRu1mWG5",
        org_unit: "DiszpKrYNg8",
        first_name: "Bea",
        created: "2015-02-10T08:00:00.000",
        last_updated: "2015-09-01T10:00:00.000",
        enrollment: Some(("2015-08-01T00:00:00.000", "COMPLETED")),
        visit: ("2015-08-02T00:00:00.000", "COMPLETED"),
        weight: Some("3800"),
        apgar: None,
    },
    Person {
        uid: "vOxUH373fy5",
        org_unit: "DiszpKrYNg8",
        first_name: "Cleo",
        created: "2015-03-11T08:00:00.000",
        last_updated: "2015-10-01T10:00:00.000",
        enrollment: Some(("2015-08-01T00:00:00.000", "ACTIVE")),
        visit: ("2015-08-02T00:00:00.000", "COMPLETED"),
        weight: Some("3500"),
        apgar: Some("10"),
    },
    Person {
        uid: "tJhVXbD1cMp",
        org_unit: "DiszpKrYNg8",
        first_name: "Dina",
        created: "2015-04-12T08:00:00.000",
        last_updated: "2015-11-01T10:00:00.000",
        enrollment: Some(("2016-01-15T00:00:00.000", "ACTIVE")),
        visit: ("2015-08-02T00:00:00.000", "COMPLETED"),
        weight: Some("3200"),
        apgar: Some("8"),
    },
    Person {
        uid: "xGhjGTE7qPY",
        org_unit: "DiszpKrYNg8",
        first_name: "Esi",
        created: "2015-05-13T08:00:00.000",
        last_updated: "2015-12-01T10:00:00.000",
        enrollment: Some(("2015-09-01T00:00:00.000", "CANCELLED")),
        visit: ("2015-08-02T00:00:00.000", "COMPLETED"),
        weight: None,
        apgar: None,
    },
    Person {
        uid: "pybd813kIWx",
        org_unit: "DiszpKrYNg8",
        first_name: "Fatu",
        created: "2014-06-01T08:00:00.000",
        last_updated: "2015-12-02T10:00:00.000",
        enrollment: None,
        visit: ("2015-08-02T00:00:00.000", "COMPLETED"),
        weight: None,
        apgar: None,
    },
    Person {
        uid: "kRy7mwt4TLP",
        org_unit: "fdc6uOvgoji",
        first_name: "Gina",
        created: "2015-07-14T08:00:00.000",
        last_updated: "2015-12-03T10:00:00.000",
        enrollment: Some(("2015-08-01T00:00:00.000", "ACTIVE")),
        visit: ("2016-02-10T00:00:00.000", "ACTIVE"),
        weight: Some("3000"),
        apgar: Some("5"),
    },
];

/// Anna also has an older completed enrollment in Bombali, and an earlier
/// Birth event in Bombali within her current enrollment.
fn history() -> (Value, Value) {
    let enrollment = json!({
        "uid": "EnrollOld00",
        "trackedEntity": "ebp9zX3uy7m",
        "program": CHILD_PROGRAMME,
        "orgUnit": "fdc6uOvgoji",
        "status": "COMPLETED",
        "enrollmentDate": "2014-03-01T00:00:00.000",
        "created": "2014-03-01T00:00:00.000",
    });
    let event = json!({
        "uid": "EventUidOld",
        "enrollment": "Enrollmen00",
        "programStage": "A03MvHHogjR",
        "orgUnit": "fdc6uOvgoji",
        "status": "ACTIVE",
        "occurredDate": "2015-07-20T00:00:00.000",
        "created": "2015-07-20T00:00:00.000",
        "dataValues": {"UXz7xuGCEhU": "3900"},
    });
    (enrollment, event)
}

fn snapshot() -> Snapshot {
    let mut entities = Vec::new();
    let mut enrollments = Vec::new();
    let mut events = Vec::new();
    for (i, person) in PEOPLE.iter().enumerate() {
        entities.push(json!({
            "uid": person.uid,
            "trackedEntityType": PERSON,
            "orgUnit": person.org_unit,
            "created": person.created,
            "lastUpdated": person.last_updated,
            "attributes": {
                "w75KJ2mc4zz": person.first_name,
                "zDhUuAYrxNC": "Kamara",
                "cejWyOfXge6": if i % 2 == 0 { "Female" } else { "Male" },
            }
        }));
        let Some((enrollment_date, status)) = person.enrollment else {
            continue;
        };
        let enrollment = format!("Enrollmen{i:02}");
        enrollments.push(json!({
            "uid": enrollment,
            "trackedEntity": person.uid,
            "program": CHILD_PROGRAMME,
            "orgUnit": person.org_unit,
            "status": status,
            "enrollmentDate": enrollment_date,
            "created": person.created,
        }));
        if let Some(weight) = person.weight {
            let mut values = serde_json::Map::new();
            values.insert("UXz7xuGCEhU".into(), json!(weight));
            if let Some(apgar) = person.apgar {
                values.insert("a3kGcGDCuk6".into(), json!(apgar));
            }
            let (occurred, status) = person.visit;
            events.push(json!({
                "uid": format!("EventUid{i:03}"),
                "enrollment": enrollment,
                "programStage": "A03MvHHogjR",
                "orgUnit": person.org_unit,
                "status": status,
                "occurredDate": occurred,
                "created": occurred,
                "dataValues": values,
            }));
        }
    }
    let (old_enrollment, old_event) = history();
    enrollments.push(old_enrollment);
    events.push(old_event);

    serde_json::from_value(json!({
        "organisationUnits": [
            {"uid": "ImspTQPwCqd", "code": "OU_525", "name": "Sierra Leone", "path": "/ImspTQPwCqd", "level": 1},
            {"uid": "O6uvpzGd5pu", "code": "OU_264", "name": "Bo", "parent": "ImspTQPwCqd", "path": "/ImspTQPwCqd/O6uvpzGd5pu", "level": 2},
            {"uid": "fdc6uOvgoji", "code": "OU_193", "name": "Bombali", "parent": "ImspTQPwCqd", "path": "/ImspTQPwCqd/fdc6uOvgoji", "level": 2},
            {"uid": "DiszpKrYNg8", "code": "OU_559", "name": "Ngelehun CHC", "parent": "O6uvpzGd5pu", "path": "/ImspTQPwCqd/O6uvpzGd5pu/DiszpKrYNg8", "level": 3}
        ],
        "trackedEntityTypes": [
            {"uid": PERSON, "name": "Person", "attributes": ["w75KJ2mc4zz", "zDhUuAYrxNC", "cejWyOfXge6"]}
        ],
        "attributes": [
            {"uid": "w75KJ2mc4zz", "code": "MMD_PER_NAM", "name": "First name", "valueType": "TEXT"},
            {"uid": "zDhUuAYrxNC", "name": "Last name", "valueType": "TEXT"},
            {"uid": "cejWyOfXge6", "name": "Gender", "valueType": "TEXT", "optionSet": "pC3N9N77UmT"},
            {"uid": "lZGmxYbs97q", "name": "Unique ID", "valueType": "TEXT"}
        ],
        "optionSets": [
            {"uid": "pC3N9N77UmT", "name": "Gender", "options": [
                {"uid": "rBvjJYbMCVx", "code": "Female", "name": "Female"},
                {"uid": "Mnp3oXrpAbK", "code": "Male", "name": "Male"}
            ]}
        ],
        "programs": [
            {
                "uid": CHILD_PROGRAMME,
                "name": "Child Programme",
                "trackedEntityType": PERSON,
                "attributes": ["w75KJ2mc4zz", "zDhUuAYrxNC", "cejWyOfXge6", "lZGmxYbs97q"],
                "stages": ["A03MvHHogjR"],
                "indicators": ["tUdBD1JDxpn"],
                "enrollmentDateLabel": "Date of enrollment"
            }
        ],
        "programStages": [
            {
                "uid": "A03MvHHogjR",
                "name": "Birth",
                "program": CHILD_PROGRAMME,
                "repeatable": true,
                "dataElements": ["UXz7xuGCEhU", "a3kGcGDCuk6"],
                "executionDateLabel": "Report date"
            }
        ],
        "dataElements": [
            {"uid": "UXz7xuGCEhU", "name": "MCH Weight (g)", "valueType": "NUMBER"},
            {"uid": "a3kGcGDCuk6", "name": "MCH Apgar Score", "valueType": "NUMBER"}
        ],
        "programIndicators": [
            {
                "uid": "tUdBD1JDxpn",
                "name": "Average weight (g)",
                "program": CHILD_PROGRAMME,
                "programStage": "A03MvHHogjR",
                "dataElement": "UXz7xuGCEhU",
                "aggregation": "AVERAGE"
            }
        ],
        "users": [
            {"username": "admin", "orgUnits": ["O6uvpzGd5pu"]}
        ],
        "trackedEntities": entities,
        "enrollments": enrollments,
        "events": events,
    }))
    .expect("fixture snapshot is valid")
}

fn engine() -> AnalyticsEngine {
    let store = Arc::new(InMemoryStore::from_snapshot(snapshot()));
    AnalyticsEngine::from_store(store, AnalyticsConfig::default())
}

async fn run(query: &str) -> Result<Grid, QueryError> {
    engine().query_str(PERSON, query, None).await
}

fn first_column(grid: &Grid) -> Vec<&str> {
    grid.rows.iter().map(|row| row[0].as_str()).collect()
}

fn column(grid: &Grid, index: usize) -> Vec<&str> {
    grid.rows.iter().map(|row| row[index].as_str()).collect()
}

fn invalid_dimension_message(err: QueryError) -> String {
    match err {
        QueryError::InvalidDimension { message, .. } => message,
        other => panic!("expected an invalid dimension, got {other:?}"),
    }
}

fn pager_json(grid: &Grid) -> Value {
    serde_json::to_value(grid.pager().expect("pager present")).unwrap()
}

// =============================================================================
// Projection
// =============================================================================

#[tokio::test]
async fn test_default_headers_cover_static_block_attributes_and_dimensions() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&dimension={WEIGHT},{APGAR}&desc={WEIGHT},{APGAR}&pageSize=10"
    ))
    .await
    .unwrap();

    assert_eq!(grid.headers.len(), 18);
    assert_eq!(grid.rows.len(), 6);
    assert_eq!(grid.headers[0].name, "trackedentityinstanceuid");
    assert_eq!(grid.headers[12].name, "w75KJ2mc4zz");
    assert_eq!(grid.headers[16].name, WEIGHT);
    assert_eq!(grid.headers[17].name, APGAR);

    let row = &grid.rows[0];
    assert_eq!(row[0], "ebp9zX3uy7m");
    assert_eq!(row[1], "2015-08-06 21:20:41.753");
    assert_eq!(row[12], "Anna");
    assert_eq!(&row[16..], ["4000", "3"]);

    // not enrolled entities are dropped
    assert!(!first_column(&grid).contains(&"pybd813kIWx"));
}

#[tokio::test]
async fn test_single_header_marks_missing_values_as_no_data() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&dimension={WEIGHT},{APGAR}&desc={WEIGHT},{APGAR}\
         &headers={APGAR}&rowContext=true"
    ))
    .await
    .unwrap();

    assert_eq!(grid.headers.len(), 1);
    let values: Vec<&str> = first_column(&grid);
    assert_eq!(values, ["3", "", "10", "8", "5", ""]);

    assert!(!grid.row_context.contains_key(&0));
    assert_eq!(grid.row_context[&1][&0].value_status, "ND");
    assert_eq!(grid.row_context[&5][&0].value_status, "ND");

    let json = serde_json::to_value(&grid).unwrap();
    assert_eq!(json["rowContext"]["1"]["0"]["valueStatus"], "ND");
}

#[tokio::test]
async fn test_row_context_is_omitted_unless_requested() {
    let grid = run(&format!("program={CHILD_PROGRAMME}&headers={APGAR}"))
        .await
        .unwrap();
    assert!(grid.row_context.is_empty());
}

#[tokio::test]
async fn test_option_values_follow_data_id_scheme() {
    let grid = run("headers=trackedentityinstanceuid,cejWyOfXge6&asc=trackedentityinstanceuid&dataIdScheme=UID")
        .await
        .unwrap();
    let genders: Vec<&str> = grid.rows.iter().map(|r| r[1].as_str()).collect();
    assert!(genders.iter().all(|g| *g == "rBvjJYbMCVx" || *g == "Mnp3oXrpAbK"));
    assert_eq!(grid.headers[1].option_set.as_deref(), Some("pC3N9N77UmT"));
}

#[tokio::test]
async fn test_org_unit_name_hierarchy() {
    let grid = run("headers=trackedentityinstanceuid,ouname,ounamehierarchy&filter=trackedentityinstanceuid:EQ:kRy7mwt4TLP")
        .await
        .unwrap();
    assert_eq!(grid.rows.len(), 1);
    assert_eq!(grid.rows[0][1], "Bombali");
    assert_eq!(grid.rows[0][2], "Sierra Leone / Bombali");
}

#[tokio::test]
async fn test_enrollment_and_event_fields() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&headers=trackedentityinstanceuid,\
         IpHINAT79UW.enrollmentdate,IpHINAT79UW.programstatus,\
         IpHINAT79UW.A03MvHHogjR.eventdate,IpHINAT79UW.A03MvHHogjR.eventstatus,\
         IpHINAT79UW.ouname&asc=trackedentityinstanceuid"
    ))
    .await
    .unwrap();

    let labels: Vec<&str> = grid.headers.iter().map(|h| h.column.as_str()).collect();
    assert_eq!(
        labels,
        [
            "Tracked entity instance",
            "Date of enrollment, Child Programme",
            "Program Status, Child Programme",
            "Report date, Child Programme, Birth",
            "Event Status, Child Programme, Birth",
            "Organisation Unit Name, Child Programme",
        ]
    );
    assert_eq!(
        first_column(&grid),
        [
            "dNpxRu1mWG5",
            "ebp9zX3uy7m",
            "kRy7mwt4TLP",
            "tJhVXbD1cMp",
            "vOxUH373fy5",
            "xGhjGTE7qPY"
        ]
    );
    assert_eq!(
        grid.rows[1],
        [
            "ebp9zX3uy7m",
            "2015-07-01 00:00:00.000",
            "ACTIVE",
            "2015-08-02 00:00:00.000",
            "COMPLETED",
            "Ngelehun CHC"
        ]
    );
    assert_eq!(
        grid.rows[2],
        [
            "kRy7mwt4TLP",
            "2015-08-01 00:00:00.000",
            "ACTIVE",
            "2016-02-10 00:00:00.000",
            "ACTIVE",
            "Bombali"
        ]
    );
    assert_eq!(
        grid.rows[5],
        ["xGhjGTE7qPY", "2015-09-01 00:00:00.000", "CANCELLED", "", "", "Ngelehun CHC"]
    );
    assert_eq!(
        column(&grid, 2),
        ["COMPLETED", "ACTIVE", "ACTIVE", "ACTIVE", "ACTIVE", "CANCELLED"]
    );
}

#[tokio::test]
async fn test_program_indicator_aggregates_stage_values() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&dimension=IpHINAT79UW.tUdBD1JDxpn\
         &headers=trackedentityinstanceuid,IpHINAT79UW.tUdBD1JDxpn&asc=trackedentityinstanceuid"
    ))
    .await
    .unwrap();

    assert_eq!(grid.headers[1].name, "IpHINAT79UW.tUdBD1JDxpn");
    assert_eq!(grid.headers[1].column, "Average weight (g), Child Programme");
    // Anna's enrollment has two Birth events, 3900 and 4000
    assert_eq!(
        column(&grid, 1),
        ["3800", "3950", "3000", "3200", "3500", ""]
    );
}

#[tokio::test]
async fn test_repeatable_offsets_select_instances() {
    let grid = run(
        "headers=trackedentityinstanceuid,IpHINAT79UW[0].enrollmentdate,\
         IpHINAT79UW[0].programstatus,IpHINAT79UW[0].ouname,\
         IpHINAT79UW.A03MvHHogjR[0].UXz7xuGCEhU,IpHINAT79UW.A03MvHHogjR[-2].UXz7xuGCEhU,\
         IpHINAT79UW.A03MvHHogjR[1].UXz7xuGCEhU,IpHINAT79UW[0].A03MvHHogjR.UXz7xuGCEhU\
         &filter=trackedentityinstanceuid:EQ:ebp9zX3uy7m",
    )
    .await
    .unwrap();

    assert_eq!(grid.rows.len(), 1);
    assert_eq!(
        grid.rows[0],
        [
            "ebp9zX3uy7m",
            "2014-03-01 00:00:00.000",
            "COMPLETED",
            "Bombali",
            "3900",
            "3900",
            "4000",
            ""
        ]
    );
    assert_eq!(grid.headers[1].name, "IpHINAT79UW[0].enrollmentdate");
    assert_eq!(grid.headers[1].column, "Date of enrollment, Child Programme (0)");
    assert_eq!(
        grid.headers[4].column,
        "MCH Weight (g), Child Programme, Birth (0)"
    );
    assert_eq!(
        grid.headers[7].column,
        "MCH Weight (g), Child Programme (0), Birth"
    );
}

#[tokio::test]
async fn test_offset_labels_follow_their_segment() {
    let grid = run(
        "headers=IpHINAT79UW[-1].enrollmentdate,IpHINAT79UW[-1].A03MvHHogjR.eventdate,\
         IpHINAT79UW.A03MvHHogjR[-1].eventdate&filter=trackedentityinstanceuid:EQ:ebp9zX3uy7m",
    )
    .await
    .unwrap();

    let labels: Vec<&str> = grid.headers.iter().map(|h| h.column.as_str()).collect();
    assert_eq!(
        labels,
        [
            "Date of enrollment, Child Programme (-1)",
            "Report date, Child Programme (-1), Birth",
            "Report date, Child Programme, Birth (-1)",
        ]
    );
    assert_eq!(
        grid.rows[0],
        [
            "2015-07-01 00:00:00.000",
            "2015-08-02 00:00:00.000",
            "2015-08-02 00:00:00.000"
        ]
    );
}

#[tokio::test]
async fn test_stage_paths_resolve_through_their_program() {
    let grid = run(
        "headers=trackedentityinstanceuid,A03MvHHogjR.eventdate,A03MvHHogjR.UXz7xuGCEhU\
         &filter=trackedentityinstanceuid:EQ:kRy7mwt4TLP",
    )
    .await
    .unwrap();

    assert_eq!(grid.headers[1].name, "A03MvHHogjR.eventdate");
    assert_eq!(grid.headers[1].column, "Report date, Child Programme, Birth");
    assert_eq!(
        grid.rows[0],
        ["kRy7mwt4TLP", "2016-02-10 00:00:00.000", "3000"]
    );

    let err = run("dimension=A03MvHHogjR.ENROLLMENT_DATE:2021")
        .await
        .unwrap_err();
    let message = invalid_dimension_message(err);
    assert!(message.contains("not supported for program stage"), "{message}");
}

// =============================================================================
// Filters
// =============================================================================

#[tokio::test]
async fn test_date_items_filter_by_period() {
    let grid = run("dimension=IpHINAT79UW.ENROLLMENT_DATE:2016&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["tJhVXbD1cMp"]);
    let meta = grid.meta_data.as_ref().unwrap();
    assert!(meta.dimensions["pe"].is_empty());

    let grid = run(
        "dimension=IpHINAT79UW.A03MvHHogjR.EVENT_DATE:2016\
         &headers=trackedentityinstanceuid,IpHINAT79UW.A03MvHHogjR.EVENT_DATE",
    )
    .await
    .unwrap();
    assert_eq!(grid.rows, [["kRy7mwt4TLP", "2016-02-10 00:00:00.000"]]);

    let grid = run(
        "dimension=IpHINAT79UW.enrollmentdate:2015-07-01_2015-07-31;2016Q1\
         &headers=trackedentityinstanceuid&asc=trackedentityinstanceuid",
    )
    .await
    .unwrap();
    assert_eq!(first_column(&grid), ["ebp9zX3uy7m", "tJhVXbD1cMp"]);
}

#[tokio::test]
async fn test_relative_date_items_need_an_anchor() {
    let err = run("dimension=IpHINAT79UW.ENROLLMENT_DATE:LAST_YEAR")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::MissingAnchorDate(_)));

    let grid = run(
        "dimension=IpHINAT79UW.ENROLLMENT_DATE:LAST_YEAR&relativePeriodDate=2017-03-01\
         &headers=trackedentityinstanceuid",
    )
    .await
    .unwrap();
    assert_eq!(first_column(&grid), ["tJhVXbD1cMp"]);
}

#[tokio::test]
async fn test_unparsable_date_items_are_rejected() {
    let err = run("dimension=IpHINAT79UW.A03MvHHogjR.EVENT_DATE:ACTIVE;COMPLETED")
        .await
        .unwrap_err();
    let message = invalid_dimension_message(err);
    assert!(message.contains("date time is not parsable: `ACTIVE`"), "{message}");
}

#[tokio::test]
async fn test_status_items_match_the_status_enum() {
    let grid = run(
        "dimension=IpHINAT79UW.PROGRAM_STATUS:completed;CANCELLED\
         &headers=trackedentityinstanceuid&asc=trackedentityinstanceuid",
    )
    .await
    .unwrap();
    assert_eq!(first_column(&grid), ["dNpxRu1mWG5", "xGhjGTE7qPY"]);

    let grid = run(
        "dimension=IpHINAT79UW.A03MvHHogjR.EVENT_STATUS:active&headers=trackedentityinstanceuid",
    )
    .await
    .unwrap();
    assert_eq!(first_column(&grid), ["kRy7mwt4TLP"]);

    let err = run("dimension=IpHINAT79UW.PROGRAM_STATUS:DONE")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidDimension { .. }));
}

#[tokio::test]
async fn test_filter_values_may_contain_times() {
    let grid = run(
        "filter=lastupdated:GT:2015-11-01%2009:00:00\
         &headers=trackedentityinstanceuid&asc=trackedentityinstanceuid",
    )
    .await
    .unwrap();
    assert_eq!(
        first_column(&grid),
        ["kRy7mwt4TLP", "pybd813kIWx", "tJhVXbD1cMp", "xGhjGTE7qPY"]
    );
}


#[tokio::test]
async fn test_in_no_value_matches_only_missing_values() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&filter={APGAR}:IN:NV\
         &headers=trackedentityinstanceuid&asc=trackedentityinstanceuid"
    ))
    .await
    .unwrap();
    assert_eq!(first_column(&grid), ["dNpxRu1mWG5", "xGhjGTE7qPY"]);
}

#[tokio::test]
async fn test_numeric_range_filter() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&filter={WEIGHT}:GE:3500\
         &headers=trackedentityinstanceuid&desc={WEIGHT}"
    ))
    .await
    .unwrap();
    assert_eq!(
        first_column(&grid),
        ["ebp9zX3uy7m", "dNpxRu1mWG5", "vOxUH373fy5"]
    );
}

// =============================================================================
// Sorting and paging
// =============================================================================

#[tokio::test]
async fn test_desc_is_the_reverse_of_asc_for_distinct_values() {
    let asc = run("headers=w75KJ2mc4zz&asc=w75KJ2mc4zz").await.unwrap();
    let desc = run("headers=w75KJ2mc4zz&desc=w75KJ2mc4zz").await.unwrap();

    let forward = first_column(&asc);
    let mut backward = first_column(&desc);
    backward.reverse();
    assert_eq!(forward, ["Anna", "Bea", "Cleo", "Dina", "Esi", "Fatu", "Gina"]);
    assert_eq!(forward, backward);
}

#[tokio::test]
async fn test_default_order_is_last_updated_descending() {
    let grid = run("headers=trackedentityinstanceuid").await.unwrap();
    assert_eq!(grid.rows[0][0], "kRy7mwt4TLP");
    assert_eq!(grid.rows[6][0], "ebp9zX3uy7m");
}

#[tokio::test]
async fn test_estimated_pager() {
    let grid = run("headers=trackedentityinstanceuid&pageSize=2").await.unwrap();
    assert_eq!(grid.rows.len(), 2);
    assert_eq!(
        pager_json(&grid),
        json!({"page": 1, "pageSize": 2, "isLastPage": false})
    );

    let last = run("headers=trackedentityinstanceuid&pageSize=2&page=4")
        .await
        .unwrap();
    assert_eq!(last.rows.len(), 1);
    assert_eq!(
        pager_json(&last),
        json!({"page": 4, "pageSize": 2, "isLastPage": true})
    );
}

#[tokio::test]
async fn test_exact_pager_with_total_pages() {
    let grid = run("headers=trackedentityinstanceuid&pageSize=3&totalPages=true")
        .await
        .unwrap();
    assert_eq!(grid.rows.len(), 3);
    assert_eq!(
        pager_json(&grid),
        json!({"page": 1, "pageSize": 3, "total": 7, "pageCount": 3})
    );
}

#[tokio::test]
async fn test_paging_disabled_returns_everything_without_pager() {
    let grid = run("headers=trackedentityinstanceuid&pageSize=2&paging=false")
        .await
        .unwrap();
    assert_eq!(grid.rows.len(), 7);
    assert!(grid.pager().is_none());
}

// =============================================================================
// Scope
// =============================================================================

#[tokio::test]
async fn test_user_org_unit_scopes_rows_and_metadata() {
    let grid = engine()
        .query_str(
            PERSON,
            "dimension=ou:USER_ORGUNIT&headers=trackedentityinstanceuid",
            Some("admin"),
        )
        .await
        .unwrap();
    assert_eq!(grid.rows.len(), 6);
    assert!(!first_column(&grid).contains(&"kRy7mwt4TLP"));

    let meta = grid.meta_data.as_ref().unwrap();
    assert_eq!(meta.dimensions["ou"], ["O6uvpzGd5pu"]);
}

#[tokio::test]
async fn test_ou_mode_children_and_selected() {
    let grid = run("dimension=ou:ImspTQPwCqd&ouMode=CHILDREN&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["kRy7mwt4TLP"]);

    let grid = run("dimension=ou:O6uvpzGd5pu&ouMode=CHILDREN&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(grid.rows.len(), 6);
    assert!(!first_column(&grid).contains(&"kRy7mwt4TLP"));

    let grid = run("dimension=ou:fdc6uOvgoji&ouMode=SELECTED&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["kRy7mwt4TLP"]);

    let grid = run("dimension=ou:ImspTQPwCqd&ouMode=SELECTED&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert!(grid.rows.is_empty());
}

#[tokio::test]
async fn test_level_items_select_units_at_that_level() {
    let grid = run("dimension=ou:ImspTQPwCqd;LEVEL-2&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["kRy7mwt4TLP"]);
    let meta = grid.meta_data.as_ref().unwrap();
    assert_eq!(meta.dimensions["ou"], ["O6uvpzGd5pu", "fdc6uOvgoji"]);

    let grid = run("dimension=ou:ImspTQPwCqd;LEVEL-3&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(grid.rows.len(), 6);
    assert!(!first_column(&grid).contains(&"kRy7mwt4TLP"));
}

#[tokio::test]
async fn test_program_org_unit_restricts_the_enrollment() {
    // Anna's older enrollment is in Bombali, her current one is not
    let grid = run("dimension=IpHINAT79UW.ou:fdc6uOvgoji&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["kRy7mwt4TLP"]);
    let meta = grid.meta_data.as_ref().unwrap();
    assert_eq!(meta.dimensions["IpHINAT79UW.ou"], ["fdc6uOvgoji"]);
}

#[tokio::test]
async fn test_stage_org_unit_matches_any_event_of_the_stage() {
    let grid = run(
        "dimension=A03MvHHogjR.ou:fdc6uOvgoji\
         &headers=trackedentityinstanceuid&asc=trackedentityinstanceuid",
    )
    .await
    .unwrap();
    assert_eq!(first_column(&grid), ["ebp9zX3uy7m", "kRy7mwt4TLP"]);
}

#[tokio::test]
async fn test_output_id_scheme_renders_org_unit_cells() {
    let query = format!(
        "program={CHILD_PROGRAMME}&headers=trackedentityinstanceuid,IpHINAT79UW.ou,\
         IpHINAT79UW.A03MvHHogjR.ou&asc=trackedentityinstanceuid"
    );
    let grid = run(&query).await.unwrap();
    assert_eq!(grid.rows[2], ["kRy7mwt4TLP", "fdc6uOvgoji", "fdc6uOvgoji"]);

    let grid = run(&format!("{query}&outputIdScheme=CODE")).await.unwrap();
    assert_eq!(
        column(&grid, 1),
        ["OU_559", "OU_559", "OU_193", "OU_559", "OU_559", "OU_559"]
    );
    assert_eq!(
        column(&grid, 2),
        ["OU_559", "OU_559", "OU_193", "OU_559", "OU_559", ""]
    );

    let grid = run(&format!("{query}&outputIdScheme=NAME")).await.unwrap();
    assert_eq!(grid.rows[2], ["kRy7mwt4TLP", "Bombali", "Bombali"]);
}

#[tokio::test]
async fn test_user_org_unit_without_user_is_rejected() {
    let err = run("dimension=ou:USER_ORGUNIT").await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidDimension { .. }));
}

#[tokio::test]
async fn test_status_and_date_parameters() {
    let query = |extra: &str| {
        format!(
            "program={CHILD_PROGRAMME}&headers=trackedentityinstanceuid\
             &asc=trackedentityinstanceuid&{extra}"
        )
    };

    let grid = run(&query("programStatus=COMPLETED")).await.unwrap();
    assert_eq!(first_column(&grid), ["dNpxRu1mWG5"]);

    let grid = run("programStatus=IpHINAT79UW.CANCELLED&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["xGhjGTE7qPY"]);

    let grid = run(&query("enrollmentDate=2015-07-01_2015-07-31"))
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["ebp9zX3uy7m"]);

    let grid = run("enrollmentDate=IpHINAT79UW.2016-01-15&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(first_column(&grid), ["tJhVXbD1cMp"]);
}

#[tokio::test]
async fn test_event_parameters_narrow_the_selected_event() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&eventStatus=ACTIVE\
         &headers=trackedentityinstanceuid,{WEIGHT}&asc=trackedentityinstanceuid"
    ))
    .await
    .unwrap();
    assert_eq!(column(&grid, 1), ["", "3900", "3000", "", "", ""]);

    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&eventDate=IpHINAT79UW.A03MvHHogjR.2016\
         &headers=trackedentityinstanceuid,IpHINAT79UW.A03MvHHogjR.eventdate\
         &asc=trackedentityinstanceuid"
    ))
    .await
    .unwrap();
    assert_eq!(
        column(&grid, 1),
        ["", "", "2016-02-10 00:00:00.000", "", "", ""]
    );
}

#[tokio::test]
async fn test_bare_program_status_requests_the_column() {
    let grid = run("programStatus=IpHINAT79UW&asc=trackedentityinstanceuid")
        .await
        .unwrap();
    let last = grid.headers.len() - 1;
    assert_eq!(grid.headers[last].name, "IpHINAT79UW.programstatus");
    assert_eq!(grid.rows.len(), 7);
    assert_eq!(
        column(&grid, last),
        ["COMPLETED", "ACTIVE", "ACTIVE", "", "ACTIVE", "ACTIVE", "CANCELLED"]
    );
}

#[tokio::test]
async fn test_relative_period_requires_anchor_date() {
    let err = run("dimension=pe:LAST_12_MONTHS").await.unwrap_err();
    assert!(matches!(err, QueryError::MissingAnchorDate(_)));

    let grid = run("dimension=pe:LAST_12_MONTHS&relativePeriodDate=2016-01-01&headers=trackedentityinstanceuid")
        .await
        .unwrap();
    assert_eq!(grid.rows.len(), 6);
    assert!(!first_column(&grid).contains(&"pybd813kIWx"));
    let meta = grid.meta_data.as_ref().unwrap();
    assert!(meta.dimensions.contains_key("pe"));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_unknown_header_and_sort_keys() {
    let err = run("headers=notAColumn").await.unwrap_err();
    assert!(matches!(err, QueryError::UnknownDimension(_)));

    let err = run("asc=notAColumn").await.unwrap_err();
    assert!(matches!(err, QueryError::UnknownDimension(_)));
}

#[tokio::test]
async fn test_unknown_tracked_entity_type() {
    let err = engine()
        .query_str("notAnEntity", "", None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::NotFound { .. }));
}

#[tokio::test]
async fn test_malformed_program_uid_is_a_client_error() {
    let err = run("program=not-a-uid").await.unwrap_err();
    assert!(matches!(err, QueryError::Core(_)));
    assert!(err.is_client_error());
}

// =============================================================================
// Output
// =============================================================================

#[tokio::test]
async fn test_zero_page_size_returns_an_empty_page() {
    let grid = run("headers=trackedentityinstanceuid,w75KJ2mc4zz&pageSize=0&totalPages=true")
        .await
        .unwrap();
    assert!(grid.rows.is_empty());
    assert_eq!(grid.headers.len(), 2);
    assert_eq!(
        pager_json(&grid),
        json!({"page": 1, "pageSize": 0, "total": 7, "pageCount": 0})
    );
    assert!(grid.meta_data.as_ref().unwrap().items.contains_key("w75KJ2mc4zz"));
}

#[tokio::test]
async fn test_metadata_details_describe_dimensions_and_fields() {
    let grid = run(&format!(
        "program={CHILD_PROGRAMME}&dimension=ou:ImspTQPwCqd,IpHINAT79UW.enrollmentdate,\
         IpHINAT79UW.ouname&headers=trackedentityinstanceuid,IpHINAT79UW.ouname\
         &asc=trackedentityinstanceuid&includeMetadataDetails=true"
    ))
    .await
    .unwrap();
    assert_eq!(grid.rows.len(), 6);
    assert_eq!(grid.rows[2], ["kRy7mwt4TLP", "Bombali"]);

    let json = serde_json::to_value(&grid).unwrap();
    let items = &json["metaData"]["items"];
    assert_eq!(
        items["IpHINAT79UW.enrollmentdate"],
        json!({"name": "Date of enrollment", "dimensionType": "PERIOD"})
    );
    assert_eq!(
        items["IpHINAT79UW.ouname"],
        json!({"name": "Organisation Unit Name", "dimensionType": "ORGANISATION_UNIT"})
    );
    assert_eq!(items["ImspTQPwCqd"]["name"], "Sierra Leone");
    assert_eq!(items["ImspTQPwCqd"]["code"], "OU_525");
    assert_eq!(items["ou"]["name"], "Organisation unit");
    assert_eq!(items["pe"]["dimensionType"], "PERIOD");
    assert_eq!(items[CHILD_PROGRAMME]["name"], "Child Programme");
    assert_eq!(json["metaData"]["dimensions"]["ou"], json!(["ImspTQPwCqd"]));

    let plain = run(&format!(
        "program={CHILD_PROGRAMME}&dimension=ou:ImspTQPwCqd&headers=trackedentityinstanceuid"
    ))
    .await
    .unwrap();
    let items = &plain.meta_data.as_ref().unwrap().items;
    assert!(!items.contains_key("ou"));
    assert!(!items.contains_key("ImspTQPwCqd"));
    assert!(items.contains_key(CHILD_PROGRAMME));
}

#[tokio::test]
async fn test_skip_data_omits_rows() {
    let grid = run("skipData=true").await.unwrap();
    assert_eq!(grid.height(), 0);
    let json = serde_json::to_value(&grid).unwrap();
    assert!(json.get("rows").is_none());
    assert_eq!(json["height"], 0);
    assert!(json.get("metaData").is_some());
}

#[tokio::test]
async fn test_skip_meta_omits_metadata() {
    let grid = run("skipMeta=true").await.unwrap();
    assert!(grid.meta_data.is_none());
}

#[tokio::test]
async fn test_csv_round_trip() {
    let grid = run("headers=trackedentityinstanceuid,w75KJ2mc4zz,lastupdated&asc=w75KJ2mc4zz")
        .await
        .unwrap();
    let text = CsvWriter::new().to_string(&grid).unwrap();
    let table = read_csv(text.as_bytes(), b',').unwrap();

    assert_eq!(
        table.headers,
        ["Tracked entity instance", "First name", "Last updated"]
    );
    assert_eq!(table.rows, grid.rows);
}

#[tokio::test]
async fn test_metadata_cache_is_reused_across_queries() {
    let engine = engine();
    let query = format!("program={CHILD_PROGRAMME}&dimension={WEIGHT}");
    engine.query_str(PERSON, &query, None).await.unwrap();
    let first = engine.cache_stats();
    engine.query_str(PERSON, &query, None).await.unwrap();
    let second = engine.cache_stats();

    assert!(first.misses > 0);
    assert!(second.hits > first.hits);
    assert!(second.size >= first.size);

    engine.clear_cache();
    assert_eq!(engine.cache_stats().size, 0);
}
