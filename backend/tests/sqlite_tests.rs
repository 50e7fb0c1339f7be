//! Mediator tests against an in-memory SQLite database
//!
//! Same request shapes as the memory backend tests; these check that the
//! generated SQL agrees with the in-process evaluation.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::{Value as JsonValue, json};

use zmdata::aggregate::Selector;
use zmdata::backend::SqliteBackend;
use zmdata::filters::validate_filter;
use zmdata::schema::zoneminder;
use zmdata::{BackendError, Mediator, MediatorError, Outcome, Record, Request, Value};

async fn setup() -> Mediator {
    let registry = Arc::new(zoneminder::registry().expect("registry"));
    let backend = SqliteBackend::connect("sqlite::memory:", 1)
        .await
        .expect("connect");
    backend.ensure_schema(&registry).await.expect("schema");
    Mediator::new(registry, Arc::new(backend))
}

async fn run(
    mediator: &Mediator,
    entity: &str,
    operation: &str,
    args: JsonValue,
) -> Result<Outcome, MediatorError> {
    mediator.execute(Request::new(entity, operation, args)).await
}

async fn records(mediator: &Mediator, entity: &str, args: JsonValue) -> Vec<Record> {
    run(mediator, entity, "findMany", args)
        .await
        .expect("findMany")
        .into_records()
        .expect("records")
}

fn names(rows: &[Record]) -> Vec<Value> {
    rows.iter().map(|r| r.value("Name").clone()).collect()
}

async fn seed_events(mediator: &Mediator) {
    let rows = json!([
        {"MonitorId": 1, "StateId": 1, "Name": "Motion", "Length": "12.50", "DiskSpace": 100,
         "StartDateTime": "2024-03-01 08:00:00"},
        {"MonitorId": 1, "StateId": 1, "Name": "motion-night", "Length": "3.25",
         "StartDateTime": "2024-03-01 23:15:00"},
        {"MonitorId": 2, "StateId": 1, "Name": "Forced", "Length": "60", "DiskSpace": 5},
        {"MonitorId": 2, "StateId": 1, "Name": "Signal", "Length": "9.75", "DiskSpace": 900, "Locked": true}
    ]);
    let outcome = run(mediator, "Events", "createMany", json!({"data": rows}))
        .await
        .expect("seed events");
    assert_eq!(outcome.count(), Some(4));
}

// ============================================================================
// Create / read
// ============================================================================

#[tokio::test]
async fn test_create_then_find_one() {
    let mediator = setup().await;
    let created = run(
        &mediator,
        "Config",
        "create",
        json!({"data": {"Name": "ZM_LANG_DEFAULT", "Value": "en_gb", "Type": "string", "Category": "system"}}),
    )
    .await
    .unwrap()
    .into_record()
    .expect("created row");
    assert_eq!(created.get("Id"), Some(&Value::Int(1)));
    assert_eq!(created.get("Hint"), Some(&Value::Null));

    let found = run(&mediator, "Config", "findOne", json!({"where": {"Name": "ZM_LANG_DEFAULT"}}))
        .await
        .unwrap()
        .into_record()
        .expect("row");
    assert_eq!(found, created);
    assert_eq!(found.get("Readonly"), Some(&Value::Int(0)));
}

#[tokio::test]
async fn test_typed_columns_round_trip() {
    let mediator = setup().await;
    seed_events(&mediator).await;

    let rows = records(&mediator, "Events", json!({"orderBy": {"Id": "asc"}})).await;
    assert_eq!(rows[0].get("Id"), Some(&Value::BigInt(1)));
    assert_eq!(rows[0].get("Length"), Some(&Value::Decimal(Decimal::new(1250, 2))));
    assert_eq!(rows[0].get("Scheme"), Some(&Value::Enum("Medium".to_string())));
    assert_eq!(rows[1].get("DiskSpace"), Some(&Value::Null));
    assert_eq!(rows[3].get("Locked"), Some(&Value::Bool(true)));
    assert_eq!(rows[0].get("Locked"), Some(&Value::Bool(false)));
    assert_eq!(
        rows[0].value("StartDateTime").to_string(),
        "2024-03-01T08:00:00.000000Z"
    );
}

#[tokio::test]
async fn test_compound_identity() {
    let mediator = setup().await;
    for (preset, label) in [(1, "Door"), (2, "Yard")] {
        run(
            &mediator,
            "ControlPresets",
            "create",
            json!({"data": {"MonitorId": 4, "Preset": preset, "Label": label}}),
        )
        .await
        .unwrap();
    }

    let updated = run(
        &mediator,
        "ControlPresets",
        "update",
        json!({"where": {"MonitorId_Preset": {"MonitorId": 4, "Preset": 2}}, "data": {"Label": "Gate"}}),
    )
    .await
    .unwrap()
    .into_record()
    .expect("row");
    assert_eq!(updated.get("Label"), Some(&Value::from("Gate")));
    assert_eq!(updated.get("Preset"), Some(&Value::Int(2)));
}

// ============================================================================
// Filters and windows
// ============================================================================

#[tokio::test]
async fn test_filters_match_in_process_evaluation() {
    let mediator = setup().await;
    seed_events(&mediator).await;

    let insensitive = records(
        &mediator,
        "Events",
        json!({"where": {"Name": {"startsWith": "MOTION", "mode": "insensitive"}}}),
    )
    .await;
    assert_eq!(insensitive.len(), 2);

    let decimal = records(&mediator, "Events", json!({"where": {"Length": {"gt": "9.5"}}})).await;
    assert_eq!(
        names(&decimal),
        vec![Value::from("Motion"), Value::from("Forced"), Value::from("Signal")]
    );

    let not_in = records(&mediator, "Events", json!({"where": {"DiskSpace": {"notIn": [5]}}})).await;
    assert_eq!(names(&not_in), vec![Value::from("Motion"), Value::from("Signal")]);

    let none = records(
        &mediator,
        "Events",
        json!({"where": {"NOT": [], "OR": [], "MonitorId": 1}}),
    )
    .await;
    assert!(none.is_empty());

    let dated = records(
        &mediator,
        "Events",
        json!({"where": {"StartDateTime": {"gte": "2024-03-01T12:00:00Z"}}}),
    )
    .await;
    assert_eq!(names(&dated), vec![Value::from("motion-night")]);
}

#[tokio::test]
async fn test_decimal_filters_are_exact() {
    let mediator = setup().await;
    let rows = json!([
        {"MonitorId": 1, "StateId": 1, "Name": "a", "Length": "0.1"},
        {"MonitorId": 1, "StateId": 1, "Name": "b", "Length": "0.10000000000000001"},
        {"MonitorId": 1, "StateId": 1, "Name": "c", "Length": "0.10000000000000002"},
        {"MonitorId": 2, "StateId": 1, "Name": "d", "Length": "0.1"}
    ]);
    run(&mediator, "Events", "createMany", json!({"data": rows}))
        .await
        .expect("seed events");

    let registry = mediator.registry();
    let events = registry.describe("Events").unwrap();
    let all = records(&mediator, "Events", json!({})).await;

    let exact = records(
        &mediator,
        "Events",
        json!({"where": {"Length": {"equals": "0.10000000000000001"}}}),
    )
    .await;
    assert_eq!(names(&exact), vec![Value::from("b")]);

    let filters = [
        json!({"Length": {"gt": "0.1"}}),
        json!({"Length": {"lte": "0.10000000000000001"}, "MonitorId": 1}),
        json!({"NOT": {"Length": "0.1"}}),
        json!({"OR": [{"Length": {"in": ["0.10000000000000002"]}}, {"Name": "a"}]}),
    ];
    for filter in filters {
        let node = validate_filter(events, &filter, 8).unwrap();
        let expected = all.iter().filter(|r| node.matches(r)).count();
        let found = records(&mediator, "Events", json!({"where": filter.clone()})).await;
        assert!(found.iter().all(|r| node.matches(r)), "{}", filter);
        assert_eq!(found.len(), expected, "{}", filter);

        let count = run(&mediator, "Events", "count", json!({"where": filter.clone()}))
            .await
            .unwrap();
        assert_eq!(count.count(), Some(expected as u64), "{}", filter);
    }

    let ordered = records(
        &mediator,
        "Events",
        json!({"orderBy": [{"Length": "desc"}, {"Name": "asc"}]}),
    )
    .await;
    assert_eq!(
        names(&ordered),
        vec![Value::from("c"), Value::from("b"), Value::from("a"), Value::from("d")]
    );

    let page = records(
        &mediator,
        "Events",
        json!({"orderBy": {"Length": "desc"}, "cursor": {"Id": 2}, "take": 2}),
    )
    .await;
    assert_eq!(names(&page), vec![Value::from("b"), Value::from("a")]);

    let deleted = run(&mediator, "Events", "deleteMany", json!({"where": {"Length": {"gt": "0.1"}}}))
        .await
        .unwrap();
    assert_eq!(deleted.count(), Some(2));
    let left = records(&mediator, "Events", json!({})).await;
    assert_eq!(names(&left), vec![Value::from("a"), Value::from("d")]);
}

#[tokio::test]
async fn test_cursor_pagination_both_directions() {
    let mediator = setup().await;
    seed_events(&mediator).await;

    let order = json!([{"MonitorId": "desc"}, {"Name": "asc"}]);
    let all = records(&mediator, "Events", json!({"orderBy": order.clone()})).await;
    assert_eq!(
        names(&all),
        vec![
            Value::from("Forced"),
            Value::from("Signal"),
            Value::from("Motion"),
            Value::from("motion-night")
        ]
    );

    let forward = records(
        &mediator,
        "Events",
        json!({"orderBy": order.clone(), "cursor": {"Id": 4}, "skip": 1, "take": 2}),
    )
    .await;
    assert_eq!(names(&forward), vec![Value::from("Motion"), Value::from("motion-night")]);

    let backward = records(
        &mediator,
        "Events",
        json!({"orderBy": order, "cursor": {"Id": 1}, "take": -2}),
    )
    .await;
    assert_eq!(names(&backward), vec![Value::from("Signal"), Value::from("Motion")]);

    let missing = records(&mediator, "Events", json!({"cursor": {"Id": 99}, "take": 2})).await;
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_distinct_and_count() {
    let mediator = setup().await;
    seed_events(&mediator).await;

    let distinct = records(
        &mediator,
        "Events",
        json!({"distinct": ["MonitorId"], "orderBy": {"Id": "asc"}}),
    )
    .await;
    assert_eq!(names(&distinct), vec![Value::from("Motion"), Value::from("Forced")]);

    let count = run(&mediator, "Events", "count", json!({"where": {"Locked": false}}))
        .await
        .unwrap();
    assert_eq!(count.count(), Some(3));
}

// ============================================================================
// Mutations
// ============================================================================

#[tokio::test]
async fn test_unique_violation_names_field() {
    let mediator = setup().await;
    let user = json!({"data": {"Username": "admin", "Password": "x"}});
    run(&mediator, "Users", "create", user.clone()).await.unwrap();

    let err = run(&mediator, "Users", "create", user).await.unwrap_err();
    assert_eq!(
        err,
        MediatorError::Backend(BackendError::UniqueConstraintViolation {
            field: "Username".to_string()
        })
    );
}

#[tokio::test]
async fn test_create_many_is_all_or_nothing() {
    let mediator = setup().await;
    let users = json!([
        {"Username": "a", "Password": "x"},
        {"Username": "a", "Password": "y"}
    ]);

    let err = run(&mediator, "Users", "createMany", json!({"data": users.clone()}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "UniqueConstraintViolation");
    let count = run(&mediator, "Users", "count", json!({})).await.unwrap();
    assert_eq!(count.count(), Some(0));

    let outcome = run(
        &mediator,
        "Users",
        "createMany",
        json!({"data": users, "skipDuplicates": true}),
    )
    .await
    .unwrap();
    assert_eq!(outcome.count(), Some(1));
}

#[tokio::test]
async fn test_update_many_relative_and_delete() {
    let mediator = setup().await;
    seed_events(&mediator).await;

    let outcome = run(
        &mediator,
        "Events",
        "updateMany",
        json!({"where": {"MonitorId": 2}, "data": {"DiskSpace": {"multiply": 2}, "Length": {"increment": "0.25"}}}),
    )
    .await
    .unwrap();
    assert_eq!(outcome.count(), Some(2));

    let signal = run(&mediator, "Events", "findFirst", json!({"where": {"Name": "Signal"}}))
        .await
        .unwrap()
        .into_record()
        .expect("row");
    assert_eq!(signal.get("DiskSpace"), Some(&Value::BigInt(1800)));
    assert_eq!(signal.get("Length"), Some(&Value::Decimal(Decimal::new(10, 0))));

    let deleted = run(&mediator, "Events", "deleteMany", json!({"where": {"MonitorId": 2}}))
        .await
        .unwrap();
    assert_eq!(deleted.count(), Some(2));

    let err = run(&mediator, "Events", "delete", json!({"where": {"Id": 3}}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "RecordNotFound");
}

#[tokio::test]
async fn test_upsert() {
    let mediator = setup().await;
    let args = json!({
        "where": {"Name": "ZM_OPT_X10"},
        "create": {"Name": "ZM_OPT_X10", "Value": "0", "Type": "boolean", "Category": "x10"},
        "update": {"Value": "1"}
    });

    run(&mediator, "Config", "upsert", args.clone()).await.unwrap();
    let updated = run(&mediator, "Config", "upsert", args)
        .await
        .unwrap()
        .into_record()
        .expect("row");
    assert_eq!(updated.get("Value"), Some(&Value::from("1")));
    assert_eq!(updated.get("Id"), Some(&Value::Int(1)));
}

// ============================================================================
// Aggregates
// ============================================================================

#[tokio::test]
async fn test_aggregate_and_group_by() {
    let mediator = setup().await;
    seed_events(&mediator).await;

    let values = run(
        &mediator,
        "Events",
        "aggregate",
        json!({"where": {"MonitorId": 1}, "_count": true, "_sum": {"Length": true}, "_min": {"Name": true}}),
    )
    .await
    .unwrap()
    .into_aggregate()
    .unwrap();
    assert_eq!(values.value(Selector::Count, "_all"), &Value::Int(2));
    assert_eq!(values.value(Selector::Sum, "Length"), &Value::Decimal(Decimal::new(1575, 2)));
    assert_eq!(values.value(Selector::Min, "Name"), &Value::from("Motion"));

    let groups = run(
        &mediator,
        "Events",
        "groupBy",
        json!({"by": ["MonitorId"], "_count": {"DiskSpace": true}, "_avg": {"DiskSpace": true}}),
    )
    .await
    .unwrap()
    .into_groups()
    .unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key.value("MonitorId"), &Value::Int(1));
    assert_eq!(groups[0].aggregates.value(Selector::Count, "DiskSpace"), &Value::Int(1));
    assert_eq!(groups[1].aggregates.value(Selector::Avg, "DiskSpace"), &Value::Float(452.5));
}

// ============================================================================
// On-disk database
// ============================================================================

#[tokio::test]
async fn test_schema_is_idempotent_and_data_persists() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("zm.db").display());
    let registry = Arc::new(zoneminder::registry().unwrap());

    {
        let backend = SqliteBackend::connect(&url, 2).await.unwrap();
        backend.ensure_schema(&registry).await.unwrap();
        let mediator = Mediator::new(registry.clone(), Arc::new(backend));
        run(&mediator, "Servers", "create", json!({"data": {"Name": "primary"}}))
            .await
            .unwrap();
    }

    let backend = SqliteBackend::connect(&url, 2).await.unwrap();
    backend.ensure_schema(&registry).await.unwrap();
    backend.pool().close().await;
    let backend = SqliteBackend::connect(&url, 2).await.unwrap();
    let mediator = Mediator::new(registry, Arc::new(backend));
    let servers = records(&mediator, "Servers", json!({})).await;
    assert_eq!(names(&servers), vec![Value::from("primary")]);
}
