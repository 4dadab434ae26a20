// Tests for the merged GraphQL schema
use std::sync::Arc;

use async_graphql::{PathSegment, Request, Response, Value, Variables};
use serde_json::json;

use super::{create_schema, SchemaOptions, TerritorySchema};
use crate::engine::storage::testing::CountingStorage;
use crate::engine::InMemoryStorage;
use crate::models::change_log::parse_min_date;

fn schema() -> TerritorySchema {
    create_schema(Arc::new(InMemoryStorage::new()), SchemaOptions::default())
}

async fn run(schema: &TerritorySchema, query: &str, variables: serde_json::Value) -> Response {
    schema
        .execute(Request::new(query).variables(Variables::from_json(variables)))
        .await
}

fn error_code(response: &Response) -> Option<Value> {
    response
        .errors
        .first()
        .and_then(|e| e.extensions.as_ref())
        .and_then(|ext| ext.get("code").cloned())
}

const CREATE_LOG: &str = r#"
    mutation Create($log: ActivityLogInput!) {
        createActivityLog(activityLog: $log) {
            id checkout_id address_id value publisher_id notes timestamp
        }
    }
"#;

#[tokio::test]
async fn test_create_and_read_activity_log() {
    let schema = schema();
    let created = run(
        &schema,
        CREATE_LOG,
        json!({ "log": { "checkout_id": 5, "address_id": 50, "value": "NH", "publisher_id": 2 } }),
    )
    .await;
    assert!(created.errors.is_empty(), "{:?}", created.errors);

    let data = created.data.into_json().unwrap();
    let log = &data["createActivityLog"];
    assert_eq!(log["notes"], json!(""));
    assert_eq!(log["value"], json!("NH"));
    assert!(log["timestamp"].is_i64());

    let id = log["id"].as_i64().unwrap();
    let read = run(
        &schema,
        "query($id: Int!) { activityLog(id: $id) { id checkout_id address_id } }",
        json!({ "id": id }),
    )
    .await;
    let data = read.data.into_json().unwrap();
    assert_eq!(data["activityLog"]["checkout_id"], json!(5));
    assert_eq!(data["activityLog"]["address_id"], json!(50));
}

#[tokio::test]
async fn test_activity_log_missing_is_null() {
    let response = run(&schema(), "{ activityLog(id: 999) { id } }", json!({})).await;
    assert!(response.errors.is_empty());
    assert_eq!(response.data.into_json().unwrap(), json!({ "activityLog": null }));
}

#[tokio::test]
async fn test_activity_logs_filter_by_address() {
    let schema = schema();
    for address_id in [50, 50, 51] {
        let response = run(
            &schema,
            CREATE_LOG,
            json!({ "log": { "checkout_id": 5, "address_id": address_id, "value": "CA" } }),
        )
        .await;
        assert!(response.errors.is_empty());
    }

    let narrowed = run(&schema, "{ activityLogs(checkoutId: 5, addressId: 50) { id } }", json!({})).await;
    let all = run(&schema, "{ activityLogs(checkoutId: 5) { id } }", json!({})).await;

    let narrowed = narrowed.data.into_json().unwrap();
    let all = all.data.into_json().unwrap();
    assert_eq!(narrowed["activityLogs"].as_array().unwrap().len(), 2);
    assert_eq!(all["activityLogs"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_validation_error_is_typed_and_issues_no_query() {
    let storage = Arc::new(CountingStorage::new());
    let schema = create_schema(storage.clone(), SchemaOptions::default());

    let response = run(
        &schema,
        r#"mutation { createGroup(group: { description: "no code" }) { id } }"#,
        json!({}),
    )
    .await;

    assert_eq!(error_code(&response), Some(Value::from("VALIDATION")));
    assert!(response.errors[0].message.contains("group code is required"));
    // A failed mutation field nulls the whole data object
    assert_eq!(response.data, Value::Null);
    assert_eq!(
        response.errors[0].path,
        vec![PathSegment::Field("createGroup".to_string())]
    );
    assert_eq!(storage.calls(), 0);
}

#[tokio::test]
async fn test_limit_reached_error_code() {
    let schema = schema();
    let variables = json!({ "log": { "checkout_id": 1, "address_id": 2, "value": "NH" } });
    for _ in 0..3 {
        assert!(run(&schema, CREATE_LOG, variables.clone()).await.errors.is_empty());
    }

    let fourth = run(&schema, CREATE_LOG, variables).await;
    assert_eq!(error_code(&fourth), Some(Value::from("LIMIT_REACHED")));

    let other = run(
        &schema,
        CREATE_LOG,
        json!({ "log": { "checkout_id": 1, "address_id": 3, "value": "NH" } }),
    )
    .await;
    let id = other.data.into_json().unwrap()["createActivityLog"]["id"].clone();
    let moved = run(
        &schema,
        "mutation($log: ActivityLogInput!) { updateActivityLog(activityLog: $log) { id } }",
        json!({ "log": { "id": id, "checkout_id": 1, "address_id": 2, "value": "NH" } }),
    )
    .await;
    assert_eq!(error_code(&moved), Some(Value::from("LIMIT_REACHED")));
}

#[tokio::test]
async fn test_group_lifecycle_and_conflict() {
    let schema = schema();
    let create = r#"
        mutation($group: GroupInput!) {
            createGroup(group: $group) { id congregation_id code description overseer }
        }
    "#;

    let created = run(
        &schema,
        create,
        json!({ "group": { "congregation_id": 3, "code": "East", "overseer": 12 } }),
    )
    .await;
    assert!(created.errors.is_empty(), "{:?}", created.errors);
    let id = created.data.into_json().unwrap()["createGroup"]["id"].as_i64().unwrap();

    let duplicate = run(
        &schema,
        create,
        json!({ "group": { "congregation_id": 3, "code": "East" } }),
    )
    .await;
    assert_eq!(error_code(&duplicate), Some(Value::from("CONFLICT")));

    let updated = run(
        &schema,
        "mutation($group: GroupInput!) { updateGroup(group: $group) { code description overseer } }",
        json!({ "group": { "id": id, "congregation_id": 3, "code": "East-1", "description": "river side" } }),
    )
    .await;
    let updated = updated.data.into_json().unwrap();
    assert_eq!(updated["updateGroup"]["code"], json!("East-1"));
    assert_eq!(updated["updateGroup"]["overseer"], serde_json::Value::Null);

    let by_code = run(&schema, r#"{ group(congId: 3, code: "East-1") { id } }"#, json!({})).await;
    assert_eq!(by_code.data.into_json().unwrap()["group"]["id"], json!(id));

    let codes = run(&schema, "{ groupCodes(congId: 3) }", json!({})).await;
    assert_eq!(codes.data.into_json().unwrap(), json!({ "groupCodes": ["East-1"] }));
}

#[tokio::test]
async fn test_group_lookup_without_key() {
    let response = run(&schema(), "{ group(congId: 3) { id } }", json!({})).await;
    assert_eq!(error_code(&response), Some(Value::from("VALIDATION")));
}

#[tokio::test]
async fn test_quotes_survive_round_trip() {
    let schema = schema();
    let tricky = "Robert'); DROP TABLE groups;-- \"quoted\" \\ back";
    let created = run(
        &schema,
        "mutation($group: GroupInput!) { createGroup(group: $group) { description } }",
        json!({ "group": { "congregation_id": 1, "code": "Q", "description": tricky } }),
    )
    .await;

    assert_eq!(
        created.data.into_json().unwrap()["createGroup"]["description"],
        json!(tricky)
    );
}

#[tokio::test]
async fn test_address_change_logs_query() {
    let storage = Arc::new(InMemoryStorage::new());
    storage.register_address(40, 9).unwrap();
    storage
        .record_address_change(Some(1), parse_min_date("2018-02-03 10:00:00").unwrap(), 40, "{\"name\":[\"\",\"Lee\"]}")
        .unwrap();
    storage
        .record_address_change(Some(1), parse_min_date("2017-12-31").unwrap(), 40, "{}")
        .unwrap();
    let schema = create_schema(storage, SchemaOptions::default());

    let response = run(
        &schema,
        r#"{ addressChangeLogs(congId: 9, recordId: 40, minDate: "2018-01-01") { publisher_id date table_name record_id changes } }"#,
        json!({}),
    )
    .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let data = response.data.into_json().unwrap();
    let entries = data["addressChangeLogs"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["date"], json!("2018-02-03 10:00:00"));
    assert_eq!(entries[0]["table_name"], json!("address"));
    assert_eq!(entries[0]["changes"], json!("{\"name\":[\"\",\"Lee\"]}"));
}

#[tokio::test]
async fn test_bad_min_date_is_validation_error() {
    let response = run(
        &schema(),
        r#"{ addressChangeLogs(congId: 9, minDate: "yesterday") { id } }"#,
        json!({}),
    )
    .await;
    assert_eq!(error_code(&response), Some(Value::from("VALIDATION")));
}

#[tokio::test]
async fn test_delete_activity_log_reports_removal() {
    let schema = schema();
    let created = run(
        &schema,
        CREATE_LOG,
        json!({ "log": { "checkout_id": 1, "address_id": 2, "value": "NH" } }),
    )
    .await;
    let id = created.data.into_json().unwrap()["createActivityLog"]["id"].as_i64().unwrap();

    let delete = "mutation($id: Int!) { deleteActivityLog(id: $id) }";
    let first = run(&schema, delete, json!({ "id": id })).await;
    let second = run(&schema, delete, json!({ "id": id })).await;
    assert_eq!(first.data.into_json().unwrap(), json!({ "deleteActivityLog": true }));
    assert_eq!(second.data.into_json().unwrap(), json!({ "deleteActivityLog": false }));
}

#[tokio::test]
async fn test_update_missing_group_is_not_found() {
    let response = run(
        &schema(),
        "mutation($group: GroupInput!) { updateGroup(group: $group) { id } }",
        json!({ "group": { "id": 404, "congregation_id": 1, "code": "A" } }),
    )
    .await;
    assert_eq!(error_code(&response), Some(Value::from("NOT_FOUND")));
}
