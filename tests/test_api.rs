//! HTTP API flows exercised through warp's test client

mod test_helpers;

use mqtt_http_bridge::api::routes;
use mqtt_http_bridge::subscription::SubscriptionService;
use serde_json::{json, Value};
use std::sync::Arc;
use test_helpers::memory_service;
use warp::http::StatusCode;

struct Reply {
    status: StatusCode,
    body: Value,
}

async fn call(
    service: &Arc<SubscriptionService>,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> Reply {
    let mut request = warp::test::request().method(method).path(path);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .reply(&routes(Arc::clone(service), Arc::default()))
        .await;
    Reply {
        status: response.status(),
        body: serde_json::from_slice(response.body()).unwrap_or(Value::Null),
    }
}

fn lamp() -> Value {
    json!({
        "name": "Lamp",
        "topic": "home/lamp",
        "method": "POST",
        "url": "http://localhost/lamp",
        "headers": {"Authorization": "Bearer {{global.token}}"},
        "body": "{{ meta.payload }}"
    })
}

#[tokio::test]
async fn test_subscription_crud() {
    let service = memory_service();

    let created = call(&service, "POST", "/api/v1/subscriptions", Some(lamp())).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["subscription"]["id"].as_str().unwrap().to_string();
    assert_eq!(created.body["subscription"]["bodyTemplate"], "{{ meta.payload }}");

    let fetched = call(&service, "GET", &format!("/api/v1/subscriptions/{id}"), None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["subscription"]["name"], "Lamp");

    let mut changed = lamp();
    changed["url"] = json!("http://localhost/changed");
    let updated = call(
        &service,
        "PUT",
        &format!("/api/v1/subscriptions/{id}"),
        Some(changed),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["subscription"]["id"], id.as_str());
    assert_eq!(updated.body["subscription"]["url"], "http://localhost/changed");

    let listed = call(&service, "GET", "/api/v1/subscriptions", None).await;
    assert_eq!(listed.body["subscriptions"].as_array().unwrap().len(), 1);

    let deleted = call(&service, "DELETE", &format!("/api/v1/subscriptions/{id}"), None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body, json!({"status": "success"}));

    let missing = call(&service, "GET", &format!("/api/v1/subscriptions/{id}"), None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(missing.body["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to get subscription:"));
}

#[tokio::test]
async fn test_invalid_subscription_lists_field_errors() {
    let service = memory_service();

    let response = call(
        &service,
        "POST",
        "/api/v1/subscriptions",
        Some(json!({"name": "x", "topic": "a/b", "method": "TRACE"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["error"],
        json!([
            "Field 'method' must be one of GET POST PUT PATCH DELETE",
            "Field 'url' cannot be blank"
        ])
    );
}

#[tokio::test]
async fn test_update_unknown_subscription_is_not_found() {
    let service = memory_service();
    let response = call(&service, "PUT", "/api/v1/subscriptions/nope", Some(lamp())).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_template_lifecycle_and_instantiation() {
    let service = memory_service();

    let template = json!({
        "name": "Button {{tpl.instanceId}}",
        "topic": "zigbee2mqtt/button-{{tpl.instanceId}}",
        "method": "POST",
        "url": "http://localhost/buttons",
        "requiredParameters": ["instanceId"]
    });
    let created = call(&service, "POST", "/api/v1/subscription-templates", Some(template)).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let template_id = created.body["subscriptionTemplate"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        created.body["subscriptionTemplate"]["requiredParameters"],
        json!(["instanceId"])
    );

    let listed = call(&service, "GET", "/api/v1/subscription-templates", None).await;
    assert_eq!(
        listed.body["subscriptionTemplates"].as_array().unwrap().len(),
        1
    );

    let instantiate = format!("/api/v1/subscription-templates/{template_id}/subscriptions");
    let missing = call(&service, "POST", &instantiate, Some(json!({"parameters": {}}))).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert!(missing.body["error"]
        .as_str()
        .unwrap()
        .contains("missing required parameters: instanceId"));

    let derived = call(
        &service,
        "POST",
        &instantiate,
        Some(json!({"parameters": {"instanceId": "001"}})),
    )
    .await;
    assert_eq!(derived.status, StatusCode::CREATED);
    assert_eq!(derived.body["subscription"]["templateId"], template_id.as_str());

    let subs = call(&service, "GET", "/api/v1/subscriptions", None).await;
    assert_eq!(subs.body["subscriptions"][0]["name"], "Button 001");
    assert_eq!(
        subs.body["subscriptions"][0]["topic"],
        "zigbee2mqtt/button-001"
    );

    let deleted = call(
        &service,
        "DELETE",
        &format!("/api/v1/subscription-templates/{template_id}"),
        None,
    )
    .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let gone = call(
        &service,
        "GET",
        &format!("/api/v1/subscription-templates/{template_id}"),
        None,
    )
    .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_template_requires_parameter_list() {
    let service = memory_service();
    let response = call(&service, "POST", "/api/v1/subscription-templates", Some(lamp())).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["error"],
        "Field 'requiredParameters' cannot be blank"
    );
}

#[tokio::test]
async fn test_instantiating_unknown_template_is_not_found() {
    let service = memory_service();
    let response = call(
        &service,
        "POST",
        "/api/v1/subscription-templates/nope/subscriptions",
        Some(json!({"parameters": {}})),
    )
    .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_global_parameters() {
    let service = memory_service();

    let set = call(
        &service,
        "POST",
        "/api/v1/global-parameters",
        Some(json!({"parameter": "token", "value": "abc"})),
    )
    .await;
    assert_eq!(set.status, StatusCode::OK);
    assert_eq!(set.body, json!({"status": "ok"}));

    let listed = call(&service, "GET", "/api/v1/global-parameters", None).await;
    assert_eq!(listed.body, json!({"parameters": {"token": "abc"}}));

    let bad = call(
        &service,
        "POST",
        "/api/v1/global-parameters",
        Some(json!({"parameter": "bad key", "value": "x"})),
    )
    .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    let blank = call(
        &service,
        "POST",
        "/api/v1/global-parameters",
        Some(json!({"parameter": "token"})),
    )
    .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
    assert_eq!(blank.body["error"], "Field 'value' cannot be blank");

    let deleted = call(&service, "DELETE", "/api/v1/global-parameters/token", None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    let listed = call(&service, "GET", "/api/v1/global-parameters", None).await;
    assert_eq!(listed.body, json!({"parameters": {}}));
}

#[tokio::test]
async fn test_validate_reports_expression_errors() {
    let service = memory_service();

    let ok = call(
        &service,
        "POST",
        "/api/v1/validate",
        Some(json!({"type": "template", "subject": "{{ meta.topic }}"})),
    )
    .await;
    assert_eq!(ok.body, json!({}));

    let bad = call(
        &service,
        "POST",
        "/api/v1/validate",
        Some(json!({"type": "jsonata", "subject": "extract.action = "})),
    )
    .await;
    assert_eq!(bad.status, StatusCode::OK);
    assert!(bad.body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid jsonata:"));
}

#[tokio::test]
async fn test_unknown_method_on_known_path_is_json_404() {
    let service = memory_service();
    let response = call(&service, "PATCH", "/api/v1/subscriptions", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, json!({"error": "Not Found"}));
}
