use super::requests::{
    GlobalParameterRequest, InstantiateRequest, SubscriptionRequest, SubscriptionTemplateRequest,
    ValidationRequest, ValidationType,
};
use crate::error::BridgeError;
use crate::expression::Expression;
use crate::observability::metrics::metrics;
use crate::subscription::SubscriptionService;
use crate::template::validate_template;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

type HandlerResult = Result<Response, Infallible>;

pub(crate) fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

/// `{"error": "..."}`, or `{"error": [...]}` for several messages
pub(crate) fn error_reply(status: StatusCode, mut messages: Vec<String>) -> Response {
    let error = if messages.len() == 1 {
        Value::String(messages.remove(0))
    } else {
        json!(messages)
    };
    json_reply(status, &json!({ "error": error }))
}

fn failure(context: &str, err: BridgeError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "{context}");
    }
    error_reply(status, vec![format!("{context}: {err}")])
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Rejected malformed request body");
        error_reply(StatusCode::BAD_REQUEST, vec![format!("invalid request: {e}")])
    })
}

fn invalid(errors: Vec<String>) -> Response {
    error_reply(StatusCode::BAD_REQUEST, errors)
}

macro_rules! try_reply {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(response) => return Ok(response),
        }
    };
}

pub async fn health() -> HandlerResult {
    Ok(json_reply(StatusCode::OK, &json!({ "status": "ok" })))
}

pub async fn get_metrics() -> HandlerResult {
    Ok(json_reply(StatusCode::OK, &metrics().get_metrics()))
}

pub async fn validate(body: Bytes) -> HandlerResult {
    let request: ValidationRequest = try_reply!(parse_body(&body));

    let outcome = match request.validation_type {
        ValidationType::Jsonata => Expression::compile(&request.subject)
            .map(|_| ())
            .map_err(|e| format!("invalid jsonata: {e}")),
        ValidationType::Template => {
            validate_template(&request.subject).map_err(|e| format!("invalid template: {e}"))
        }
    };

    let body = match outcome {
        Ok(()) => json!({}),
        Err(message) => json!({ "error": message }),
    };
    Ok(json_reply(StatusCode::OK, &body))
}

pub async fn list_subscriptions(service: Arc<SubscriptionService>) -> HandlerResult {
    match service.get_subscriptions().await {
        Ok(subs) => Ok(json_reply(StatusCode::OK, &json!({ "subscriptions": subs }))),
        Err(e) => Ok(failure("failed to list subscriptions", e)),
    }
}

pub async fn add_subscription(body: Bytes, service: Arc<SubscriptionService>) -> HandlerResult {
    let request: SubscriptionRequest = try_reply!(parse_body(&body));
    try_reply!(request.validate().map_err(invalid));

    match service
        .add_subscription(request.into_subscription(String::new()))
        .await
    {
        Ok(sub) => Ok(json_reply(StatusCode::CREATED, &json!({ "subscription": sub }))),
        Err(e) => Ok(failure("failed to add subscription", e)),
    }
}

pub async fn get_subscription(id: String, service: Arc<SubscriptionService>) -> HandlerResult {
    match service.get_subscription(&id).await {
        Ok(sub) => Ok(json_reply(StatusCode::OK, &json!({ "subscription": sub }))),
        Err(e) => Ok(failure("failed to get subscription", e)),
    }
}

/// Update in place, or re-instantiate from a template when the body names one
pub async fn update_subscription(
    id: String,
    body: Bytes,
    service: Arc<SubscriptionService>,
) -> HandlerResult {
    let request: SubscriptionRequest = try_reply!(parse_body(&body));

    if let Some(template_id) = request.subscription_template_id.clone() {
        return match service
            .add_subscription_from_template(&template_id, request.subscription_template_parameters)
            .await
        {
            Ok(sub) => Ok(json_reply(StatusCode::CREATED, &json!({ "subscription": sub }))),
            Err(e) => Ok(failure("failed to update subscription from template", e)),
        };
    }

    try_reply!(request.validate().map_err(invalid));
    match service
        .update_subscription(request.into_subscription(id))
        .await
    {
        Ok(sub) => Ok(json_reply(StatusCode::OK, &json!({ "subscription": sub }))),
        Err(e) => Ok(failure("failed to update subscription", e)),
    }
}

pub async fn delete_subscription(id: String, service: Arc<SubscriptionService>) -> HandlerResult {
    match service.delete_subscription(&id).await {
        Ok(()) => Ok(json_reply(StatusCode::OK, &json!({ "status": "success" }))),
        Err(e) => Ok(failure("failed to delete subscription", e)),
    }
}

pub async fn list_subscription_templates(service: Arc<SubscriptionService>) -> HandlerResult {
    match service.get_subscription_templates().await {
        Ok(templates) => Ok(json_reply(
            StatusCode::OK,
            &json!({ "subscriptionTemplates": templates }),
        )),
        Err(e) => Ok(failure("failed to list subscription templates", e)),
    }
}

pub async fn add_subscription_template(
    body: Bytes,
    service: Arc<SubscriptionService>,
) -> HandlerResult {
    let request: SubscriptionTemplateRequest = try_reply!(parse_body(&body));
    try_reply!(request.validate().map_err(invalid));

    match service
        .add_subscription_template(request.into_template(String::new()))
        .await
    {
        Ok(template) => Ok(json_reply(
            StatusCode::CREATED,
            &json!({ "subscriptionTemplate": template }),
        )),
        Err(e) => Ok(failure("failed to add subscription template", e)),
    }
}

pub async fn get_subscription_template(
    id: String,
    service: Arc<SubscriptionService>,
) -> HandlerResult {
    match service.get_subscription_template(&id).await {
        Ok(template) => Ok(json_reply(
            StatusCode::OK,
            &json!({ "subscriptionTemplate": template }),
        )),
        Err(e) => Ok(failure("failed to get subscription template", e)),
    }
}

pub async fn update_subscription_template(
    id: String,
    body: Bytes,
    service: Arc<SubscriptionService>,
) -> HandlerResult {
    let request: SubscriptionTemplateRequest = try_reply!(parse_body(&body));
    try_reply!(request.validate().map_err(invalid));

    match service
        .update_subscription_template(request.into_template(id))
        .await
    {
        Ok(template) => Ok(json_reply(
            StatusCode::OK,
            &json!({ "subscriptionTemplate": template }),
        )),
        Err(e) => Ok(failure("failed to update subscription template", e)),
    }
}

pub async fn delete_subscription_template(
    id: String,
    service: Arc<SubscriptionService>,
) -> HandlerResult {
    match service.delete_subscription_template(&id).await {
        Ok(()) => Ok(json_reply(StatusCode::OK, &json!({ "status": "success" }))),
        Err(e) => Ok(failure("failed to delete subscription template", e)),
    }
}

pub async fn instantiate_subscription_template(
    id: String,
    body: Bytes,
    service: Arc<SubscriptionService>,
) -> HandlerResult {
    let request: InstantiateRequest = if body.is_empty() {
        InstantiateRequest::default()
    } else {
        try_reply!(parse_body(&body))
    };

    match service
        .add_subscription_from_template(&id, request.parameters)
        .await
    {
        Ok(sub) => Ok(json_reply(StatusCode::CREATED, &json!({ "subscription": sub }))),
        Err(e) => Ok(failure("failed to add subscription from template", e)),
    }
}

pub async fn list_global_parameters(service: Arc<SubscriptionService>) -> HandlerResult {
    match service.get_global_parameters().await {
        Ok(params) => Ok(json_reply(StatusCode::OK, &json!({ "parameters": params }))),
        Err(e) => Ok(failure("failed to list global parameters", e)),
    }
}

pub async fn set_global_parameter(body: Bytes, service: Arc<SubscriptionService>) -> HandlerResult {
    let request: GlobalParameterRequest = try_reply!(parse_body(&body));
    try_reply!(request.validate().map_err(invalid));

    match service
        .set_global_parameter(request.parameter.trim(), request.value.trim())
        .await
    {
        Ok(()) => Ok(json_reply(StatusCode::OK, &json!({ "status": "ok" }))),
        Err(e) => Ok(failure("failed to set global parameter", e)),
    }
}

pub async fn delete_global_parameter(
    key: String,
    service: Arc<SubscriptionService>,
) -> HandlerResult {
    match service.delete_global_parameter(key.trim()).await {
        Ok(()) => Ok(json_reply(StatusCode::OK, &json!({ "status": "ok" }))),
        Err(e) => Ok(failure("failed to delete global parameter", e)),
    }
}
