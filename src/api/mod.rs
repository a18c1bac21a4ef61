//! HTTP API for managing subscriptions, templates and global parameters
//!
//! Every route lives under `/api/v1`. Successful responses wrap the payload
//! in a named field (`{"subscription": {...}}`); failures are
//! `{"error": "..."}` with the status code of the underlying
//! [`BridgeError`](crate::error::BridgeError).

mod handlers;
mod mqtt_log;
pub mod requests;

use crate::error::{BridgeError, BridgeResult};
use crate::message_log::MessageLog;
use crate::subscription::SubscriptionService;
use handlers::error_reply;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

fn with_service(
    service: Arc<SubscriptionService>,
) -> impl Filter<Extract = (Arc<SubscriptionService>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&service))
}

fn with_message_log(
    log: Arc<MessageLog>,
) -> impl Filter<Extract = (Arc<MessageLog>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&log))
}

/// All API routes, including the JSON 404 fallback
pub fn routes(
    service: Arc<SubscriptionService>,
    message_log: Arc<MessageLog>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and_then(handlers::health);
    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and_then(handlers::get_metrics);
    let validate = warp::path!("validate")
        .and(warp::post())
        .and(warp::body::bytes())
        .and_then(handlers::validate);

    let subscriptions = warp::path!("subscriptions")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::list_subscriptions)
        .or(warp::path!("subscriptions")
            .and(warp::post())
            .and(warp::body::bytes())
            .and(with_service(service.clone()))
            .and_then(handlers::add_subscription))
        .or(warp::path!("subscriptions" / String)
            .and(warp::get())
            .and(with_service(service.clone()))
            .and_then(handlers::get_subscription))
        .or(warp::path!("subscriptions" / String)
            .and(warp::put())
            .and(warp::body::bytes())
            .and(with_service(service.clone()))
            .and_then(handlers::update_subscription))
        .or(warp::path!("subscriptions" / String)
            .and(warp::delete())
            .and(with_service(service.clone()))
            .and_then(handlers::delete_subscription));

    let templates = warp::path!("subscription-templates")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::list_subscription_templates)
        .or(warp::path!("subscription-templates")
            .and(warp::post())
            .and(warp::body::bytes())
            .and(with_service(service.clone()))
            .and_then(handlers::add_subscription_template))
        .or(warp::path!("subscription-templates" / String)
            .and(warp::get())
            .and(with_service(service.clone()))
            .and_then(handlers::get_subscription_template))
        .or(warp::path!("subscription-templates" / String)
            .and(warp::put())
            .and(warp::body::bytes())
            .and(with_service(service.clone()))
            .and_then(handlers::update_subscription_template))
        .or(warp::path!("subscription-templates" / String)
            .and(warp::delete())
            .and(with_service(service.clone()))
            .and_then(handlers::delete_subscription_template))
        .or(warp::path!("subscription-templates" / String / "subscriptions")
            .and(warp::post())
            .and(warp::body::bytes())
            .and(with_service(service.clone()))
            .and_then(handlers::instantiate_subscription_template));

    let globals = warp::path!("global-parameters")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::list_global_parameters)
        .or(warp::path!("global-parameters")
            .and(warp::post())
            .and(warp::body::bytes())
            .and(with_service(service.clone()))
            .and_then(handlers::set_global_parameter))
        .or(warp::path!("global-parameters" / String)
            .and(warp::delete())
            .and(with_service(service))
            .and_then(handlers::delete_global_parameter));

    let mqtt = warp::path!("mqtt")
        .and(warp::get())
        .and(warp::ws())
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .and(with_message_log(message_log))
        .and_then(mqtt_log::upgrade)
        .or(warp::path!("mqtt")
            .and(warp::get())
            .and_then(mqtt_log::not_a_websocket));

    let not_found = warp::any().map(|| error_reply(StatusCode::NOT_FOUND, vec!["Not Found".to_string()]));

    warp::path("api")
        .and(warp::path("v1"))
        .and(
            health
                .or(metrics)
                .or(validate)
                .or(subscriptions)
                .or(templates)
                .or(globals)
                .or(mqtt)
                .or(not_found),
        )
        .recover(handle_rejection)
        .with(warp::trace(|info| {
            crate::api_span!(method = %info.method(), path = %info.path())
        }))
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else {
        (
            StatusCode::BAD_REQUEST,
            format!("invalid request: {rejection:?}"),
        )
    };
    Ok(error_reply(status, vec![message]))
}

/// Bind the API server and serve it on a background task until `shutdown`
/// flips to true. Returns the bound address.
pub fn spawn_server(
    service: Arc<SubscriptionService>,
    message_log: Arc<MessageLog>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> BridgeResult<(SocketAddr, JoinHandle<()>)> {
    let (bound, server) = warp::serve(routes(service, message_log))
        .try_bind_with_graceful_shutdown(addr, async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .map_err(|e| BridgeError::internal(format!("failed to bind API server on {addr}: {e}")))?;

    info!(address = %bound, "HTTP API listening");
    Ok((bound, tokio::spawn(server)))
}
