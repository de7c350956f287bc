//! Canned request handlers.
//!
//! Every request lands in [`dispatch`], which resolves the path against the
//! immutable route table, sleeps for the behavior's delay, logs the request
//! and writes the fixed status with an empty body. Nothing here can fail.
//!
//! The work runs on its own task, so a client that resets the stream or
//! closes the connection mid-delay does not cut the log line or metric short.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::observability::metrics;
use crate::routing::RouteTable;

/// Route pattern that served a response, attached as a response extension
/// for the tracing middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute(pub Option<String>);

/// Origin-form target of a request (path and query), as sent by the client.
pub fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}

/// Single entry point for every request.
pub async fn dispatch(State(routes): State<Arc<RouteTable>>, method: Method, uri: Uri) -> Response {
    match tokio::spawn(respond(routes, method, uri)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Handler task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn respond(routes: Arc<RouteTable>, method: Method, uri: Uri) -> Response {
    let start = Instant::now();
    let resolved = routes.resolve(uri.path());
    let behavior = resolved.behavior;

    if !behavior.delay.is_zero() {
        tokio::time::sleep(behavior.delay).await;
    }

    let target = request_target(&uri);
    match resolved.pattern {
        Some(route) => tracing::info!(
            method = %method,
            uri = target,
            route,
            behavior = behavior.kind.as_str(),
            "Request received"
        ),
        None => tracing::info!(
            method = %method,
            uri = target,
            "Request received for unregistered URI"
        ),
    }

    let status = behavior.status();
    metrics::record_request(
        method.as_str(),
        status.as_u16(),
        resolved.pattern.unwrap_or("unmatched"),
        start,
    );

    let mut response = status.into_response();
    response
        .extensions_mut()
        .insert(MatchedRoute(resolved.pattern.map(str::to_owned)));
    response
}
