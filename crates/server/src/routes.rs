//! Route handlers

use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query as UrlQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use lodge_storage::Query;

use crate::{AppState, SchemaField};

/// Buffered NDJSON lines between the storage scan and the response body.
const STREAM_BUFFER: usize = 32;

pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/api/query/{name}", get(handle_query))
        .route("/api/schema/{name}", get(handle_schema))
        .route("/api/agents", get(handle_agents))
        .with_state(state)
}

async fn handle_query(
    State(state): State<AppState>,
    Path(name): Path<String>,
    UrlQuery(params): UrlQuery<Vec<(String, String)>>,
) -> Response {
    let mut query = Query::new(&name);

    for (key, value) in &params {
        match key.split_once("__") {
            None => match key.as_str() {
                "limit" => match value.parse::<i64>() {
                    Ok(limit) => query.set_limit(limit),
                    Err(_) => {
                        return (StatusCode::BAD_REQUEST, "Invalid limit value").into_response();
                    }
                },
                // Cursors travel as zero-padded hex.
                "after" => match i64::from_str_radix(value, 16) {
                    Ok(cursor) => query.set_after(cursor),
                    Err(_) => {
                        return (StatusCode::BAD_REQUEST, "Invalid after value").into_response();
                    }
                },
                "before" => match i64::from_str_radix(value, 16) {
                    Ok(cursor) => query.set_before(cursor),
                    Err(_) => {
                        return (StatusCode::BAD_REQUEST, "Invalid before value").into_response();
                    }
                },
                _ => {}
            },
            Some((field, op)) => {
                if let Err(e) = query.set_filter(field, op, value) {
                    return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
                }
            }
        }
    }

    let (tx, rx) = mpsc::channel::<Bytes>(STREAM_BUFFER);
    let storage = state.storage.clone();
    tokio::spawn(async move {
        if let Err(e) = storage.query(tx, &query).await {
            tracing::error!(table = %query.name(), error = %e, "query failed");
        }
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|bytes| (Ok::<Bytes, Infallible>(bytes), rx))
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(stream),
    )
        .into_response()
}

#[derive(Serialize)]
struct SchemaResponse<'a> {
    name: &'a str,
    schema: &'a [SchemaField],
}

async fn handle_schema(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.schemas.get(&name) {
        Some(schema) => Json(SchemaResponse {
            name: &name,
            schema,
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, "Fields not found").into_response(),
    }
}

#[derive(Serialize)]
struct AgentsResponse<'a> {
    agents: Vec<&'a str>,
}

async fn handle_agents(State(state): State<AppState>) -> Response {
    let agents = state.schemas.keys().map(String::as_str).collect();
    Json(AgentsResponse { agents }).into_response()
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod routes_test;
