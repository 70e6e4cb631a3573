//! Request routing and verb dispatch.
//!
//! One resource path serves the whole API, exactly four outcomes:
//!
//! - `PUT` - ingest a stream of key/value objects atomically
//! - `GET` - enumerate every committed record as newline-delimited JSON
//! - `POST`/`DELETE` - reserved for future mutate/delete, `501`
//! - anything else - `400`
//!
//! No state persists across requests; each request is dispatched
//! independently against the shared store.

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use cipherlog_core::{export, ingest, write_sentinel, CoreError};
use cipherlog_store::Store;
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// Content type carried by every response (and echoed as `Accept`).
const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// Upper bound on a single request body.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared state behind the router.
#[derive(Clone)]
pub struct AppState {
    /// The store every request operates on.
    pub store: Arc<Store>,
}

impl AppState {
    /// Creates router state over a store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

/// Builds the API router.
///
/// Every path is served; the original API namespaces nothing, so the
/// router dispatches purely on the HTTP verb.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

#[derive(Serialize)]
struct Msg<'a> {
    message: &'a str,
}

fn msg_body(message: &str) -> Vec<u8> {
    serde_json::to_vec(&Msg { message }).unwrap_or_default()
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, APPLICATION_JSON),
            (header::ACCEPT, APPLICATION_JSON),
        ],
        body,
    )
        .into_response()
}

fn count_message(count: usize) -> String {
    match count {
        0 => "no key-value pairs persisted".to_string(),
        1 => "persisted 1 key-value pair".to_string(),
        n => format!("persisted {n} key-value pairs"),
    }
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());
    let peer = peer.as_deref().unwrap_or("-");
    tracing::info!(%method, %uri, peer, "request");

    if method == Method::PUT {
        handle_put(Arc::clone(&state.store), request).await
    } else if method == Method::GET {
        handle_get(Arc::clone(&state.store)).await
    } else if method == Method::POST || method == Method::DELETE {
        tracing::warn!(%method, %uri, peer, "method not implemented yet");
        json_response(
            StatusCode::NOT_IMPLEMENTED,
            msg_body("Method not implemented yet."),
        )
    } else {
        tracing::warn!(%method, %uri, peer, "bad request");
        json_response(StatusCode::BAD_REQUEST, msg_body("400 Bad Request"))
    }
}

async fn handle_put(store: Arc<Store>, request: Request) -> Response {
    let body = request.into_body();

    // A connection dropped mid-body is indistinguishable from malformed
    // input to the client contract: abort, persist nothing.
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return put_failure(&CoreError::malformed_input(e));
        }
    };

    // The transaction does synchronous file I/O under the store mutex;
    // keep it off the async workers.
    let joined = tokio::task::spawn_blocking(move || ingest(&store, bytes.as_ref())).await;

    match joined {
        Ok(Ok(batch)) => {
            let message = count_message(batch.len());
            tracing::info!("{message}");
            json_response(StatusCode::OK, msg_body(&message))
        }
        Ok(Err(e)) => put_failure(&e),
        Err(e) => put_failure(&CoreError::Io(io::Error::other(e))),
    }
}

fn put_failure(err: &CoreError) -> Response {
    tracing::warn!(error = %err, "ingestion failed");
    let message = format!(
        "Error: unable to store key-value pairs, all pairs in this transaction rolled back: {err}"
    );
    json_response(StatusCode::BAD_REQUEST, msg_body(&message))
}

async fn handle_get(store: Arc<Store>) -> Response {
    // Transport status is always 200; an enumeration failure is appended
    // in-stream as the sentinel object because lines already produced
    // cannot be retracted.
    let joined = tokio::task::spawn_blocking(move || {
        let mut body = Vec::new();
        if let Err(e) = export(&store, &mut body) {
            tracing::warn!(error = %e, "enumeration failed, appending sentinel");
            if write_sentinel(&mut body, &e.to_string()).is_err() {
                tracing::error!("failed to append sentinel object");
            }
        }
        body
    })
    .await;

    let body = match joined {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "enumeration task failed");
            let mut body = Vec::new();
            if write_sentinel(&mut body, "enumeration task failed").is_err() {
                tracing::error!("failed to append sentinel object");
            }
            body
        }
    };

    json_response(StatusCode::OK, body)
}
