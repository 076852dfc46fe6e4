// Copyright 2026 Proforma Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for the proforma runtime.
//!
//! Thin JSON surface over the store, plus the two live endpoints: the
//! sweep trigger (server-sent events — one `start`, `progress`/`result`
//! pairs, one terminal `done` or `error`) and the document proxy. Any
//! other push transport can consume the same event channel; SSE is just
//! the reference one.

use crate::docproxy::{self, ProxyError};
use crate::error::StoreError;
use crate::events::{self, SweepEvent};
use crate::renderer::Renderer;
use crate::store::Store;
use crate::sweep::{SweepConfig, SweepRunner};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Everything the handlers share.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub renderer: Arc<dyn Renderer>,
    pub sweep_config: SweepConfig,
    pub http: reqwest::Client,
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/categories", get(list_categories).post(create_category))
        .route("/api/v1/processes", get(list_processes).post(create_process))
        .route("/api/v1/processes/:id", delete(delete_process))
        .route("/api/v1/processes/:id/sweep", get(sweep_sse))
        .route("/api/v1/processes/:id/sweeps", get(list_sweeps))
        .route("/api/v1/suppliers", get(list_suppliers).post(create_supplier))
        .route("/api/v1/sweeps/:id/items", get(list_items))
        .route("/api/v1/sweeps/:id/attachments", get(list_attachments))
        .route("/api/v1/doc", get(doc_proxy))
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server on the given port.
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn store_error(e: StoreError) -> Response {
    let status = match &e {
        StoreError::MissingRecord { .. } => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

fn json_or_store_error<T: serde::Serialize>(result: Result<T, StoreError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => store_error(e),
    }
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_contexts": state.renderer.active_contexts(),
    }))
}

#[derive(serde::Deserialize)]
struct NewCategory {
    name: String,
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Response {
    json_or_store_error(state.store.categories())
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewCategory>,
) -> Response {
    json_or_store_error(state.store.add_category(&body.name))
}

#[derive(serde::Deserialize)]
struct NewProcess {
    portal_code: String,
    category_id: i64,
}

async fn list_processes(State(state): State<Arc<AppState>>) -> Response {
    json_or_store_error(state.store.processes())
}

async fn create_process(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewProcess>,
) -> Response {
    json_or_store_error(state.store.add_process(&body.portal_code, body.category_id))
}

async fn delete_process(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    json_or_store_error(state.store.delete_process(id).map(|()| serde_json::json!({ "deleted": id })))
}

#[derive(serde::Deserialize)]
struct NewSupplier {
    ruc: String,
    category_id: i64,
}

async fn list_suppliers(State(state): State<Arc<AppState>>) -> Response {
    json_or_store_error(state.store.suppliers())
}

async fn create_supplier(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewSupplier>,
) -> Response {
    json_or_store_error(state.store.add_supplier(&body.ruc, body.category_id))
}

async fn list_sweeps(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    json_or_store_error(state.store.sweeps_for_process(id))
}

async fn list_items(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    json_or_store_error(state.store.line_items(id))
}

async fn list_attachments(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    json_or_store_error(state.store.attachments(id))
}

/// Trigger a sweep and stream its events.
///
/// The runner owns the sender; when the client disconnects, axum drops
/// this stream, the receiver closes, and the runner's next send fails —
/// that is the sink-disconnect signal.
async fn sweep_sse(
    State(state): State<Arc<AppState>>,
    Path(process_id): Path<i64>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = events::channel();
    let runner = SweepRunner::with_config(
        Arc::clone(&state.store),
        Arc::clone(&state.renderer),
        state.sweep_config.clone(),
    );
    tokio::spawn(async move { runner.run(process_id, tx).await });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = matches!(event, SweepEvent::Done { .. } | SweepEvent::Error { .. });
            if let Ok(json) = serde_json::to_string(&event) {
                yield Ok(Event::default().data(json));
            }
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

#[derive(serde::Deserialize, Default)]
struct DocParams {
    url: Option<String>,
}

/// Proxy an attachment download, re-typing it from magic bytes.
async fn doc_proxy(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DocParams>,
) -> Response {
    let Some(url) = params.url else {
        return (StatusCode::BAD_REQUEST, "missing url parameter").into_response();
    };

    match docproxy::fetch_document(&state.http, &url).await {
        Ok(doc) => {
            let disposition = format!("inline; filename=\"{}\"", doc.filename);
            (
                [
                    (header::CONTENT_TYPE, doc.mime.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                    (header::CACHE_CONTROL, "public, max-age=300".to_string()),
                ],
                doc.bytes,
            )
                .into_response()
        }
        Err(e @ ProxyError::InvalidUrl(_)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e @ ProxyError::DisallowedHost(_)) => {
            (StatusCode::FORBIDDEN, e.to_string()).into_response()
        }
        Err(ProxyError::UpstreamStatus(status)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            "upstream error",
        )
            .into_response(),
        Err(e @ ProxyError::Upstream(_)) => {
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
