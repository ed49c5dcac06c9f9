use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::header;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use handoff_core::{new_record, normalize_user_id, now_ms, API_TOKEN_HEADER};
use handoff_observability::{emit_event, ObservabilityEvent, ProcessKind};
use handoff_types::{ErrorEnvelope, QueueConnectionRequest, QueuedConnection};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::{QueueState, REAPER_INTERVAL_SECS};

const HEALTH_PATH: &str = "/global/health";

#[derive(Debug, Deserialize, Default)]
struct FetchQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

pub async fn serve(addr: SocketAddr, state: QueueState) -> anyhow::Result<()> {
    let reaper_state = state.clone();
    let app = app_router(state);
    let reaper = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(REAPER_INTERVAL_SECS)).await;
            match reaper_state.store.purge_expired(now_ms()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!("purged {} expired connection request(s)", purged),
                Err(err) => tracing::warn!("connection reaper failed: {}", err),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("queue api listening on http://{}", listener.local_addr()?);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await;
    reaper.abort();
    result?;
    Ok(())
}

pub fn app_router(state: QueueState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(HEALTH_PATH, get(global_health))
        .route("/api/queue_connection", post(queue_connection))
        .route("/api/fetch_connection", get(fetch_connection))
        .layer(cors)
        .layer(middleware::from_fn_with_state(state.clone(), auth_gate))
        .with_state(state)
}

async fn auth_gate(State(state): State<QueueState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };
    let provided = extract_request_token(request.headers());
    if provided.as_deref() == Some(expected) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorEnvelope::new(
            "Unauthorized: missing or invalid API token",
            Some("AUTH_REQUIRED"),
        )),
    )
        .into_response()
}

fn extract_request_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(API_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(token.to_string());
    }

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;
    let trimmed = auth.trim();
    let bearer = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?;
    let token = bearer.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

async fn global_health(State(state): State<QueueState>) -> impl IntoResponse {
    Json(json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
        "build_id": crate::build_id(),
        "pendingCount": state.store.pending_count().await,
        "ttlSecs": state.ttl_secs,
        "apiTokenRequired": state.api_token.is_some(),
        "uptimeMs": now_ms().saturating_sub(state.started_at_ms),
    }))
}

async fn queue_connection(State(state): State<QueueState>, body: Bytes) -> Response {
    let Ok(input) = serde_json::from_slice::<QueueConnectionRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };
    if input
        .user_id
        .as_deref()
        .and_then(normalize_user_id)
        .is_none()
    {
        return (StatusCode::BAD_REQUEST, "Missing 'userId'").into_response();
    }

    let record = match new_record(input, state.ttl_secs, now_ms()) {
        Ok(record) => record,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    match state.store.create(record).await {
        Ok(record) => {
            emit_event(
                tracing::Level::INFO,
                ProcessKind::Queue,
                ObservabilityEvent {
                    event: "queue.enqueued",
                    component: "queue.http",
                    user_id: Some(&record.user_id),
                    request_id: Some(&record.id),
                    status: Some("pending"),
                    detail: record.target_ip.as_deref(),
                    ..Default::default()
                },
            );
            (StatusCode::CREATED, Json(QueuedConnection::new(record.id))).into_response()
        }
        Err(err) => store_failure("queue.store_failed", err),
    }
}

async fn fetch_connection(
    State(state): State<QueueState>,
    Query(query): Query<FetchQuery>,
) -> Response {
    let Some(user_id) = query.user_id.as_deref().and_then(normalize_user_id) else {
        return (StatusCode::BAD_REQUEST, "Missing 'userId' query parameter").into_response();
    };

    match state.store.take_pending(&user_id, now_ms()).await {
        Ok(Some(record)) => {
            emit_event(
                tracing::Level::INFO,
                ProcessKind::Queue,
                ObservabilityEvent {
                    event: "queue.consumed",
                    component: "queue.http",
                    user_id: Some(&user_id),
                    request_id: Some(&record.id),
                    status: Some("delivered"),
                    ..Default::default()
                },
            );
            (StatusCode::OK, Json(record.payload())).into_response()
        }
        Ok(None) => {
            emit_event(
                tracing::Level::INFO,
                ProcessKind::Queue,
                ObservabilityEvent {
                    event: "queue.empty",
                    component: "queue.http",
                    user_id: Some(&user_id),
                    status: Some("empty"),
                    ..Default::default()
                },
            );
            (StatusCode::NOT_FOUND, "No pending connection found").into_response()
        }
        Err(err) => store_failure("queue.store_failed", err),
    }
}

fn store_failure(event: &str, err: handoff_core::StoreError) -> Response {
    let detail = err.to_string();
    emit_event(
        tracing::Level::ERROR,
        ProcessKind::Queue,
        ObservabilityEvent {
            event,
            component: "queue.http",
            status: Some("failed"),
            error_code: Some("STORE_FAILED"),
            detail: Some(&detail),
            ..Default::default()
        },
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal Server Error: {detail}"),
    )
        .into_response()
}
