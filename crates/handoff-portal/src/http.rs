use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use handoff_core::now_ms;
use handoff_observability::{emit_event, ObservabilityEvent, ProcessKind};
use handoff_types::QueueConnectionRequest;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::catalog::find_target;
use crate::error::PortalError;
use crate::queue_client::QueueOutcome;
use crate::render::{dashboard, DashboardView};
use crate::session::{
    session_id_from_headers, FlashKind, PendingLogin, SessionHandle, SESSION_IDLE_TTL_MS,
    SESSION_SWEEP_INTERVAL_SECS,
};
use crate::PortalState;

#[derive(Debug, Deserialize, Default)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub async fn serve(addr: SocketAddr, state: PortalState) -> anyhow::Result<()> {
    let sessions = state.sessions.clone();
    let app = app_router(state);
    let sweeper = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS)).await;
            let swept = sessions.purge_idle(now_ms(), SESSION_IDLE_TTL_MS).await;
            if swept > 0 {
                tracing::info!("dropped {} idle portal session(s)", swept);
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("portal listening on http://{}", listener.local_addr()?);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await;
    sweeper.abort();
    result?;
    Ok(())
}

pub fn app_router(state: PortalState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/connect/{target_id}", post(connect))
        .route("/reset", post(reset))
        .route("/login", get(login))
        .route("/auth/callback", get(auth_callback))
        .route("/logout", get(logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn portal_event(level: tracing::Level, event: ObservabilityEvent<'_>) {
    emit_event(level, ProcessKind::Portal, event);
}

/// Signed-in user, or the configured default when sign-in is off. `None` means go log in.
async fn current_user(state: &PortalState, handle: &SessionHandle) -> Option<String> {
    let session = state.sessions.get(&handle.id).await;
    match session.user_id {
        Some(user) => Some(user),
        None if state.sign_in_required() => None,
        None => Some(state.default_user.clone()),
    }
}

async fn index(State(state): State<PortalState>, headers: HeaderMap) -> Response {
    let handle = state.sessions.resolve(&headers).await;
    let Some(user_id) = current_user(&state, &handle).await else {
        return Redirect::to("/login").into_response();
    };
    let session = state.sessions.get(&handle.id).await;
    let flashes = state.sessions.take_flashes(&handle.id).await;
    let history = state.history.for_user(&user_id).await;
    let page = dashboard(&DashboardView {
        user_id: &user_id,
        display_name: session.display_name.as_deref(),
        signed_in: session.user_id.is_some(),
        targets: &state.catalog,
        history: &history,
        flashes: &flashes,
    });
    state
        .sessions
        .attach(&handle, Html(page).into_response())
        .await
}

async fn connect(
    State(state): State<PortalState>,
    Path(target_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let handle = state.sessions.resolve(&headers).await;
    let Some(user_id) = current_user(&state, &handle).await else {
        return Redirect::to("/login").into_response();
    };
    let Some(target) = find_target(&state.catalog, &target_id) else {
        return (StatusCode::NOT_FOUND, "Target not found").into_response();
    };

    let request = QueueConnectionRequest {
        user_id: Some(user_id.clone()),
        target_ip: Some(target.ip.clone()),
        username: Some(target.user.clone()),
        password: target.password.clone(),
        target_name: Some(target.name.clone()),
    };
    tracing::info!(
        "queueing connection target={} user={} endpoint={}",
        target.id,
        user_id,
        state.queue.endpoint()
    );

    let (status, accepted) = match state.queue.queue(&request).await {
        Ok(outcome) => {
            let (kind, message) = match &outcome {
                QueueOutcome::Sent(_) => (
                    FlashKind::Success,
                    format!("Successfully queued connection for {}", target.name),
                ),
                QueueOutcome::Rejected { body, .. } => {
                    (FlashKind::Error, format!("Error from queue API: {body}"))
                }
            };
            state.sessions.flash(&handle.id, kind, message).await;
            (
                outcome.history_status(),
                matches!(outcome, QueueOutcome::Sent(_)),
            )
        }
        Err(err) => {
            state
                .sessions
                .flash(
                    &handle.id,
                    FlashKind::Error,
                    format!("Failed to reach queue API: {err:#}"),
                )
                .await;
            ("FAILED".to_string(), false)
        }
    };

    portal_event(
        if accepted {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        },
        ObservabilityEvent {
            event: "portal.connect",
            component: "portal.http",
            user_id: Some(&user_id),
            status: Some(&status),
            detail: Some(&target.id),
            ..Default::default()
        },
    );
    state.history.record(&user_id, &target.name, status).await;

    let location = state
        .vdi
        .as_ref()
        .filter(|_| accepted)
        .map(|vdi| vdi.location(&user_id))
        .unwrap_or_else(|| "/".to_string());
    state
        .sessions
        .attach(&handle, Redirect::to(&location).into_response())
        .await
}

async fn reset(State(state): State<PortalState>, headers: HeaderMap) -> Redirect {
    let handle = state.sessions.resolve(&headers).await;
    let Some(user_id) = current_user(&state, &handle).await else {
        return Redirect::to("/login");
    };
    state.history.clear().await;
    tracing::info!("portal history cleared by {}", user_id);
    Redirect::to("/")
}

async fn login(
    State(state): State<PortalState>,
    headers: HeaderMap,
) -> Result<Response, PortalError> {
    let Some(oidc) = state.oidc.as_ref() else {
        return Ok(Redirect::to("/").into_response());
    };
    let meta = oidc.metadata().await?;
    let handle = state.sessions.resolve(&headers).await;
    let pending = PendingLogin::new();
    let url = oidc.authorization_url(&meta, &pending.state, &pending.nonce)?;
    state
        .sessions
        .update(&handle.id, |session| session.pending_login = Some(pending))
        .await;
    Ok(state
        .sessions
        .attach(&handle, Redirect::to(url.as_str()).into_response())
        .await)
}

async fn auth_callback(
    State(state): State<PortalState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, PortalError> {
    let Some(oidc) = state.oidc.as_ref() else {
        return Ok(Redirect::to("/").into_response());
    };
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        return Err(PortalError::Provider(
            format!("{error} {description}").trim().to_string(),
        ));
    }

    let handle = state.sessions.resolve(&headers).await;
    let pending = state
        .sessions
        .update(&handle.id, |session| session.pending_login.take())
        .await
        .filter(|pending| !pending.is_stale(now_ms()))
        .filter(|pending| query.state.as_deref() == Some(pending.state.as_str()))
        .ok_or(PortalError::InvalidState)?;
    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| PortalError::Provider("callback carries no authorization code".to_string()))?;

    let (id_token, claims) = oidc.exchange_code(code, &pending.nonce).await?;
    let user_id = claims.user_id().ok_or(PortalError::MissingIdentity)?;
    portal_event(
        tracing::Level::INFO,
        ObservabilityEvent {
            event: "portal.login",
            component: "portal.oidc",
            user_id: Some(&user_id),
            status: Some("ok"),
            ..Default::default()
        },
    );
    state
        .sessions
        .update(&handle.id, |session| {
            session.user_id = Some(user_id);
            session.display_name = claims.name.clone();
            session.id_token = Some(id_token);
        })
        .await;
    Ok(state
        .sessions
        .attach(&handle, Redirect::to("/").into_response())
        .await)
}

async fn logout(State(state): State<PortalState>, headers: HeaderMap) -> Response {
    let removed = match session_id_from_headers(&headers) {
        Some(id) => state.sessions.remove(&id).await,
        None => None,
    };
    if let Some(user) = removed.as_ref().and_then(|s| s.user_id.as_deref()) {
        tracing::info!("portal sign-out user={}", user);
    }

    let mut location = "/".to_string();
    if let Some(oidc) = state.oidc.as_ref() {
        match oidc.metadata().await {
            Ok(meta) => {
                let hint = removed.as_ref().and_then(|s| s.id_token.as_deref());
                if let Some(url) = oidc.end_session_url(&meta, hint) {
                    location = url.to_string();
                }
            }
            Err(err) => tracing::warn!("skipping provider sign-out: {}", err),
        }
    }

    let mut response = Redirect::to(&location).into_response();
    if let Ok(value) = HeaderValue::from_str(&state.sessions.expired_cookie_value()) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::header::{COOKIE, LOCATION};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::oidc::{OidcConfig, DEFAULT_SCOPES};
    use crate::redirect::VdiConfig;
    use crate::PortalConfig;

    // Nothing listens on the discard port, so queue calls fail fast.
    const DEAD_QUEUE: &str = "http://127.0.0.1:9/api";

    fn test_state(oidc: bool) -> PortalState {
        let oidc = oidc.then(|| OidcConfig {
            issuer: "http://127.0.0.1:9/issuer".to_string(),
            client_id: "portal".to_string(),
            client_secret: None,
            redirect_url: "http://127.0.0.1:5001/auth/callback".to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            post_logout_redirect_url: "http://127.0.0.1:5001/".to_string(),
        });
        PortalState::from_config(PortalConfig {
            queue_url: DEAD_QUEUE.to_string(),
            oidc,
            vdi: VdiConfig {
                web_client_url: Some("https://vdi.example.com/".to_string()),
                ..VdiConfig::default()
            },
            ..PortalConfig::default()
        })
        .expect("state")
    }

    async fn body_text(resp: Response) -> String {
        let body = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(body.to_vec()).expect("utf8")
    }

    fn session_cookie(resp: &Response) -> String {
        resp.headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .expect("session cookie")
            .to_string()
    }

    fn location(resp: &Response) -> &str {
        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location")
    }

    #[tokio::test]
    async fn index_renders_catalog_without_storing_a_session() {
        let state = test_state(false);
        let app = app_router(state.clone());
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(SET_COOKIE).is_none());
        assert_eq!(state.sessions.session_count().await, 0);
        let html = body_text(resp).await;
        assert!(html.contains("Acme Corp (Firewall A)"));
        assert!(html.contains("operator@example.com"));
    }

    #[tokio::test]
    async fn unknown_target_is_404() {
        let state = test_state(false);
        let app = app_router(state.clone());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/connect/cust_404")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(resp).await, "Target not found");
        assert_eq!(state.sessions.session_count().await, 0);
    }

    #[tokio::test]
    async fn unreachable_queue_records_failure_and_stays_on_portal() {
        let state = test_state(false);
        let app = app_router(state.clone());
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/connect/cust_1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/");
        let cookie = session_cookie(&resp);
        assert!(cookie.starts_with("handoff_session="));

        let rows = state.history.for_user("operator@example.com").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "FAILED");

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert!(resp.headers().get(SET_COOKIE).is_none());
        assert!(body_text(resp).await.contains("Failed to reach queue API"));

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reset")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(state.history.for_user("operator@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn sign_in_required_redirects_anonymous_users() {
        let app = app_router(test_state(true));
        for (method, uri) in [("GET", "/"), ("POST", "/connect/cust_1")] {
            let resp = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("response");
            assert_eq!(resp.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&resp), "/login");
        }
    }

    #[tokio::test]
    async fn anonymous_reset_is_sent_to_login() {
        let state = test_state(true);
        state
            .history
            .record("alice@example.com", "Acme", "SENT (201 OK)".to_string())
            .await;
        let resp = app_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reset")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login");
        assert_eq!(state.history.for_user("alice@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn callback_without_pending_login_is_rejected() {
        let app = app_router(test_state(true));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/auth/callback?code=abc&state=forged")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_expires_cookie() {
        let app = app_router(test_state(false));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/logout")
                    .header(COOKIE, "handoff_session=abc")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(location(&resp), "/");
        let cookie = resp
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("cookie");
        assert!(cookie.contains("Max-Age=0"));
    }
}
