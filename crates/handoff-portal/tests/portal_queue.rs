use std::sync::Arc;

use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::Request;
use handoff_core::{ConnectionStore, MemoryConnectionStore};
use handoff_portal::{app_router, PortalConfig, PortalState, Target, VdiConfig};
use handoff_server::QueueState;
use tower::ServiceExt;

async fn spawn_queue(state: QueueState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, handoff_server::app_router(state))
            .await
            .unwrap();
    });
    format!("http://{addr}/api")
}

fn lab_target() -> Target {
    Target {
        id: "lab".to_string(),
        name: "Lab VM".to_string(),
        ip: "20.0.0.22".to_string(),
        user: "cp1".to_string(),
        password: Some("lab-pw".to_string()),
    }
}

fn connect_request(target: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/connect/{target}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_connect_queues_request_for_default_user() {
    let store = Arc::new(MemoryConnectionStore::new());
    let queue_url = spawn_queue(QueueState::new(store.clone())).await;
    let state = PortalState::from_config(PortalConfig {
        queue_url,
        catalog: vec![lab_target()],
        default_user: "Ops@Example.com".to_string(),
        ..PortalConfig::default()
    })
    .unwrap();
    let app = app_router(state.clone());

    let resp = app.oneshot(connect_request("lab")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 303);
    assert_eq!(resp.headers().get(LOCATION).unwrap(), "/");

    let history = state.history.for_user("ops@example.com").await;
    assert_eq!(history[0].status, "SENT (201 OK)");
    assert_eq!(history[0].target_name, "Lab VM");

    let record = store
        .take_pending("ops@example.com", handoff_core::now_ms())
        .await
        .unwrap()
        .expect("queued record");
    assert_eq!(record.target_ip.as_deref(), Some("20.0.0.22"));
    assert_eq!(record.username.as_deref(), Some("cp1"));
    assert_eq!(record.password.as_deref(), Some("lab-pw"));
    assert_eq!(record.target_name.as_deref(), Some("Lab VM"));
}

#[tokio::test]
async fn test_accepted_request_redirects_to_vdi() {
    let store = Arc::new(MemoryConnectionStore::new());
    let queue_url = spawn_queue(QueueState::new(store)).await;
    let state = PortalState::from_config(PortalConfig {
        queue_url,
        vdi: VdiConfig {
            workspace_id: Some("ws-1".to_string()),
            resource_id: Some("res-1".to_string()),
            ..VdiConfig::default()
        },
        ..PortalConfig::default()
    })
    .unwrap();

    let resp = app_router(state).oneshot(connect_request("cust_1")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 303);
    assert_eq!(
        resp.headers().get(LOCATION).unwrap(),
        "ms-avd:connect?workspaceid=ws-1&resourceid=res-1&username=operator%40example.com&version=0"
    );
}

#[tokio::test]
async fn test_rejected_request_is_recorded_with_status() {
    let store = Arc::new(MemoryConnectionStore::new());
    let queue_url =
        spawn_queue(QueueState::new(store).with_api_token(Some("queue-secret".to_string()))).await;
    let state = PortalState::from_config(PortalConfig {
        queue_url,
        vdi: VdiConfig {
            web_client_url: Some("https://vdi.example.com/".to_string()),
            ..VdiConfig::default()
        },
        ..PortalConfig::default()
    })
    .unwrap();

    let resp = app_router(state.clone())
        .oneshot(connect_request("cust_2"))
        .await
        .unwrap();
    assert_eq!(resp.headers().get(LOCATION).unwrap(), "/");
    let history = state.history.for_user("operator@example.com").await;
    assert_eq!(history[0].status, "ERROR (401)");
}
