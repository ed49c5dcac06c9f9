use std::sync::Arc;

use handoff_core::MemoryConnectionStore;
use handoff_server::{app_router, QueueState};
use handoff_types::{ConnectionPayload, QueueConnectionRequest, QueuedConnection};

async fn spawn_queue(state: QueueState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app_router(state)).await.unwrap();
    });
    format!("http://{addr}/api")
}

#[tokio::test]
async fn test_request_is_consumed_over_http() {
    let base = spawn_queue(QueueState::new(Arc::new(MemoryConnectionStore::new()))).await;
    let client = reqwest::Client::new();

    let request = QueueConnectionRequest {
        user_id: Some("ops@example.com".to_string()),
        target_ip: Some("172.16.0.5".to_string()),
        username: Some("readonly".to_string()),
        password: Some("pw".to_string()),
        target_name: Some("Soylent Corp".to_string()),
    };
    let resp = client
        .post(format!("{base}/queue_connection"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let queued: QueuedConnection = resp.json().await.unwrap();
    assert_eq!(queued.message, "Request queued");

    let resp = client
        .get(format!("{base}/fetch_connection"))
        .query(&[("userId", "OPS@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let payload: ConnectionPayload = resp.json().await.unwrap();
    assert_eq!(payload.target_ip.as_deref(), Some("172.16.0.5"));
    assert_eq!(payload.username.as_deref(), Some("readonly"));

    let resp = client
        .get(format!("{base}/fetch_connection"))
        .query(&[("userId", "ops@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn test_expired_request_is_not_delivered() {
    let state = QueueState::new(Arc::new(MemoryConnectionStore::new())).with_ttl_secs(1);
    let base = spawn_queue(state).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/queue_connection"))
        .json(&serde_json::json!({"userId": "u", "targetIp": "10.0.0.1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

    let resp = client
        .get(format!("{base}/fetch_connection?userId=u"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
