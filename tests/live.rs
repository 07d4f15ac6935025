use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
};
use futures_util::{SinkExt, StreamExt};
use gps_tracker_lib::{alerts::LogNotifier, build_router, config::Config, AppState};
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (AppState, SocketAddr) {
    let state = AppState::new(Config::default(), Arc::new(LogNotifier));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (state, addr)
}

async fn next_event(client: &mut Client) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no frame within 5s")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_streams_snapshots_and_unsubscribes_on_close() {
    let (state, addr) = start_server().await;
    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let first = next_event(&mut client).await;
    assert_eq!(first["event"], json!("newData"));
    assert_eq!(first["data"]["raw"], json!("No data received yet"));
    assert_eq!(first["data"]["values"], json!({}));
    assert_eq!(state.tracker().hub().subscriber_count(), 1);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/data")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"deviceId": "esp32", "lat": 42.5}).to_string()))
        .unwrap();
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let next = next_event(&mut client).await;
    assert_eq!(next["event"], json!("newData"));
    assert_eq!(next["data"]["values"], json!({"deviceId": "esp32", "lat": 42.5}));

    client.close(None).await.unwrap();

    let mut remaining = state.tracker().hub().subscriber_count();
    for _ in 0..100 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = state.tracker().hub().subscriber_count();
    }
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn late_joiner_gets_current_snapshot_first() {
    let (state, addr) = start_server().await;
    state
        .tracker()
        .ingest(gps_tracker_lib::telemetry::TelemetryReport::from_json(br#"{"isMoving": true}"#).unwrap())
        .await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let first = next_event(&mut client).await;
    assert_eq!(first["data"]["values"], json!({"isMoving": true}));

    client.send(Message::Text("hello".into())).await.unwrap();
    client.close(None).await.unwrap();
}
