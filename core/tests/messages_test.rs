//! Message channel client tests against stub bus backends.

mod support;

use axum::extract::Json;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use plexus_core::config::ChannelConfig;
use plexus_core::messages::{MessageChannelClient, OutgoingMessage, Recipient};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use support::serve;

#[derive(Clone, Default)]
struct BusState {
    sent: Arc<Mutex<Vec<Value>>>,
    read_batches: Arc<Mutex<Vec<Value>>>,
}

fn bus_app(state: BusState, messages_body: Value, send_status: StatusCode) -> Router {
    let fetch_body = messages_body.clone();
    let send_state = state.clone();
    let read_state = state.clone();

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/corpus-callosum/messages",
            get(move || {
                let body = fetch_body.clone();
                async move { Json(body) }
            })
            .post(move |Json(payload): Json<Value>| {
                let sent = send_state.sent.clone();
                async move {
                    sent.lock().unwrap().push(payload);
                    send_status
                }
            }),
        )
        .route(
            "/corpus-callosum/messages/read",
            post(move |Json(payload): Json<Value>| {
                let batches = read_state.read_batches.clone();
                async move {
                    batches.lock().unwrap().push(payload);
                    StatusCode::OK
                }
            }),
        )
}

fn client_for(base_url: String) -> MessageChannelClient {
    MessageChannelClient::new(ChannelConfig {
        base_url,
        local_agent: "deck".to_string(),
        default_channel: "general".to_string(),
        lobes: vec![
            ("deck".to_string(), "central".to_string()),
            ("planner".to_string(), "frontal".to_string()),
        ],
        ..ChannelConfig::default()
    })
}

#[tokio::test]
async fn fetch_sorts_wrapped_messages_by_timestamp() {
    let body = json!({
        "messages": [
            {"id": "m3", "from_lobe": "frontal", "message": "third",
             "timestamp": "2026-08-07T10:03:00Z"},
            {"id": "m1", "from_lobe": "frontal", "message": "first",
             "timestamp": "2026-08-07T10:01:00Z"},
            {"id": "m2", "from_lobe": "frontal", "message": "second",
             "timestamp": "2026-08-07T10:02:00Z"},
        ]
    });
    let base = serve(bus_app(BusState::default(), body, StatusCode::OK)).await;
    let client = client_for(base);

    let messages = client.fetch_messages("general", 20, false).await;
    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn fetch_accepts_bare_list_shape() {
    let body = json!([
        {"id": "a", "from_lobe": "frontal", "message": "hi",
         "timestamp": "2026-08-07T09:00:00Z"},
    ]);
    let base = serve(bus_app(BusState::default(), body, StatusCode::OK)).await;
    let client = client_for(base);

    let messages = client.fetch_messages("general", 20, false).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "a");
}

#[tokio::test]
async fn fetch_maps_wire_lobes_to_internal_ids() {
    let body = json!({
        "messages": [
            {"id": "m1", "from_lobe": "frontal", "to_lobe": "central",
             "message": "direct", "timestamp": "2026-08-07T09:00:00Z"},
            {"id": "m2", "from_lobe": "frontal", "to_lobe": "all",
             "message": "broadcast", "timestamp": "2026-08-07T09:01:00Z"},
        ]
    });
    let base = serve(bus_app(BusState::default(), body, StatusCode::OK)).await;
    let client = client_for(base);

    let messages = client.fetch_messages("general", 20, false).await;
    assert_eq!(messages[0].from_agent, "planner");
    assert_eq!(messages[0].to, Recipient::Agent("deck".to_string()));
    assert_eq!(messages[1].to, Recipient::Broadcast);
}

#[tokio::test]
async fn fetch_defaults_missing_timestamp_and_content() {
    let body = json!({"messages": [{"id": "m1", "from_lobe": "frontal"}]});
    let base = serve(bus_app(BusState::default(), body, StatusCode::OK)).await;
    let client = client_for(base);

    let messages = client.fetch_messages("general", 20, false).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "");
    assert_eq!(messages[0].channel, "general");
}

#[tokio::test]
async fn fetch_failure_yields_empty_sequence() {
    let client = client_for("http://127.0.0.1:1".to_string());
    let messages = client.fetch_messages("general", 20, false).await;
    assert!(messages.is_empty());
}

#[tokio::test]
async fn send_applies_internal_to_wire_mapping() {
    let state = BusState::default();
    let base = serve(bus_app(state.clone(), json!({"messages": []}), StatusCode::OK)).await;
    let client = client_for(base);

    let delivered = client
        .send_message(&OutgoingMessage {
            content: "hello".to_string(),
            to_agent: Some("planner".to_string()),
            channel: None,
        })
        .await;
    assert!(delivered);

    let sent = state.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["from_lobe"], "central");
    assert_eq!(sent[0]["to_lobe"], "frontal");
    assert_eq!(sent[0]["message"], "hello");
    assert_eq!(sent[0]["channel"], "general");
}

#[tokio::test]
async fn rejected_send_returns_false_and_leaves_no_trace() {
    let state = BusState::default();
    let base = serve(bus_app(
        state.clone(),
        json!({"messages": []}),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
    .await;
    let client = client_for(base);

    let delivered = client
        .send_message(&OutgoingMessage {
            content: "hello".to_string(),
            ..OutgoingMessage::default()
        })
        .await;
    assert!(!delivered);

    // A re-fetch shows no new entry.
    let messages = client.fetch_messages("general", 20, false).await;
    assert!(messages.is_empty());
}

#[tokio::test]
async fn empty_message_is_rejected_before_any_network_call() {
    let state = BusState::default();
    let base = serve(bus_app(state.clone(), json!({"messages": []}), StatusCode::OK)).await;
    let client = client_for(base);

    let delivered = client
        .send_message(&OutgoingMessage {
            content: "   ".to_string(),
            ..OutgoingMessage::default()
        })
        .await;
    assert!(!delivered);
    assert!(state.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn mark_read_posts_ids_and_empty_batch_is_a_noop() {
    let state = BusState::default();
    let base = serve(bus_app(state.clone(), json!({"messages": []}), StatusCode::OK)).await;
    let client = client_for(base);

    assert!(client.mark_read(&[]).await);
    assert!(state.read_batches.lock().unwrap().is_empty());

    let ids = vec!["m1".to_string(), "m2".to_string()];
    assert!(client.mark_read(&ids).await);
    let batches = state.read_batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["message_ids"], json!(["m1", "m2"]));
}

#[tokio::test]
async fn health_check_reflects_reachability() {
    let base = serve(bus_app(
        BusState::default(),
        json!({"messages": []}),
        StatusCode::OK,
    ))
    .await;
    assert!(client_for(base).check_health().await);
    assert!(!client_for("http://127.0.0.1:1".to_string()).check_health().await);
}
