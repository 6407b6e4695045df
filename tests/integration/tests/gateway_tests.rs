//! Gateway Client Integration Tests
//!
//! Every test runs a mock gateway in-process and drives the real client
//! against it over loopback. No external services are required.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use gateway_client::{
    ClientConfig, ConnectionState, GatewayClient, GatewayEvent, OpCode, SessionRecord,
    SessionStore,
};
use integration_tests::{
    next_event, start_discovery, wait_for, wait_until, FrameDeflater, MockGateway,
};
use serde_json::json;
use tokio::time::Instant;

fn config_for(gateway: &MockGateway) -> ClientConfig {
    ClientConfig::new("test-token").with_gateway_url(gateway.url())
}

// ============================================================================
// Connect / Identify / Ready
// ============================================================================

#[tokio::test]
async fn test_identifies_and_becomes_ready() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = GatewayClient::new(config_for(&gateway)).unwrap();

    // No persisted session, so the client reports up front that it cannot
    // resume, before the first connection.
    let event = next_event(&mut events).await.unwrap();
    assert!(matches!(
        event,
        GatewayEvent::ResumeError {
            disconnect_time: None
        }
    ));

    let mut conn = gateway.next_connection().await.unwrap();
    let event = next_event(&mut events).await.unwrap();
    assert!(matches!(event, GatewayEvent::Connect));
    assert!(client.is_connected());
    assert!(!client.is_authenticated());

    conn.hello(60_000).await.unwrap();
    let identify = conn.recv_op(2).await.unwrap();
    assert_eq!(identify["d"]["token"], "test-token");
    assert_eq!(identify["d"]["compress"], true);
    assert_eq!(identify["d"]["large_threshold"], 250);
    assert!(identify["d"].get("shard").is_none());
    // All event categories except the two privileged ones.
    assert_eq!(identify["d"]["intents"], 65_277);

    conn.ready("sess-1", 1).await.unwrap();

    // Every envelope is mirrored raw; Hello arrived before READY.
    let raw = wait_for(&mut events, |e| {
        matches!(e, GatewayEvent::Raw { message } if message.op == OpCode::Hello)
    })
    .await
    .unwrap();
    assert!(matches!(raw, GatewayEvent::Raw { .. }));

    let event = wait_for(&mut events, |e| {
        matches!(e, GatewayEvent::Event { event_type, .. } if event_type == "READY")
    })
    .await
    .unwrap();
    let GatewayEvent::Event { payload, .. } = event else {
        unreachable!()
    };
    assert_eq!(payload["session_id"], "sess-1");

    wait_until(|| client.is_authenticated()).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_identify_carries_shard_assignment() {
    let mut gateway = MockGateway::start().await.unwrap();
    let config = config_for(&gateway).with_shard(1, 2);
    let (_client, _events) = GatewayClient::new(config).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();

    let identify = conn.recv_op(2).await.unwrap();
    assert_eq!(identify["d"]["shard"], json!([1, 2]));
}

#[tokio::test]
async fn test_discovers_gateway_over_rest() {
    let mut gateway = MockGateway::start().await.unwrap();
    let api_url = start_discovery(gateway.url()).await.unwrap();

    let config = ClientConfig::new("test-token").with_api_url(api_url);
    let (_client, _events) = GatewayClient::new(config).unwrap();

    // The client found the address via GET /gateway and connected to it.
    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();
}

// ============================================================================
// Heartbeats
// ============================================================================

#[tokio::test]
async fn test_heartbeats_on_hello_cadence_with_latest_seq() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (_client, _events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    let hello_at = Instant::now();
    conn.hello(200).await.unwrap();
    conn.recv_op(2).await.unwrap();

    conn.dispatch("MESSAGE_CREATE", 5, json!({})).await.unwrap();

    let first = conn.recv_op(1).await.unwrap();
    assert!(hello_at.elapsed() >= Duration::from_millis(190));
    assert_eq!(first["d"], 5);

    // A lower sequence number never regresses the acknowledged position.
    conn.dispatch("TYPING_START", 3, json!({})).await.unwrap();

    let second = conn.recv_op(1).await.unwrap();
    assert!(hello_at.elapsed() >= Duration::from_millis(390));
    assert_eq!(second["d"], 5);
}

#[tokio::test]
async fn test_heartbeat_ack_updates_ping() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(200).await.unwrap();
    conn.recv_op(2).await.unwrap();
    assert!(client.ping().is_none());

    conn.recv_op(1).await.unwrap();
    conn.send_json(&json!({"op": 11})).await.unwrap();

    wait_until(|| client.ping().is_some()).await.unwrap();
}

#[tokio::test]
async fn test_server_requested_heartbeat_is_immediate() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (_client, _events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();

    // Out-of-cadence request, long before the first scheduled beat.
    conn.send_json(&json!({"op": 1})).await.unwrap();

    let beat = conn.recv_op(1).await.unwrap();
    assert!(beat["d"].is_null());
}

// ============================================================================
// Session resume
// ============================================================================

#[tokio::test]
async fn test_resumes_after_server_close() {
    let dir = tempfile::tempdir().unwrap();
    let mut gateway = MockGateway::start().await.unwrap();
    let config = config_for(&gateway)
        .resumable()
        .with_state_path(dir.path().join("state.json"));
    let (client, mut events) = GatewayClient::new(config).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.ready("sess-r", 7).await.unwrap();
    wait_until(|| client.is_authenticated()).await.unwrap();

    conn.close().await.unwrap();

    let event = wait_for(&mut events, |e| matches!(e, GatewayEvent::Disconnect { .. }))
        .await
        .unwrap();
    assert!(matches!(event, GatewayEvent::Disconnect { code: Some(1001) }));

    // The client reconnects on its own and resumes the saved session.
    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();

    let resume = conn.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["token"], "test-token");
    assert_eq!(resume["d"]["session_id"], "sess-r");
    assert_eq!(resume["d"]["seq"], 7);

    conn.dispatch("RESUMED", 8, json!({})).await.unwrap();
    wait_until(|| client.is_authenticated()).await.unwrap();
}

#[tokio::test]
async fn test_resumes_from_state_persisted_by_previous_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    SessionStore::new(&path, None)
        .save(&SessionRecord {
            session: Some("sess-p".to_string()),
            seq: Some(42),
            disconnect_time: Some(1_700_000_000_000),
        })
        .await;

    let mut gateway = MockGateway::start().await.unwrap();
    let config = config_for(&gateway).resumable().with_state_path(path);
    let (_client, mut events) = GatewayClient::new(config).unwrap();

    // A usable record means no proactive resume error; Connect comes first.
    let event = next_event(&mut events).await.unwrap();
    assert!(matches!(event, GatewayEvent::Connect));

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();

    let resume = conn.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["session_id"], "sess-p");
    assert_eq!(resume["d"]["seq"], 42);
}

#[tokio::test]
async fn test_unresumable_invalid_session_reidentifies() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.ready("sess-i", 3).await.unwrap();
    wait_until(|| client.is_authenticated()).await.unwrap();

    conn.send_json(&json!({"op": 9, "d": false})).await.unwrap();

    let event = wait_for(&mut events, |e| {
        matches!(e, GatewayEvent::ResumeError { .. })
    })
    .await
    .unwrap();
    assert!(matches!(event, GatewayEvent::ResumeError { .. }));

    // The discarded session cannot drive a Resume; a fresh Identify follows
    // on the same connection.
    let identify = conn.recv_op(2).await.unwrap();
    assert_eq!(identify["d"]["token"], "test-token");
}

#[tokio::test]
async fn test_resumable_invalid_session_resumes_in_band() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.ready("sess-v", 9).await.unwrap();
    wait_until(|| client.is_authenticated()).await.unwrap();

    conn.send_json(&json!({"op": 9, "d": true})).await.unwrap();

    let resume = conn.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["session_id"], "sess-v");
    assert_eq!(resume["d"]["seq"], 9);
}

// ============================================================================
// Reconnection control
// ============================================================================

#[tokio::test]
async fn test_server_reconnect_request_reconnects() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (_client, mut events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();

    conn.send_json(&json!({"op": 7})).await.unwrap();

    let event = wait_for(&mut events, |e| matches!(e, GatewayEvent::Disconnect { .. }))
        .await
        .unwrap();
    assert!(matches!(event, GatewayEvent::Disconnect { code: None }));

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();
}

#[tokio::test]
async fn test_disconnect_stops_reconnection_until_connect() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();

    client.disconnect();

    wait_for(&mut events, |e| matches!(e, GatewayEvent::Disconnect { .. }))
        .await
        .unwrap();
    gateway
        .assert_no_connection(Duration::from_millis(400))
        .await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect();

    gateway.next_connection().await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, GatewayEvent::Connect))
        .await
        .unwrap();
    assert!(matches!(event, GatewayEvent::Connect));
}

// ============================================================================
// Large-collection reassembly
// ============================================================================

#[tokio::test]
async fn test_large_creation_is_reassembled_from_chunks() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.ready("sess-g", 1).await.unwrap();
    wait_until(|| client.is_authenticated()).await.unwrap();

    conn.dispatch(
        "GUILD_CREATE",
        2,
        json!({"id": "g1", "name": "big", "large": true, "member_count": 3}),
    )
    .await
    .unwrap();

    // The creation event is held back while members are requested.
    let request = conn.recv_op(8).await.unwrap();
    assert_eq!(request["d"]["guild_id"], "g1");
    assert_eq!(request["d"]["query"], "");
    assert_eq!(request["d"]["limit"], 0);

    conn.dispatch(
        "GUILD_MEMBERS_CHUNK",
        3,
        json!({"guild_id": "g1", "members": [{"id": 1}, {"id": 2}]}),
    )
    .await
    .unwrap();
    conn.dispatch(
        "GUILD_MEMBERS_CHUNK",
        4,
        json!({"guild_id": "g1", "members": [{"id": 3}]}),
    )
    .await
    .unwrap();

    // Exactly one creation event comes out, carrying all three members.
    let event = wait_for(&mut events, |e| {
        matches!(e, GatewayEvent::Event { event_type, .. } if event_type == "GUILD_CREATE")
    })
    .await
    .unwrap();
    let GatewayEvent::Event { payload, .. } = event else {
        unreachable!()
    };
    assert_eq!(payload["name"], "big");
    assert_eq!(payload["members"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_reassembly_disabled_passes_events_through() {
    let mut gateway = MockGateway::start().await.unwrap();
    let config = config_for(&gateway).without_member_reassembly();
    let (_client, mut events) = GatewayClient::new(config).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();

    conn.dispatch(
        "GUILD_CREATE",
        2,
        json!({"id": "g1", "large": true, "member_count": 3}),
    )
    .await
    .unwrap();

    // Emitted as-is; no member request goes out.
    let event = wait_for(&mut events, |e| {
        matches!(e, GatewayEvent::Event { event_type, .. } if event_type == "GUILD_CREATE")
    })
    .await
    .unwrap();
    let GatewayEvent::Event { payload, .. } = event else {
        unreachable!()
    };
    assert!(payload.get("members").is_none());

    conn.assert_silent(Duration::from_millis(300)).await;
}

// ============================================================================
// Compressed transport
// ============================================================================

#[tokio::test]
async fn test_compressed_frames_split_across_messages() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (_client, mut events) = GatewayClient::new(config_for(&gateway)).unwrap();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.hello(60_000).await.unwrap();
    conn.recv_op(2).await.unwrap();

    let mut deflater = FrameDeflater::new();
    let frame = deflater.frame(&json!({
        "op": 0, "t": "MESSAGE_CREATE", "s": 2, "d": {"content": "hi"}
    }));

    // Deliver the frame in two arbitrary pieces.
    let (head, tail) = frame.split_at(frame.len() / 2);
    conn.send_binary(head.to_vec()).await.unwrap();
    conn.send_binary(tail.to_vec()).await.unwrap();

    let event = wait_for(&mut events, |e| {
        matches!(e, GatewayEvent::Event { event_type, .. } if event_type == "MESSAGE_CREATE")
    })
    .await
    .unwrap();
    let GatewayEvent::Event { payload, .. } = event else {
        unreachable!()
    };
    assert_eq!(payload["content"], "hi");

    // The deflate context is shared across frames on the connection.
    let frame = deflater.frame(&json!({
        "op": 0, "t": "MESSAGE_CREATE", "s": 3, "d": {"content": "again"}
    }));
    conn.send_binary(frame).await.unwrap();

    let event = wait_for(&mut events, |e| {
        matches!(e, GatewayEvent::Event { event_type, .. } if event_type == "MESSAGE_CREATE")
    })
    .await
    .unwrap();
    let GatewayEvent::Event { payload, .. } = event else {
        unreachable!()
    };
    assert_eq!(payload["content"], "again");
}
