// Recognition link against a scripted backend

mod common;

use common::{link_config, refused_port, speech_chunk, spawn_backend, Script};
use funasr_bridge::{BridgeError, LinkEvent, RecognitionLink};
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a link event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_connect_refused() {
    let link = RecognitionLink::new("alice", link_config(refused_port().await));
    let mut events = link.take_events().await.unwrap();

    let result = link.connect().await;

    assert!(matches!(result, Err(BridgeError::BackendUnavailable(_))));
    assert!(!link.is_connected());
    assert!(matches!(next_event(&mut events).await, LinkEvent::Error(_)));
}

#[tokio::test]
async fn test_events_taken_once() {
    let link = RecognitionLink::new("alice", link_config(refused_port().await));

    assert!(link.take_events().await.is_some());
    assert!(link.take_events().await.is_none());
}

#[tokio::test]
async fn test_handshake_fields() {
    let mut backend = spawn_backend(Script::Reply(vec![])).await;
    let link = RecognitionLink::new("alice", backend.link_config());

    link.connect().await.unwrap();
    assert!(link.is_connected());
    link.start_session("session_alice").await.unwrap();

    let handshake = backend.next_json().await;
    assert_eq!(handshake["mode"], "2pass");
    assert_eq!(handshake["chunk_size"], serde_json::json!([5, 10, 5]));
    assert_eq!(handshake["chunk_interval"], 10);
    assert_eq!(handshake["wav_name"], "session_alice");
    assert_eq!(handshake["is_speaking"], true);
    assert_eq!(handshake["hotwords"], "");
    assert_eq!(handshake["itn"], true);
    assert_eq!(handshake["audio_fs"], 16000);

    link.disconnect().await;
}

#[tokio::test]
async fn test_start_session_connects_on_demand() {
    let mut backend = spawn_backend(Script::Reply(vec![])).await;
    let link = RecognitionLink::new("alice", backend.link_config());

    link.start_session("session_alice").await.unwrap();

    assert!(link.is_connected());
    assert_eq!(backend.next_json().await["wav_name"], "session_alice");
}

#[tokio::test]
async fn test_audio_forwarded_verbatim() {
    let mut backend = spawn_backend(Script::Reply(vec![])).await;
    let link = RecognitionLink::new("alice", backend.link_config());
    link.start_session("session_alice").await.unwrap();
    backend.next_json().await;

    let chunk = speech_chunk();
    link.send_audio_chunk(chunk.clone()).await.unwrap();
    link.send_audio_chunk(chunk.clone()).await.unwrap();

    for _ in 0..2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), backend.received.recv())
            .await
            .unwrap()
            .unwrap();
        match frame {
            Message::Binary(data) => assert_eq!(&data[..], &chunk[..]),
            other => panic!("expected a binary frame, got {:?}", other),
        }
    }

    let stats = link.stats();
    assert_eq!(stats.chunks_sent, 2);
    assert_eq!(stats.bytes_sent, 2 * chunk.len() as u64);
}

#[tokio::test]
async fn test_results_in_order_and_empty_dropped() {
    let backend = spawn_backend(Script::Reply(vec![
        r#"{"text":"hel","mode":"2pass-online","wav_name":"session_alice"}"#.to_string(),
        "not json at all".to_string(),
        r#"{"text":"  ","mode":"2pass-online"}"#.to_string(),
        r#"{"text":"hello","mode":"2pass-offline","is_final":true}"#.to_string(),
        r#"{"text":"next"}"#.to_string(),
    ]))
    .await;
    let link = RecognitionLink::new("alice", backend.link_config());
    let mut events = link.take_events().await.unwrap();
    link.start_session("session_alice").await.unwrap();

    let mut results = Vec::new();
    for _ in 0..3 {
        match next_event(&mut events).await {
            LinkEvent::Result(result) => results.push(result),
            other => panic!("unexpected event {:?}", other),
        }
    }

    let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["hel", "hello", "next"]);
    assert_eq!(results[0].wav_name, "session_alice");
    assert!(results[1].is_final_two_pass());
    assert!(results[1].is_final);
    // Missing mode falls back to the configured one
    assert_eq!(results[2].mode, "2pass");

    let stats = link.stats();
    assert_eq!(stats.results_received, 3);
    assert_eq!(stats.results_dropped, 1);
}

#[tokio::test]
async fn test_backend_close_emits_closed() {
    let backend = spawn_backend(Script::CloseAfterHandshake).await;
    let link = RecognitionLink::new("alice", backend.link_config());
    let mut events = link.take_events().await.unwrap();
    link.start_session("session_alice").await.unwrap();

    assert_eq!(next_event(&mut events).await, LinkEvent::Closed);
    assert!(!link.is_connected());
    assert!(matches!(
        link.send_audio_chunk(speech_chunk()).await,
        Err(BridgeError::NotConnected)
    ));
}

#[tokio::test]
async fn test_end_stream_marker() {
    let mut backend = spawn_backend(Script::Reply(vec![])).await;
    let link = RecognitionLink::new("alice", backend.link_config());
    link.start_session("session_alice").await.unwrap();
    backend.next_json().await;

    link.end_stream().await;

    assert_eq!(backend.next_json().await, serde_json::json!({"is_speaking": false}));
}

#[tokio::test]
async fn test_disconnect_idempotent() {
    let backend = spawn_backend(Script::Reply(vec![])).await;
    let link = RecognitionLink::new("alice", backend.link_config());
    link.start_session("session_alice").await.unwrap();

    link.disconnect().await;
    link.disconnect().await;

    assert!(!link.is_connected());
    assert!(matches!(
        link.send_audio_chunk(speech_chunk()).await,
        Err(BridgeError::NotConnected)
    ));
    // No-op once disconnected
    link.end_stream().await;
    assert_eq!(link.stats().chunks_sent, 0);
}

#[tokio::test]
async fn test_send_before_connect() {
    let link = RecognitionLink::new("alice", link_config(refused_port().await));

    assert!(matches!(
        link.send_audio_chunk(speech_chunk()).await,
        Err(BridgeError::NotConnected)
    ));
}

#[tokio::test]
async fn test_transport_error_emits_error() {
    let backend = spawn_backend(Script::ProtocolGarbage).await;
    let link = RecognitionLink::new("alice", backend.link_config());
    let mut events = link.take_events().await.unwrap();
    link.start_session("session_alice").await.unwrap();

    match next_event(&mut events).await {
        LinkEvent::Error(message) => assert!(message.contains("Failed to receive results"), "{message}"),
        other => panic!("expected an error event, got {:?}", other),
    }
    assert!(!link.is_connected());
    assert!(matches!(
        link.send_audio_chunk(speech_chunk()).await,
        Err(BridgeError::NotConnected)
    ));
}
