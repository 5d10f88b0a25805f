// Hotword resolution: file, literal and missing-file fallback

mod common;

use common::{spawn_backend, Script};
use funasr_bridge::{HotwordSource, LinkConfig, RecognitionLink};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

fn link_with(hotwords: HotwordSource) -> RecognitionLink {
    let config = LinkConfig {
        hotwords,
        ..LinkConfig::default()
    };
    RecognitionLink::new("hotword-client", config)
}

#[test]
fn test_hotword_file_resolves_to_weight_table() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "hello 10\nworld 5").unwrap();

    let link = link_with(HotwordSource::File(file.path().to_path_buf()));
    let table: HashMap<String, i64> = serde_json::from_str(link.hotwords()).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table["hello"], 10);
    assert_eq!(table["world"], 5);
}

#[test]
fn test_missing_hotword_file_falls_back_to_empty() {
    let link = link_with(HotwordSource::File("/nonexistent/hotwords.txt".into()));
    assert_eq!(link.hotwords(), "");
}

#[test]
fn test_literal_hotwords_pass_through() {
    let link = link_with(HotwordSource::Literal("阿里巴巴 达摩院".to_string()));
    assert_eq!(link.hotwords(), "阿里巴巴 达摩院");
}

#[test]
fn test_no_hotwords() {
    let link = link_with(HotwordSource::None);
    assert_eq!(link.hotwords(), "");
}

#[test]
fn test_configured_string_is_classified() {
    let config: LinkConfig = serde_json::from_str(r#"{"hotwords": "conf/hotwords.txt"}"#).unwrap();
    assert_eq!(config.hotwords, HotwordSource::File("conf/hotwords.txt".into()));

    let config: LinkConfig = serde_json::from_str(r#"{"hotwords": "alpha beta"}"#).unwrap();
    assert_eq!(config.hotwords, HotwordSource::Literal("alpha beta".to_string()));
}

#[tokio::test]
async fn test_handshake_carries_hotword_table() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "hello 10\nworld 5").unwrap();

    let mut backend = spawn_backend(Script::Reply(Vec::new())).await;
    let config = LinkConfig {
        hotwords: HotwordSource::File(file.path().to_path_buf()),
        ..backend.link_config()
    };
    let link = RecognitionLink::new("hotword-client", config);

    link.start_session("session_hotword-client").await.unwrap();

    let handshake = backend.next_json().await;
    let hotwords: HashMap<String, i64> =
        serde_json::from_str(handshake["hotwords"].as_str().unwrap()).unwrap();
    assert_eq!(hotwords, HashMap::from([("hello".to_string(), 10), ("world".to_string(), 5)]));

    link.disconnect().await;
}

#[tokio::test]
async fn test_handshake_with_missing_file_sends_empty_hotwords() {
    let mut backend = spawn_backend(Script::Reply(Vec::new())).await;
    let config = LinkConfig {
        hotwords: HotwordSource::File("/nonexistent/hotwords.txt".into()),
        ..backend.link_config()
    };
    let link = RecognitionLink::new("hotword-client", config);

    link.start_session("session_hotword-client").await.unwrap();

    let handshake = backend.next_json().await;
    assert_eq!(handshake["hotwords"], "");

    link.disconnect().await;
}
