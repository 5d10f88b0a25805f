//! Recognition backend link
//!
//! Speaks the FunASR websocket protocol:
//! - one JSON handshake carrying mode, chunking, hotwords and sample rate
//! - raw binary audio frames
//! - a `{"is_speaking": false}` end marker
//! - JSON result frames coming back, decoded into [`RecognitionResult`]s

pub mod config;
pub mod hotwords;
pub mod link;
pub mod messages;
pub mod stats;
mod tls;

pub use config::{LinkConfig, RecognitionMode};
pub use hotwords::{parse_hotwords, HotwordSource};
pub use link::RecognitionLink;
pub use messages::{
    EndOfSpeech, Handshake, LinkEvent, RecognitionResult, DEFAULT_CONFIDENCE, FINAL_TWO_PASS_MODE,
};
pub use stats::{LinkStats, LinkStatsSnapshot};
