pub mod asr;
pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use asr::{HotwordSource, LinkConfig, LinkEvent, RecognitionLink, RecognitionMode, RecognitionResult};
pub use audio::{is_silence, AudioGate, DEFAULT_SILENCE_THRESHOLD};
pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use http::{create_router, AppState};
pub use session::{ClientHandle, ClientMessage, Session, SessionRegistry, SessionReport, SessionState};
