pub mod gate;

pub use gate::{is_silence, AudioGate, DEFAULT_SILENCE_THRESHOLD, MIN_AUDIBLE_CHUNK_BYTES};
