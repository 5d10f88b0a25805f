use tracing::debug;

/// Fraction of non-zero bytes below which a chunk counts as silent
pub const DEFAULT_SILENCE_THRESHOLD: f64 = 0.01;

/// Chunks shorter than this are always treated as silent
pub const MIN_AUDIBLE_CHUNK_BYTES: usize = 1000;

/// Per-chunk filter applied before audio reaches the recognition link.
///
/// Processing is a pass-through today; it is the place for noise reduction
/// or level normalization.
#[derive(Debug, Clone)]
pub struct AudioGate {
    /// Expected sample rate of incoming PCM
    pub sample_rate: u32,

    /// Expected channel count of incoming PCM
    pub channels: u16,
}

impl Default for AudioGate {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl AudioGate {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Process one chunk. `None` means "drop this chunk and carry on".
    pub fn process(&self, chunk: Vec<u8>) -> Option<Vec<u8>> {
        if chunk.is_empty() {
            debug!("Dropping empty audio chunk");
            return None;
        }

        debug!(
            "Audio chunk: {} bytes (~{}ms)",
            chunk.len(),
            self.chunk_duration_ms(chunk.len())
        );

        Some(chunk)
    }

    /// See [`is_silence`]
    pub fn is_silence(&self, chunk: &[u8], threshold: f64) -> bool {
        is_silence(chunk, threshold)
    }

    /// Duration of `len` bytes of 16-bit PCM at the configured format
    pub fn chunk_duration_ms(&self, len: usize) -> u64 {
        let bytes_per_second = self.sample_rate as u64 * self.channels.max(1) as u64 * 2;
        if bytes_per_second == 0 {
            return 0;
        }
        len as u64 * 1000 / bytes_per_second
    }
}

/// Rough silence check on raw bytes.
///
/// Approximate by nature: it counts non-zero bytes, not sample energy.
/// Chunks shorter than [`MIN_AUDIBLE_CHUNK_BYTES`] are always silent.
pub fn is_silence(chunk: &[u8], threshold: f64) -> bool {
    if chunk.len() < MIN_AUDIBLE_CHUNK_BYTES {
        return true;
    }

    let non_zero = chunk.iter().filter(|&&byte| byte != 0).count();
    let ratio = non_zero as f64 / chunk.len() as f64;

    ratio < threshold
}
