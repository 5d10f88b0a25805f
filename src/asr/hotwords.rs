use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where the hotword payload for the handshake comes from
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum HotwordSource {
    /// No hotwords
    #[default]
    None,
    /// Payload sent verbatim
    Literal(String),
    /// Two-column `phrase weight` file
    File(PathBuf),
}

impl From<String> for HotwordSource {
    /// Classify a configured value: blank is `None`, anything that looks like a
    /// path (`.txt` suffix or a `/`) is a file, the rest is a literal payload.
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            HotwordSource::None
        } else if trimmed.ends_with(".txt") || trimmed.contains('/') {
            HotwordSource::File(PathBuf::from(trimmed))
        } else {
            HotwordSource::Literal(value)
        }
    }
}

impl From<&str> for HotwordSource {
    fn from(value: &str) -> Self {
        HotwordSource::from(value.to_string())
    }
}

impl HotwordSource {
    /// Resolve to the string carried in the handshake's `hotwords` field.
    ///
    /// Never fails: an unreadable file degrades to an empty payload.
    pub fn resolve(&self) -> String {
        match self {
            HotwordSource::None => String::new(),
            HotwordSource::Literal(text) => text.clone(),
            HotwordSource::File(path) => resolve_file(path),
        }
    }
}

fn resolve_file(path: &Path) -> String {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Hotword file {} unavailable, continuing without hotwords: {}", path.display(), e);
            return String::new();
        }
    };

    let table = parse_hotwords(&contents);
    debug!("Loaded {} hotwords from {}", table.len(), path.display());

    match serde_json::to_string(&table) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode hotwords from {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// Parse `phrase weight` lines into a phrase → weight table.
///
/// The last whitespace-separated token is the weight; everything before it
/// is the phrase. Lines without a phrase or with a non-integer weight are skipped.
pub fn parse_hotwords(contents: &str) -> BTreeMap<String, i64> {
    let mut table = BTreeMap::new();

    for line in contents.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((weight, phrase)) = words.split_last() else {
            continue;
        };
        if phrase.is_empty() {
            continue;
        }
        match weight.parse::<i64>() {
            Ok(weight) => {
                table.insert(phrase.join(" "), weight);
            }
            Err(_) => debug!("Skipping hotword line with invalid weight: {:?}", line),
        }
    }

    table
}
