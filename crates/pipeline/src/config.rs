use phone_matcher_registry::DEFAULT_UPSERT_CHUNK;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INGEST_FLUSH_THRESHOLD: usize = 50_000;
pub const DEFAULT_MATCH_FLUSH_THRESHOLD: usize = 20_000;
const MAX_CHUNK: usize = 1_000_000;

pub const ENV_INGEST_CHUNK: &str = "PHONE_MATCHER_INGEST_CHUNK";
pub const ENV_UPSERT_CHUNK: &str = "PHONE_MATCHER_UPSERT_CHUNK";
pub const ENV_MATCH_CHUNK: &str = "PHONE_MATCHER_MATCH_CHUNK";

/// Chunking knobs for both pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Canonical phones buffered before an ingestion flush
    pub ingest_flush_threshold: usize,

    /// Rows per registry call inside one ingestion flush
    pub upsert_chunk_size: usize,

    /// Distinct phones buffered before a match flush
    pub match_flush_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest_flush_threshold: DEFAULT_INGEST_FLUSH_THRESHOLD,
            upsert_chunk_size: DEFAULT_UPSERT_CHUNK,
            match_flush_threshold: DEFAULT_MATCH_FLUSH_THRESHOLD,
        }
    }
}

fn parse_chunk(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_CHUNK)
}

impl PipelineConfig {
    /// Overlay `PHONE_MATCHER_*_CHUNK` variables from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup. Blank or unparsable
    /// values keep the current setting.
    #[must_use]
    pub fn with_overrides_from(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            ingest_flush_threshold: parse_chunk(
                lookup(ENV_INGEST_CHUNK).as_deref(),
                self.ingest_flush_threshold,
            ),
            upsert_chunk_size: parse_chunk(
                lookup(ENV_UPSERT_CHUNK).as_deref(),
                self.upsert_chunk_size,
            ),
            match_flush_threshold: parse_chunk(
                lookup(ENV_MATCH_CHUNK).as_deref(),
                self.match_flush_threshold,
            ),
        }
    }

    /// Every knob forced into `1..=1_000_000`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            ingest_flush_threshold: self.ingest_flush_threshold.clamp(1, MAX_CHUNK),
            upsert_chunk_size: self.upsert_chunk_size.clamp(1, MAX_CHUNK),
            match_flush_threshold: self.match_flush_threshold.clamp(1, MAX_CHUNK),
        }
    }
}
