//! # Phone Matcher Pipeline
//!
//! Streaming ingestion of admin uploads and anti-join matching of client
//! uploads against the phone registry.
//!
//! ## Pipeline
//!
//! ```text
//! RowStream (admin)                      RowStream (client)
//!     │                                      │
//!     ├──> phone column → normalize          ├──> RowClassifier → (phone, tag)
//!     │                                      ├──> normalize
//!     ├──> buffer (ingest threshold)         ├──> TagMap chunk (match threshold)
//!     │                                      │
//!     └──> Registry::upsert_batch            ├──> Registry::anti_join
//!            └─> IngestReport                └──> UnmatchedSet → MatchReport
//! ```
//!
//! Both pipelines pull one row at a time and hold a storage handle only for
//! the duration of a single flush.
//!
//! ## Example
//!
//! ```no_run
//! use phone_matcher_pipeline::{MatchPipeline, PipelineConfig, VecRowStream};
//! use phone_matcher_registry::MemoryRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(MemoryRegistry::default());
//!     let pipeline = MatchPipeline::new(registry, PipelineConfig::default());
//!     let mut rows = VecRowStream::new(
//!         vec!["state".into(), "phone".into()],
//!         vec![vec!["TX".into(), "2345678901".into()]],
//!     );
//!
//!     let report = pipeline.run(&mut rows).await?;
//!     println!("{} unmatched", report.unmatched());
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod ingest;
mod matcher;
mod rows;
mod stats;

pub use config::{
    PipelineConfig, DEFAULT_INGEST_FLUSH_THRESHOLD, DEFAULT_MATCH_FLUSH_THRESHOLD,
    ENV_INGEST_CHUNK, ENV_MATCH_CHUNK, ENV_UPSERT_CHUNK,
};
pub use error::{PipelineError, Result};
pub use ingest::IngestionPipeline;
pub use matcher::MatchPipeline;
pub use rows::{
    decode_error, phone_column, ChannelRowStream, RawRow, RowSender, RowStream, VecRowStream,
};
pub use stats::{IngestReport, MatchReport};
