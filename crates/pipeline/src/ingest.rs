use crate::config::PipelineConfig;
use crate::error::Result;
use crate::rows::{phone_column, RowStream};
use crate::stats::IngestReport;
use phone_matcher_normalizer::NormalizationPolicy;
use phone_matcher_protocol::{CanonicalPhone, OwnerId};
use phone_matcher_registry::{upsert, Registry};
use std::sync::Arc;
use std::time::Instant;

// Buffers are filled lazily; a large threshold must not allocate up front.
const MAX_PREALLOC: usize = 4_096;

/// Streams admin uploads into the registry under one owner.
pub struct IngestionPipeline<R: ?Sized> {
    registry: Arc<R>,
    config: PipelineConfig,
    policy: NormalizationPolicy,
}

impl<R: Registry + ?Sized> IngestionPipeline<R> {
    pub fn new(registry: Arc<R>, config: PipelineConfig) -> Self {
        Self {
            registry,
            config: config.clamped(),
            policy: NormalizationPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: NormalizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drain `stream` into the registry.
    ///
    /// The phone column is picked once, from the first row's headers.
    /// Values that do not normalize are dropped and counted. A failing flush
    /// ends the call; chunks flushed before it stay committed.
    pub async fn run<S: RowStream + ?Sized>(
        &self,
        stream: &mut S,
        owner: &OwnerId,
    ) -> Result<IngestReport> {
        let start = Instant::now();
        let threshold = self.config.ingest_flush_threshold;
        log::info!("Ingesting phones for {owner} (flush every {threshold})");

        let mut report = IngestReport::default();
        let mut column: Option<usize> = None;
        let mut buffer: Vec<CanonicalPhone> = Vec::with_capacity(threshold.min(MAX_PREALLOC));

        while let Some(row) = stream.next_row().await? {
            let idx = *column.get_or_insert_with(|| phone_column(row.headers()));
            let phone = row.get(idx).and_then(|raw| self.policy.normalize(raw));
            report.record(phone.is_some());
            if let Some(phone) = phone {
                buffer.push(phone);
            }
            if buffer.len() >= threshold {
                self.flush(&mut buffer, owner, &mut report).await?;
            }
        }
        if !buffer.is_empty() {
            self.flush(&mut buffer, owner, &mut report).await?;
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        if report.rejected > 0 {
            log::debug!("Dropped {} rows without a usable phone", report.rejected);
        }
        log::info!(
            "Ingested {} rows for {owner}: {} accepted, {} new in {} flushes ({} ms)",
            report.rows_read,
            report.accepted,
            report.affected,
            report.flushes,
            report.elapsed_ms
        );
        Ok(report)
    }

    async fn flush(
        &self,
        buffer: &mut Vec<CanonicalPhone>,
        owner: &OwnerId,
        report: &mut IngestReport,
    ) -> Result<()> {
        let affected = upsert(
            self.registry.as_ref(),
            buffer,
            owner,
            self.config.upsert_chunk_size,
        )
        .await?;
        report.flushes += 1;
        report.affected += affected;
        log::debug!(
            "Flush {}: {} phones, {affected} new",
            report.flushes,
            buffer.len()
        );
        buffer.clear();
        Ok(())
    }
}
