use crate::config::PipelineConfig;
use crate::error::Result;
use crate::rows::RowStream;
use crate::stats::MatchReport;
use phone_matcher_normalizer::{NormalizationPolicy, RowClassifier};
use phone_matcher_protocol::{clean_tag, CandidateRecord, CanonicalPhone, TagMap, UnmatchedSet};
use phone_matcher_registry::Registry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

const MAX_PREALLOC: usize = 4_096;

/// Per-request accumulator threaded through a match call.
#[derive(Debug, Default)]
struct MatchState {
    chunk: TagMap,
    unmatched: UnmatchedSet,
    had_any_tag: bool,
    rows_read: usize,
    accepted: usize,
    rejected: usize,
    flushes: usize,
}

/// Finds the phones of a client upload that the registry does not hold.
pub struct MatchPipeline<R: ?Sized> {
    registry: Arc<R>,
    config: PipelineConfig,
    policy: NormalizationPolicy,
    classifier: RowClassifier,
}

impl<R: Registry + ?Sized> MatchPipeline<R> {
    pub fn new(registry: Arc<R>, config: PipelineConfig) -> Self {
        Self {
            registry,
            config: config.clamped(),
            policy: NormalizationPolicy::default(),
            classifier: RowClassifier::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: NormalizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drain `stream` and collect every unregistered phone with its tag.
    ///
    /// Output is a flat phone list unless some accepted row carried a
    /// non-blank tag. Any error discards the partial result.
    pub async fn run<S: RowStream + ?Sized>(&self, stream: &mut S) -> Result<MatchReport> {
        let start = Instant::now();
        let threshold = self.config.match_flush_threshold;
        log::info!("Matching client rows (flush every {threshold} distinct phones)");

        let mut state = MatchState {
            chunk: TagMap::with_capacity(threshold.min(MAX_PREALLOC)),
            ..MatchState::default()
        };

        while let Some(row) = stream.next_row().await? {
            state.rows_read += 1;
            let candidate = self
                .classifier
                .classify_row(row.headers(), row.values())
                .and_then(|split| {
                    Some(CandidateRecord {
                        phone: self.policy.normalize(split.phone)?,
                        tag: clean_tag(split.tag),
                    })
                });
            let Some(CandidateRecord { phone, tag }) = candidate else {
                state.rejected += 1;
                continue;
            };
            state.accepted += 1;
            state.had_any_tag |= tag.is_some();
            state.chunk.insert(phone, tag);

            if state.chunk.len() >= threshold {
                self.flush(&mut state).await?;
            }
        }
        if !state.chunk.is_empty() {
            self.flush(&mut state).await?;
        }

        let output = state.unmatched.into_output(state.had_any_tag);
        let report = MatchReport {
            rows_read: state.rows_read,
            accepted: state.accepted,
            rejected: state.rejected,
            flushes: state.flushes,
            elapsed_ms: start.elapsed().as_millis() as u64,
            output,
        };
        log::info!(
            "Matched {} rows: {} unmatched in {} flushes ({} ms)",
            report.rows_read,
            report.unmatched(),
            report.flushes,
            report.elapsed_ms
        );
        Ok(report)
    }

    async fn flush(&self, state: &mut MatchState) -> Result<()> {
        let chunk = std::mem::take(&mut state.chunk);
        let batch: Vec<CanonicalPhone> = chunk.phones().cloned().collect();
        let absent: HashSet<CanonicalPhone> =
            self.registry.anti_join(&batch).await?.into_iter().collect();

        for (phone, tag) in chunk.into_entries() {
            if absent.contains(&phone) {
                state.unmatched.merge(phone, tag);
            }
        }
        state.flushes += 1;
        log::debug!(
            "Flush {}: {} phones, {} absent, {} unmatched so far",
            state.flushes,
            batch.len(),
            absent.len(),
            state.unmatched.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::VecRowStream;
    use phone_matcher_protocol::{MatchOutput, OwnerId, UnmatchedRecord};
    use phone_matcher_registry::{upsert, MemoryRegistry};
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn phone(value: &str) -> CanonicalPhone {
        CanonicalPhone::parse(value).unwrap()
    }

    #[tokio::test]
    async fn blank_tags_do_not_switch_to_tagged_output() {
        let registry = Arc::new(MemoryRegistry::default());
        let pipeline = MatchPipeline::new(registry, PipelineConfig::default());
        let mut stream = VecRowStream::new(
            strings(&["phone", "state"]),
            vec![strings(&["2345678901", "  "])],
        );
        let report = pipeline.run(&mut stream).await.unwrap();
        assert_eq!(report.output, MatchOutput::Phones(vec![phone("2345678901")]));
    }

    #[tokio::test]
    async fn tags_merge_across_flushes() {
        let registry = Arc::new(MemoryRegistry::default());
        upsert(
            registry.as_ref(),
            &[phone("1111111111")],
            &OwnerId::new("admin").unwrap(),
            10,
        )
        .await
        .unwrap();

        let config = PipelineConfig {
            match_flush_threshold: 1,
            ..PipelineConfig::default()
        };
        let pipeline = MatchPipeline::new(registry, config);
        let mut stream = VecRowStream::new(
            strings(&["a", "b"]),
            vec![
                strings(&["2222222222", "9"]),
                strings(&["1111111111", "NV"]),
                strings(&["TX", "2222222222"]),
                strings(&["CA", "2222222222"]),
            ],
        );
        let report = pipeline.run(&mut stream).await.unwrap();
        assert_eq!(report.flushes, 4);
        assert_eq!(report.rows_read, 4);
        assert_eq!(
            report.output,
            MatchOutput::Tagged(vec![UnmatchedRecord {
                tag: Some("TX".to_string()),
                phone: phone("2222222222"),
            }])
        );
    }

    #[tokio::test]
    async fn unparsable_rows_are_counted() {
        let registry = Arc::new(MemoryRegistry::default());
        let pipeline = MatchPipeline::new(registry, PipelineConfig::default());
        let mut stream = VecRowStream::new(
            strings(&["phone"]),
            vec![strings(&[]), strings(&["123"]), strings(&["+1 234 567 8901"])],
        );
        let report = pipeline.run(&mut stream).await.unwrap();
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.unmatched(), 1);
    }
}
