use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use phone_matcher_normalizer::is_phone_header;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One decoded row: shared header names plus this row's field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    headers: Arc<[String]>,
    values: Vec<String>,
}

impl RawRow {
    pub fn new(headers: Arc<[String]>, values: Vec<String>) -> Self {
        Self { headers, values }
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }
}

/// Forward-only source of rows. Each call pulls exactly one row; `Ok(None)`
/// ends the stream. Decode failures surface as [`PipelineError::InvalidInput`].
#[async_trait]
pub trait RowStream: Send {
    async fn next_row(&mut self) -> Result<Option<RawRow>>;
}

/// Column that carries the phone in an admin upload: the first header that
/// names a phone column, else the first column.
#[must_use]
pub fn phone_column(headers: &[String]) -> usize {
    headers
        .iter()
        .position(|header| is_phone_header(header))
        .unwrap_or(0)
}

/// In-memory rows, mostly for tests and small inputs.
pub struct VecRowStream {
    rows: std::vec::IntoIter<Result<RawRow>>,
}

impl VecRowStream {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers: Arc<[String]> = headers.into();
        let rows: Vec<_> = rows
            .into_iter()
            .map(|values| Ok(RawRow::new(Arc::clone(&headers), values)))
            .collect();
        Self::from_results(rows)
    }

    /// Replay a prepared sequence, including decode failures.
    pub fn from_results(rows: Vec<Result<RawRow>>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

#[async_trait]
impl RowStream for VecRowStream {
    async fn next_row(&mut self) -> Result<Option<RawRow>> {
        self.rows.next().transpose()
    }
}

pub type RowSender = mpsc::Sender<Result<RawRow>>;

/// Rows pushed by a decoder task through a bounded channel. The channel
/// capacity is the read-ahead window; the decoder blocks once it fills.
pub struct ChannelRowStream {
    rx: mpsc::Receiver<Result<RawRow>>,
}

impl ChannelRowStream {
    pub fn channel(capacity: usize) -> (RowSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl RowStream for ChannelRowStream {
    async fn next_row(&mut self) -> Result<Option<RawRow>> {
        self.rx.recv().await.transpose()
    }
}

/// Convenience for decoder tasks reporting a malformed source.
pub fn decode_error(message: impl Into<String>) -> PipelineError {
    PipelineError::invalid_input(message)
}
