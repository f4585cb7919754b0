use phone_matcher_pipeline::{decode_error, ChannelRowStream, PipelineError, RawRow, RowSender};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Rows decoded ahead of the pipeline.
const READ_AHEAD: usize = 1_024;

/// Spreadsheet formats we recognise but do not decode.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Reject inputs the decoder cannot read before any work starts.
pub(crate) fn check_supported(path: &Path) -> Result<(), PipelineError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if UNSUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(decode_error(format!(
            "{}: .{ext} workbooks are not supported; export the sheet as CSV",
            path.display()
        )));
    }
    Ok(())
}

/// Decode `path` as CSV on a blocking thread and stream the rows.
///
/// The first record is the header row. Fields are trimmed and rows may have
/// any width. A malformed record is sent down the stream as
/// `InvalidInput` and ends decoding.
pub(crate) fn spawn_csv_decoder(path: &Path) -> (ChannelRowStream, JoinHandle<()>) {
    let (tx, stream) = ChannelRowStream::channel(READ_AHEAD);
    let path = path.to_path_buf();
    let handle = tokio::task::spawn_blocking(move || {
        if let Err(err) = decode_csv(&path, &tx) {
            // The receiver may already be gone if the pipeline failed first.
            let _ = tx.blocking_send(Err(err));
        }
    });
    (stream, handle)
}

fn decode_csv(path: &Path, tx: &RowSender) -> Result<(), PipelineError> {
    check_supported(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| decode_error(format!("{}: {err}", path.display())))?;

    let headers: Arc<[String]> = reader
        .headers()
        .map_err(|err| decode_error(format!("{}: {err}", path.display())))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into();

    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|err| decode_error(format!("{}: {err}", path.display())))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let values = record.iter().map(str::to_string).collect();
        if tx
            .blocking_send(Ok(RawRow::new(Arc::clone(&headers), values)))
            .is_err()
        {
            log::debug!("Row consumer went away after {rows} rows");
            return Ok(());
        }
        rows += 1;
    }
    log::debug!("Decoded {rows} rows from {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phone_matcher_pipeline::RowStream;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn workbook_extensions_are_rejected() {
        assert!(matches!(
            check_supported(Path::new("upload.XLSX")),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(check_supported(Path::new("upload.csv")).is_ok());
        assert!(check_supported(Path::new("upload")).is_ok());
    }

    #[tokio::test]
    async fn decodes_header_and_ragged_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.csv");
        std::fs::write(&path, "state, phone\nCA, 234-567-8901\n,,\n5550001111\n").unwrap();

        let (mut stream, handle) = spawn_csv_decoder(&path);
        let first = stream.next_row().await.unwrap().unwrap();
        assert_eq!(first.headers(), ["state".to_string(), "phone".to_string()]);
        assert_eq!(first.values(), ["CA".to_string(), "234-567-8901".to_string()]);
        let second = stream.next_row().await.unwrap().unwrap();
        assert_eq!(second.values(), ["5550001111".to_string()]);
        assert!(stream.next_row().await.unwrap().is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_invalid_input() {
        let temp = TempDir::new().unwrap();
        let (mut stream, handle) = spawn_csv_decoder(&temp.path().join("nope.csv"));
        assert!(matches!(
            stream.next_row().await,
            Err(PipelineError::InvalidInput(_))
        ));
        handle.await.unwrap();
    }
}
