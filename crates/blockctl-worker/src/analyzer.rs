//! Default per-block analyzer.
//!
//! The real statistical analyzer is an external collaborator and stays out
//! of scope; this gives `analyze(path) -> report_path` a small, real body —
//! row count, column count, and byte size — so the data flow actually runs
//! end-to-end in tests and local runs.

use crate::error::WorkerError;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn analyze(path: &Path) -> Result<PathBuf, WorkerError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| WorkerError::from_io_error(e, "opening block for analysis"))?;
    let byte_size = file
        .metadata()
        .await
        .map_err(|e| WorkerError::from_io_error(e, "reading block metadata"))?
        .len();

    let mut reader = BufReader::new(file).lines();
    let mut row_count: u64 = 0;
    let mut column_count: usize = 0;

    while let Some(line) = reader
        .next_line()
        .await
        .map_err(|e| WorkerError::Analyze {
            context: "reading block rows".to_string(),
            reason: e.to_string(),
        })?
    {
        if row_count == 0 {
            column_count = line.split(',').count();
        }
        row_count += 1;
    }

    let report_path = path.with_extension("report");
    let report = format!(
        "rows={row_count}\ncolumns={column_count}\nbytes={byte_size}\n"
    );
    let mut out = tokio::fs::File::create(&report_path)
        .await
        .map_err(|e| WorkerError::from_io_error(e, "creating report file"))?;
    out.write_all(report.as_bytes())
        .await
        .map_err(|e| WorkerError::from_io_error(e, "writing report file"))?;

    Ok(report_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn analyzes_row_and_column_counts() {
        let dir = tempfile::tempdir().unwrap();
        let block_path = dir.path().join("orders_block1.csv");
        tokio::fs::write(&block_path, "a,b,c\n1,2,3\n4,5,6\n")
            .await
            .unwrap();

        let report_path = analyze(&block_path).await.unwrap();
        let report = tokio::fs::read_to_string(&report_path).await.unwrap();
        assert!(report.contains("rows=3"));
        assert!(report.contains("columns=3"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let result = analyze(Path::new("/nonexistent/block.csv")).await;
        assert!(result.is_err());
    }
}
