//! HTTP client for the external artifact service, built on `reqwest`'s
//! streamed-download and multipart-upload APIs.

use crate::error::WorkerError;
use blockctl_core::BlockId;
use futures_util::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub struct ArtifactClient {
    base_url: String,
    http: reqwest::Client,
}

impl ArtifactClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        ArtifactClient {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Downloads `block_id` of dataset `file_base` to `dest`, via
    /// `GET /download/{file}.ext/blocks/{block_id}`. Streams the body in
    /// chunks rather than buffering it whole.
    pub async fn download(
        &self,
        file_base: &str,
        block_id: &BlockId,
        dest: &Path,
    ) -> Result<(), WorkerError> {
        let ext = block_id.ext().unwrap_or("bin");
        let url = format!(
            "{}/download/{file_base}.{ext}/blocks/{block_id}",
            self.base_url.trim_end_matches('/'),
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| WorkerError::from_reqwest_error(e, "downloading block"))?
            .error_for_status()
            .map_err(|e| WorkerError::from_reqwest_error(e, "downloading block"))?;

        let mut out = tokio::fs::File::create(dest)
            .await
            .map_err(|e| WorkerError::from_io_error(e, "creating download destination"))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WorkerError::from_reqwest_error(e, "streaming block body"))?;
            out.write_all(&chunk)
                .await
                .map_err(|e| WorkerError::from_io_error(e, "writing downloaded block"))?;
        }
        out.flush()
            .await
            .map_err(|e| WorkerError::from_io_error(e, "flushing downloaded block"))
    }

    /// Uploads the analysis report at `path` to `/upload_block`, named
    /// `{file_base}_analysis.{block_id}`, with `file_base`/`block_id`
    /// multipart fields matching the artifact service's upload contract.
    pub async fn upload(
        &self,
        block_id: &BlockId,
        file_base: &str,
        path: &Path,
    ) -> Result<(), WorkerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| WorkerError::from_io_error(e, "reading report for upload"))?;
        let file_name = format!("{file_base}_analysis.{block_id}");

        let form = reqwest::multipart::Form::new()
            .text("file_base", file_base.to_string())
            .text("block_id", block_id.to_string())
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let url = format!("{}/upload_block", self.base_url.trim_end_matches('/'));
        self.http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WorkerError::from_reqwest_error(e, "uploading report"))?
            .error_for_status()
            .map_err(|e| WorkerError::from_reqwest_error(e, "uploading report"))?;
        Ok(())
    }
}
