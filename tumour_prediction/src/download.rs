use crate::config::DownloadConfig;
use reqwest::{Client, Response, StatusCode};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};

const CONFIRMATION_COOKIE_PREFIX: &str = "download_warning";

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to build http client: {0}")]
    ClientBuildFailed(reqwest::Error),
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Remote responded with status code {0}")]
    UnexpectedStatus(StatusCode),
    #[error("Failed to write model file: {0}")]
    WriteFailed(#[from] std::io::Error),
}

/// Fetches the model artifact from a file-sharing host that may answer large
/// files with a confirmation page instead of the binary.
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    url: String,
    file_id: String,
    chunk_size: usize,
}

impl ModelDownloader {
    pub fn new(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(DownloadError::ClientBuildFailed)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            file_id: config.file_id.clone(),
            chunk_size: config.chunk_size,
        })
    }

    /// Downloads into `destination`, returning the number of bytes written.
    ///
    /// The body is streamed into a sibling `.part` file that is renamed over
    /// `destination` only once complete. On any error nothing is left at
    /// either path.
    pub async fn download_to(&self, destination: &Path) -> Result<u64, DownloadError> {
        let mut response = self
            .client
            .get(&self.url)
            .query(&[("id", self.file_id.as_str())])
            .send()
            .await?;

        if let Some(token) = confirmation_token(&response) {
            tracing::info!("Remote asked for download confirmation, retrying with token");
            response = self
                .client
                .get(&self.url)
                .query(&[("id", self.file_id.as_str()), ("confirm", token.as_str())])
                .send()
                .await?;
        }

        let status = response.status();
        if status != StatusCode::OK {
            tracing::error!("Model download rejected with status {}", status);
            return Err(DownloadError::UnexpectedStatus(status));
        }

        let partial = partial_path(destination);
        let result = match self.write_body(response, &partial).await {
            Ok(written) => fs::rename(&partial, destination)
                .await
                .map(|_| written)
                .map_err(DownloadError::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(remove_err) = fs::remove_file(&partial).await {
                tracing::warn!(
                    "Failed to remove partial download {:?}: {}",
                    partial,
                    remove_err
                );
            }
        }
        result
    }

    async fn write_body(&self, mut response: Response, path: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = fs::File::create(path).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        tracing::debug!("Wrote {} bytes to {:?}", written, path);
        Ok(written)
    }
}

fn confirmation_token(response: &Response) -> Option<String> {
    response
        .cookies()
        .find(|cookie| cookie.name().starts_with(CONFIRMATION_COOKIE_PREFIX))
        .map(|cookie| cookie.value().to_string())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
