use crate::{
    config::{DownloadConfig, ModelConfig},
    download::{DownloadError, ModelDownloader},
    model_service::ModelLoader,
};
use serde::Serialize;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Model download failed: {reason}")]
    Download { reason: String },
    #[error("Model file could not be loaded: {reason}")]
    Load { reason: String },
}

impl From<DownloadError> for ProvisionError {
    fn from(err: DownloadError) -> Self {
        ProvisionError::Download {
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ModelStatus {
    /// No acquisition attempted yet.
    Pending,
    /// An acquisition is in flight.
    Loading,
    Ready,
    Unavailable,
}

impl ModelStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ModelStatus::Pending,
            1 => ModelStatus::Loading,
            2 => ModelStatus::Ready,
            _ => ModelStatus::Unavailable,
        }
    }
}

type Outcome<M> = Result<Arc<M>, ProvisionError>;

/// Owns the model artifact on disk and the loaded model in memory.
///
/// Constructed once per process and shared behind an `Arc`. The first call to
/// [`ModelProvisioner::acquire`] makes sure a valid artifact exists (removing
/// truncated files, downloading when missing) and loads it. Its outcome,
/// success or failure, is cached until [`ModelProvisioner::invalidate`].
pub struct ModelProvisioner<L: ModelLoader> {
    loader: Arc<L>,
    downloader: ModelDownloader,
    model_path: PathBuf,
    min_valid_bytes: u64,
    outcome: Mutex<Option<Outcome<L::Model>>>,
    // Mirrors `outcome` so readers never contend with `acquire`.
    status: AtomicU8,
}

impl<L: ModelLoader> ModelProvisioner<L> {
    pub fn new(
        model_config: &ModelConfig,
        download_config: &DownloadConfig,
        loader: L,
    ) -> Result<Self, DownloadError> {
        Ok(Self {
            loader: Arc::new(loader),
            downloader: ModelDownloader::new(download_config)?,
            model_path: model_config.get_path(),
            min_valid_bytes: model_config.min_valid_bytes,
            outcome: Mutex::new(None),
            status: AtomicU8::new(ModelStatus::Pending as u8),
        })
    }

    pub fn model_path(&self) -> &PathBuf {
        &self.model_path
    }

    /// Returns the loaded model, provisioning it on first use.
    ///
    /// The lock is held across the whole first attempt so concurrent callers
    /// wait for it instead of starting a second download.
    pub async fn acquire(&self) -> Result<Arc<L::Model>, ProvisionError> {
        let mut outcome = self.outcome.lock().await;
        if let Some(cached) = outcome.as_ref() {
            return cached.clone();
        }

        self.set_status(ModelStatus::Loading);
        let fresh = self.provision().await.map(Arc::new);
        match &fresh {
            Ok(_) => self.set_status(ModelStatus::Ready),
            Err(e) => {
                tracing::error!("Model unavailable: {}", e);
                self.set_status(ModelStatus::Unavailable);
            }
        }
        *outcome = Some(fresh.clone());
        fresh
    }

    /// Forgets the cached outcome; the next `acquire` starts from scratch.
    pub async fn invalidate(&self) {
        let mut outcome = self.outcome.lock().await;
        *outcome = None;
        self.set_status(ModelStatus::Pending);
        tracing::info!("Model cache invalidated");
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: ModelStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    async fn provision(&self) -> Result<L::Model, ProvisionError> {
        self.discard_truncated_file().await?;

        if !fs::try_exists(&self.model_path).await.unwrap_or(false) {
            tracing::info!("Downloading model to {:?}", self.model_path);
            let written = self.downloader.download_to(&self.model_path).await?;
            tracing::info!("Model downloaded ({} bytes)", written);
        }

        self.load().await
    }

    async fn discard_truncated_file(&self) -> Result<(), ProvisionError> {
        let metadata = match fs::metadata(&self.model_path).await {
            Ok(metadata) => metadata,
            Err(_) => return Ok(()),
        };

        if metadata.len() < self.min_valid_bytes {
            tracing::warn!(
                "Model file {:?} is only {} bytes (minimum {}), removing it",
                self.model_path,
                metadata.len(),
                self.min_valid_bytes
            );
            fs::remove_file(&self.model_path)
                .await
                .map_err(|e| ProvisionError::Load {
                    reason: format!("failed to remove truncated model file: {}", e),
                })?;
        }

        Ok(())
    }

    async fn load(&self) -> Result<L::Model, ProvisionError> {
        let loader = self.loader.clone();
        let path = self.model_path.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&path))
            .await
            .unwrap_or_else(|e| Err(format!("loader task failed: {}", e)));

        match loaded {
            Ok(model) => {
                tracing::info!("Model loaded from {:?}", self.model_path);
                Ok(model)
            }
            Err(reason) => {
                tracing::error!("Error loading model file: {}", reason);
                if let Err(e) = fs::remove_file(&self.model_path).await {
                    tracing::warn!("Could not remove unloadable model file: {}", e);
                }
                Err(ProvisionError::Load { reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        interstitial_remote, plain_remote, status_remote, stub_model_bytes, StubLoader,
    };
    use axum::http::StatusCode;
    use std::path::Path;

    const SCORES: [f32; 4] = [0.87, 0.05, 0.05, 0.03];

    fn provisioner(url: &str, dir: &Path, loader: StubLoader) -> ModelProvisioner<StubLoader> {
        let model_config = ModelConfig {
            model_dir: dir.to_path_buf(),
            model_file: "brain_tumor.onnx".to_string(),
            min_valid_bytes: 1_000_000,
            num_instances: 1,
        };
        let download_config = DownloadConfig {
            url: url.to_string(),
            file_id: "1CUUrtWOOi4Izi7URntsL0c2HMOCRhCxo".to_string(),
            chunk_size: 32_768,
            timeout_secs: 30,
            connect_timeout_secs: 5,
        };
        ModelProvisioner::new(&model_config, &download_config, loader).unwrap()
    }

    #[tokio::test]
    async fn test_downloads_and_loads_when_absent() {
        let body = stub_model_bytes(5_000_000);
        let remote = plain_remote(body.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let loader = StubLoader::new(SCORES.to_vec());
        let provisioner = provisioner(&remote.url, dir.path(), loader.clone());

        assert_eq!(provisioner.status(), ModelStatus::Pending);
        let result = provisioner.acquire().await;

        assert!(result.is_ok());
        assert_eq!(provisioner.status(), ModelStatus::Ready);
        let on_disk = std::fs::read(provisioner.model_path()).unwrap();
        assert!(on_disk.len() >= 1_000_000);
        assert_eq!(on_disk, body);
        assert_eq!(remote.hits(), 1);
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_saves_confirmed_binary_not_interstitial() {
        let body = stub_model_bytes(1_500_000);
        let remote = interstitial_remote("abc", body.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(&remote.url, dir.path(), StubLoader::new(SCORES.to_vec()));

        provisioner.acquire().await.unwrap();

        assert_eq!(remote.hits(), 2);
        assert_eq!(remote.last_query("confirm").as_deref(), Some("abc"));
        assert_eq!(std::fs::read(provisioner.model_path()).unwrap(), body);
    }

    #[tokio::test]
    async fn test_truncated_file_is_replaced_before_load() {
        let body = stub_model_bytes(2_000_000);
        let remote = plain_remote(body.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let loader = StubLoader::new(SCORES.to_vec());
        let provisioner = provisioner(&remote.url, dir.path(), loader.clone());
        // Loadable content, but too small to be trusted.
        std::fs::write(provisioner.model_path(), stub_model_bytes(4_096)).unwrap();

        provisioner.acquire().await.unwrap();

        assert_eq!(remote.hits(), 1);
        assert_eq!(loader.load_count(), 1);
        assert_eq!(std::fs::read(provisioner.model_path()).unwrap(), body);
    }

    #[tokio::test]
    async fn test_truncated_file_removed_even_when_download_fails() {
        let remote = status_remote(StatusCode::SERVICE_UNAVAILABLE).await;
        let dir = tempfile::tempdir().unwrap();
        let loader = StubLoader::new(SCORES.to_vec());
        let provisioner = provisioner(&remote.url, dir.path(), loader.clone());
        std::fs::write(provisioner.model_path(), b"<html>quota exceeded</html>").unwrap();

        let result = provisioner.acquire().await;

        assert!(matches!(result, Err(ProvisionError::Download { .. })));
        assert!(!provisioner.model_path().exists());
        assert_eq!(loader.load_count(), 0);
    }

    #[tokio::test]
    async fn test_existing_valid_file_skips_download() {
        let remote = plain_remote(Vec::new()).await;
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(&remote.url, dir.path(), StubLoader::new(SCORES.to_vec()));
        std::fs::write(provisioner.model_path(), stub_model_bytes(1_200_000)).unwrap();

        provisioner.acquire().await.unwrap();

        assert_eq!(remote.hits(), 0);
    }

    #[tokio::test]
    async fn test_service_unavailable_leaves_no_file() {
        let remote = status_remote(StatusCode::SERVICE_UNAVAILABLE).await;
        let dir = tempfile::tempdir().unwrap();
        let loader = StubLoader::new(SCORES.to_vec());
        let provisioner = provisioner(&remote.url, dir.path(), loader.clone());

        let result = provisioner.acquire().await;

        match result {
            Err(ProvisionError::Download { reason }) => assert!(reason.contains("503")),
            other => panic!("expected download failure, got {:?}", other.map(|_| ())),
        }
        assert!(!provisioner.model_path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(loader.load_count(), 0);
        assert_eq!(provisioner.status(), ModelStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_unloadable_file_is_deleted() {
        let remote = plain_remote(vec![0u8; 2_000_000]).await;
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(&remote.url, dir.path(), StubLoader::new(SCORES.to_vec()));

        let result = provisioner.acquire().await;

        assert!(matches!(result, Err(ProvisionError::Load { .. })));
        assert!(!provisioner.model_path().exists());
    }

    #[tokio::test]
    async fn test_repeated_acquire_downloads_once() {
        let remote = plain_remote(stub_model_bytes(1_100_000)).await;
        let dir = tempfile::tempdir().unwrap();
        let loader = StubLoader::new(SCORES.to_vec());
        let provisioner = provisioner(&remote.url, dir.path(), loader.clone());

        let first = provisioner.acquire().await.unwrap();
        let second = provisioner.acquire().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(remote.hits(), 1);
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_cached_until_invalidated() {
        let remote = status_remote(StatusCode::SERVICE_UNAVAILABLE).await;
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(&remote.url, dir.path(), StubLoader::new(SCORES.to_vec()));

        let first = provisioner.acquire().await.map(|_| ());
        let second = provisioner.acquire().await.map(|_| ());
        assert_eq!(first, second);
        assert_eq!(remote.hits(), 1);

        provisioner.invalidate().await;
        assert_eq!(provisioner.status(), ModelStatus::Pending);
        assert!(provisioner.acquire().await.is_err());
        assert_eq!(remote.hits(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_after_load_failure_redownloads() {
        let remote = plain_remote(vec![0u8; 2_000_000]).await;
        let dir = tempfile::tempdir().unwrap();
        let loader = StubLoader::new(SCORES.to_vec());
        let provisioner = provisioner(&remote.url, dir.path(), loader.clone());
        assert!(provisioner.acquire().await.is_err());

        provisioner.invalidate().await;
        let retried = provisioner.acquire().await;

        // The bad file was removed, so the retry downloads again.
        assert!(retried.is_err());
        assert_eq!(remote.hits(), 2);
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_status_stays_ready_while_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = provisioner(
            "http://127.0.0.1:9/uc?export=download",
            dir.path(),
            StubLoader::new(SCORES.to_vec()),
        );
        std::fs::write(provisioner.model_path(), stub_model_bytes(1_200_000)).unwrap();
        provisioner.acquire().await.unwrap();

        let _guard = provisioner.outcome.lock().await;

        assert_eq!(provisioner.status(), ModelStatus::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_first_acquire_downloads_once() {
        let remote = plain_remote(stub_model_bytes(1_100_000)).await;
        let dir = tempfile::tempdir().unwrap();
        let loader = StubLoader::new(SCORES.to_vec());
        let provisioner = Arc::new(provisioner(&remote.url, dir.path(), loader.clone()));

        let (a, b) = tokio::join!(
            {
                let p = provisioner.clone();
                async move { p.acquire().await }
            },
            {
                let p = provisioner.clone();
                async move { p.acquire().await }
            }
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(remote.hits(), 1);
        assert_eq!(loader.load_count(), 1);
    }
}
