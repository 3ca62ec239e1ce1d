use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub model_file: String,
    /// Anything smaller than this on disk is an error page, not a model.
    #[serde(default = "default_min_valid_bytes")]
    pub min_valid_bytes: u64,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_min_valid_bytes() -> u64 {
    1_000_000
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if self.model_file.trim().is_empty() {
            return Err("model.model_file must not be empty".to_string());
        }
        if self.num_instances == 0 {
            return Err("model.num_instances must be greater than zero".to_string());
        }
        if self.model_dir.is_file() {
            return Err(format!(
                "model.model_dir points to a file: {:?}",
                self.model_dir
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    pub url: String,
    pub file_id: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_chunk_size() -> usize {
    32_768
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Validatable for DownloadConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(format!("download.url is not an http(s) url: {}", self.url));
        }
        if self.file_id.trim().is_empty() {
            return Err("download.file_id must not be empty".to_string());
        }
        if self.chunk_size == 0 {
            return Err("download.chunk_size must be greater than zero".to_string());
        }
        Ok(())
    }
}
