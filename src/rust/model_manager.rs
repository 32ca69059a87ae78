use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

pub const MODEL_FILE: &str = "model.onnx";
pub const LABELS_FILE: &str = "labels.txt";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Download of {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("Download of {url} returned an HTML page instead of the file")]
    UnexpectedContent { url: String },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// Where a model artifact and its label vocabulary are fetched from.
///
/// Hashes are optional: without them a completed transfer is the only integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub name: String,
    pub model_url: String,
    pub labels_url: String,
    pub model_hash: Option<String>,
    pub labels_hash: Option<String>,
}

impl ModelSource {
    pub fn new(name: impl Into<String>, model_url: impl Into<String>, labels_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_url: model_url.into(),
            labels_url: labels_url.into(),
            model_hash: None,
            labels_hash: None,
        }
    }

    /// A source whose files are shared Google Drive files, addressed by file id.
    pub fn google_drive(name: impl Into<String>, model_file_id: &str, labels_file_id: &str) -> Self {
        Self::new(name, google_drive_url(model_file_id), google_drive_url(labels_file_id))
    }

    pub fn with_hashes(mut self, model_hash: Option<String>, labels_hash: Option<String>) -> Self {
        self.model_hash = model_hash;
        self.labels_hash = labels_hash;
        self
    }
}

pub fn google_drive_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=download&id={}", file_id)
}

#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("IMAGELENS_CACHE") {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("imagelens").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("imagelens").join("models");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("imagelens").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join(MODEL_FILE)
    }

    pub fn get_labels_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join(LABELS_FILE)
    }

    pub fn is_model_downloaded(&self, name: &str) -> bool {
        let model_path = self.get_model_path(name);
        let labels_path = self.get_labels_path(name);
        log::debug!("Checking if model is downloaded:");
        log::debug!("  Model path: {:?} (exists: {})", model_path, model_path.exists());
        log::debug!("  Labels path: {:?} (exists: {})", labels_path, labels_path.exists());
        model_path.exists() && labels_path.exists()
    }

    /// Downloads whichever of the model and labels files is missing.
    ///
    /// Files already present are left alone unless the source carries a hash
    /// they fail to match. Concurrent calls are serialized, so a file is never
    /// fetched twice. Files written by a failed call are removed again.
    pub async fn download_model(&self, source: &ModelSource) -> Result<(), ModelError> {
        let _lock = self.download_lock.lock().await;

        let model_dir = self.models_dir.join(&source.name);
        log::info!("Preparing model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let model_path = self.get_model_path(&source.name);
        let labels_path = self.get_labels_path(&source.name);
        let mut written = Vec::new();

        let result = async {
            if self.ensure_file(&source.model_url, &model_path, source.model_hash.as_deref(), "model").await? {
                written.push(model_path.clone());
            }
            if self.ensure_file(&source.labels_url, &labels_path, source.labels_hash.as_deref(), "labels").await? {
                written.push(labels_path.clone());
            }
            Ok::<(), ModelError>(())
        }
        .await;

        match result {
            Ok(()) => {
                log::info!("Model '{}' ready to use", source.name);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to set up model '{}': {}", source.name, e);
                for path in written {
                    let _ = fs::remove_file(path);
                }
                Err(e)
            }
        }
    }

    /// Returns `true` if the file was downloaded by this call.
    async fn ensure_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<bool, ModelError> {
        if path.exists() {
            match expected_hash {
                Some(hash) if !self.verify_file(path, hash)? => {
                    log::warn!("{} file at {:?} failed verification, redownloading", file_type, path);
                }
                _ => {
                    log::info!("{} file already present at {:?}", file_type, path);
                    return Ok(false);
                }
            }
        } else {
            log::info!("{} file does not exist, downloading...", file_type);
        }

        if url.is_empty() {
            return Err(ModelError::NotDownloaded(format!(
                "{} file {:?} is missing and no download URL is configured",
                file_type, path
            )));
        }

        self.download_file(url, path, expected_hash, file_type).await?;
        Ok(true)
    }

    fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ModelError> {
        log::debug!("Verifying file: {:?}", path);
        let bytes = fs::read(path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Calculated hash: {}", hash);
        log::debug!("Expected hash:   {}", expected_hash);
        Ok(hash.eq_ignore_ascii_case(expected_hash))
    }

    /// Checks both files exist and, where the source carries hashes, match them.
    pub fn verify_model(&self, source: &ModelSource) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(&source.name);
        let labels_path = self.get_labels_path(&source.name);

        if !model_path.exists() || !labels_path.exists() {
            log::info!("One or both files do not exist");
            return Ok(false);
        }

        let model_ok = match &source.model_hash {
            Some(hash) => self.verify_file(&model_path, hash)?,
            None => true,
        };
        let labels_ok = match &source.labels_hash {
            Some(hash) => self.verify_file(&labels_path, hash)?,
            None => true,
        };

        log::info!("Verification results: model {}, labels {}", model_ok, labels_ok);
        Ok(model_ok && labels_ok)
    }

    async fn download_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<(), ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?;
        let status = response.status();
        log::info!("Download response status: {}", status);
        if !status.is_success() {
            return Err(ModelError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Large shared-drive files answer with a confirmation page instead of the bytes
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/html"))
            .unwrap_or(false);
        if is_html {
            return Err(ModelError::UnexpectedContent { url: url.to_string() });
        }

        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        if let Some(expected) = expected_hash {
            let hash = sha256_hex(&bytes);
            if !hash.eq_ignore_ascii_case(expected) {
                log::error!("{} hash mismatch: expected {}, got {}", file_type, expected, hash);
                return Err(ModelError::HashMismatch {
                    file_type: file_type.to_string(),
                    expected: expected.to_string(),
                    actual: hash,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write next to the destination and rename so a partial file never looks complete
        let partial = path.with_extension("part");
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, path)?;

        log::info!("{} file downloaded successfully", file_type);
        Ok(())
    }

    pub fn remove_download(&self, name: &str) -> Result<(), ModelError> {
        let model_path = self.get_model_path(name);
        let labels_path = self.get_labels_path(name);

        if model_path.exists() {
            fs::remove_file(&model_path)?;
        }
        if labels_path.exists() {
            fs::remove_file(&labels_path)?;
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and, where hashes are known, verified.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_model_downloaded(&self, source: &ModelSource) -> Result<(), ModelError> {
        log::info!("Checking if model '{}' is downloaded...", source.name);
        if self.is_model_downloaded(&source.name) && !self.verify_model(source)? {
            log::info!("Model verification failed, re-downloading...");
            self.remove_download(&source.name)?;
        }
        self.download_model(source).await
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_source(name: &str) -> ModelSource {
        ModelSource::new(name, "http://127.0.0.1:9/model.onnx", "http://127.0.0.1:9/labels.txt")
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path()).unwrap();
        assert!(manager.get_model_path("wheat").ends_with("wheat/model.onnx"));
        assert!(manager.get_labels_path("wheat").ends_with("wheat/labels.txt"));
    }

    #[test]
    fn test_default_models_dir() {
        env::set_var("IMAGELENS_CACHE", "/tmp/imagelens-test-cache");
        let path = ModelManager::get_default_models_dir();
        assert!(path.ends_with("imagelens-test-cache/models"));
        env::remove_var("IMAGELENS_CACHE");

        let path = ModelManager::get_default_models_dir();
        assert!(path.to_string_lossy().contains("imagelens"));
    }

    #[test]
    fn test_google_drive_url() {
        let source = ModelSource::google_drive("m", "abc123", "def456");
        assert_eq!(source.model_url, "https://drive.google.com/uc?export=download&id=abc123");
        assert!(source.labels_url.ends_with("id=def456"));
    }

    #[tokio::test]
    async fn test_existing_files_are_not_downloaded() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let source = unreachable_source("cached");

        fs::create_dir_all(dir.path().join("cached"))?;
        fs::write(manager.get_model_path("cached"), b"onnx")?;
        fs::write(manager.get_labels_path("cached"), b"a\nb\n")?;

        // Nothing listens on port 9, so this only succeeds if no request is made
        manager.download_model(&source).await?;
        assert!(manager.is_model_downloaded("cached"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_without_url() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let source = ModelSource::new("local", "", "");

        let err = manager.download_model(&source).await.unwrap_err();
        assert!(matches!(err, ModelError::NotDownloaded(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let source = unreachable_source("broken");

        assert!(manager.download_model(&source).await.is_err());
        assert!(!manager.get_model_path("broken").exists());
        assert!(!manager.get_labels_path("broken").exists());
        Ok(())
    }

    #[test]
    fn test_verify_model_with_hashes() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        fs::create_dir_all(dir.path().join("m"))?;
        fs::write(manager.get_model_path("m"), b"model bytes")?;
        fs::write(manager.get_labels_path("m"), b"a\n")?;

        let unhashed = unreachable_source("m");
        assert!(manager.verify_model(&unhashed)?);

        let good = unhashed.clone().with_hashes(Some(sha256_hex(b"model bytes")), None);
        assert!(manager.verify_model(&good)?);

        let bad = unhashed.with_hashes(Some(sha256_hex(b"other")), None);
        assert!(!manager.verify_model(&bad)?);
        Ok(())
    }

    #[test]
    fn test_remove_download() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        fs::create_dir_all(dir.path().join("m"))?;
        fs::write(manager.get_model_path("m"), b"x")?;
        fs::write(manager.get_labels_path("m"), b"a\n")?;

        manager.remove_download("m")?;
        assert!(!manager.is_model_downloaded("m"));
        Ok(())
    }
}
