//! Availability of the recognizer binary and model files.
//!
//! The orchestrator only asks whether assets are ready and, if not, asks for
//! them to be fetched. [`LocalAssets`] keeps them under the data directory
//! and downloads what is missing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use subforge_common::paths::{bin_dir, models_dir};
use subforge_common::{ProgressEvent, TranscriptionPhase, WhisperModel};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AssetError;
use crate::transcription::sink::ProgressSink;
use crate::whisper::{find_in_bin_dir, resolve_whisper_path};

/// whisper.cpp release whose prebuilt Windows binaries are downloaded.
pub const WHISPER_VERSION: &str = "v1.8.3";

const USER_AGENT: &str = concat!("subforge/", env!("CARGO_PKG_VERSION"));

/// Download URL of the prebuilt CPU release archive.
pub fn engine_archive_url() -> String {
    format!(
        "https://github.com/ggml-org/whisper.cpp/releases/download/{}/whisper-bin-x64.zip",
        WHISPER_VERSION
    )
}

/// Whether a model file is present and at least 90% of its catalog size.
pub fn model_file_complete(path: &Path, expected_bytes: u64) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len().saturating_mul(10) >= expected_bytes.saturating_mul(9),
        Err(_) => false,
    }
}

/// Sibling path used while a download is in flight.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Source of the recognizer binary and model files.
#[async_trait]
pub trait AssetProvider: Send + Sync {
    fn is_engine_ready(&self) -> bool;

    fn is_model_ready(&self, model: WhisperModel) -> bool;

    /// Make the recognizer available and return its path.
    async fn ensure_engine(
        &self,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<PathBuf, AssetError>;

    /// Make the model available and return its path.
    async fn ensure_model(
        &self,
        model: WhisperModel,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<PathBuf, AssetError>;
}

/// Assets stored under the local data directory.
#[derive(Debug, Clone)]
pub struct LocalAssets {
    data_dir: PathBuf,
    whisper_override: Option<PathBuf>,
    client: reqwest::Client,
}

impl LocalAssets {
    pub fn new(data_dir: PathBuf, whisper_override: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            whisper_override,
            client: reqwest::Client::new(),
        }
    }

    pub fn model_path(&self, model: WhisperModel) -> PathBuf {
        models_dir(&self.data_dir).join(model.file_name())
    }

    pub fn engine_path(&self) -> Option<PathBuf> {
        resolve_whisper_path(self.whisper_override.as_deref(), &bin_dir(&self.data_dir))
    }

    /// Stream `url` into `dest` via a `.partial` file, reporting `(downloaded, total)`.
    async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        token: &CancellationToken,
        mut on_progress: F,
    ) -> Result<u64, AssetError>
    where
        F: FnMut(u64, u64) + Send,
    {
        info!("Starting download from {} to {}", url, dest.display());

        let request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send();
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AssetError::Cancelled),
            response = request => response?,
        };

        if !response.status().is_success() {
            return Err(AssetError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let temp_path = partial_path(dest);
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        let outcome: Result<(), AssetError> = async {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(AssetError::Cancelled),
                    next = stream.next() => next,
                };
                let Some(chunk) = next else { break };
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                on_progress(downloaded, total);
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        drop(file);

        if let Err(e) = outcome {
            if let Err(rm) = tokio::fs::remove_file(&temp_path).await {
                warn!("Failed to remove {}: {}", temp_path.display(), rm);
            }
            return Err(e);
        }

        tokio::fs::rename(&temp_path, dest).await?;
        info!("Download completed: {} ({} bytes)", dest.display(), downloaded);
        Ok(downloaded)
    }
}

/// Percent of `range` covered so far, offset by `start`.
fn scaled_percent(downloaded: u64, total: u64, start: u8, end: u8) -> u8 {
    if total == 0 {
        return start;
    }
    let fraction = (downloaded as f64 / total as f64).min(1.0);
    start + (fraction * f64::from(end - start)).round() as u8
}

#[async_trait]
impl AssetProvider for LocalAssets {
    fn is_engine_ready(&self) -> bool {
        self.engine_path().is_some()
    }

    fn is_model_ready(&self, model: WhisperModel) -> bool {
        model_file_complete(&self.model_path(model), model.info().size_bytes)
    }

    async fn ensure_engine(
        &self,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<PathBuf, AssetError> {
        if let Some(path) = self.engine_path() {
            return Ok(path);
        }
        if !cfg!(all(windows, target_arch = "x86_64")) {
            return Err(AssetError::UnsupportedPlatform);
        }

        let bin = bin_dir(&self.data_dir);
        tokio::fs::create_dir_all(&bin).await?;
        let zip_path = bin.join("whisper-bin.zip");
        let label = "Downloading whisper.cpp...";

        sink.emit(ProgressEvent::new(TranscriptionPhase::DownloadingBinary, 0).with_message(label));

        let mut last = 0u8;
        self.download(&engine_archive_url(), &zip_path, token, |downloaded, total| {
            let pct = scaled_percent(downloaded, total, 5, 80);
            if pct > last {
                last = pct;
                sink.emit(ProgressEvent::new(TranscriptionPhase::DownloadingBinary, pct).with_message(label));
            }
        })
        .await?;

        if token.is_cancelled() {
            let _ = tokio::fs::remove_file(&zip_path).await;
            return Err(AssetError::Cancelled);
        }

        sink.emit(
            ProgressEvent::new(TranscriptionPhase::DownloadingBinary, 82).with_message("Extracting binary..."),
        );

        let archive_path = zip_path.clone();
        let extract_dir = bin.clone();
        tokio::task::spawn_blocking(move || -> Result<(), AssetError> {
            let file = std::fs::File::open(&archive_path)?;
            let mut archive = zip::ZipArchive::new(file)?;
            archive.extract(&extract_dir)?;
            Ok(())
        })
        .await
        .map_err(|e| AssetError::Io(std::io::Error::other(e)))??;

        if let Err(e) = tokio::fs::remove_file(&zip_path).await {
            warn!("Failed to remove {}: {}", zip_path.display(), e);
        }

        let path = find_in_bin_dir(&bin).ok_or(AssetError::BinaryMissingFromArchive)?;
        sink.emit(ProgressEvent::new(TranscriptionPhase::DownloadingBinary, 100).with_message("Binary ready"));
        info!("whisper.cpp {} installed at {}", WHISPER_VERSION, path.display());
        Ok(path)
    }

    async fn ensure_model(
        &self,
        model: WhisperModel,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<PathBuf, AssetError> {
        let path = self.model_path(model);
        let expected = model.info().size_bytes;
        if model_file_complete(&path, expected) {
            return Ok(path);
        }

        // A truncated file from an interrupted download is replaced.
        if path.exists() {
            debug!("Removing incomplete model file {}", path.display());
            tokio::fs::remove_file(&path).await?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        sink.emit(ProgressEvent::new(TranscriptionPhase::DownloadingModel, 0).with_message("Downloading model..."));

        let mut last = 0u8;
        self.download(&model.download_url(), &path, token, |downloaded, total| {
            let pct = scaled_percent(downloaded, total, 0, 100);
            if pct > last {
                last = pct;
                sink.emit(
                    ProgressEvent::new(TranscriptionPhase::DownloadingModel, pct)
                        .with_message(format!("Downloading model... {}%", pct)),
                );
            }
        })
        .await?;

        if !model_file_complete(&path, expected) {
            let actual = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(AssetError::Incomplete {
                path,
                actual,
                expected,
            });
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::sink::NullSink;

    #[tokio::test]
    async fn test_download_cancelled_while_awaiting_response() {
        // Accepts the connection but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            drop(socket);
        });

        let dir = tempfile::tempdir().unwrap();
        let mut assets = LocalAssets::new(dir.path().to_path_buf(), None);
        assets.client = reqwest::Client::builder().no_proxy().build().unwrap();
        let dest = dir.path().join("ggml-tiny.bin");

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let url = format!("http://{}/ggml-tiny.bin", addr);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            assets.download(&url, &dest, &token, |_, _| {}),
        )
        .await
        .expect("cancellation was not observed before the response");

        assert!(matches!(result, Err(AssetError::Cancelled)));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
        server.abort();
    }

    #[test]
    fn test_model_completeness_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ggml-tiny.bin");
        assert!(!model_file_complete(&path, 1000));

        std::fs::write(&path, vec![0u8; 899]).unwrap();
        assert!(!model_file_complete(&path, 1000));

        std::fs::write(&path, vec![0u8; 900]).unwrap();
        assert!(model_file_complete(&path, 1000));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/data/ggml-small.bin")),
            PathBuf::from("/data/ggml-small.bin.partial")
        );
    }

    #[test]
    fn test_scaled_percent() {
        assert_eq!(scaled_percent(0, 0, 5, 80), 5);
        assert_eq!(scaled_percent(50, 100, 5, 80), 43);
        assert_eq!(scaled_percent(100, 100, 5, 80), 80);
        assert_eq!(scaled_percent(150, 100, 0, 100), 100);
    }

    #[test]
    fn test_model_paths_under_data_dir() {
        let assets = LocalAssets::new(PathBuf::from("/data"), None);
        assert_eq!(
            assets.model_path(WhisperModel::Base),
            PathBuf::from("/data/whisper/models/ggml-base.bin")
        );
    }

    #[tokio::test]
    async fn test_ready_model_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let assets = LocalAssets::new(dir.path().to_path_buf(), None);
        let path = assets.model_path(WhisperModel::Tiny);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(WhisperModel::Tiny.info().size_bytes).unwrap();

        assert!(assets.is_model_ready(WhisperModel::Tiny));
        let resolved = assets
            .ensure_model(WhisperModel::Tiny, &NullSink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn test_engine_override_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("whisper-cli-custom");
        std::fs::write(&exe, b"").unwrap();
        let assets = LocalAssets::new(dir.path().to_path_buf(), Some(exe.clone()));

        assert!(assets.is_engine_ready());
        let resolved = assets
            .ensure_engine(&NullSink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved, exe);
    }
}
