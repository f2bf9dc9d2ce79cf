//! Transcription run lifecycle.
//!
//! A run walks `downloading-binary → downloading-model → preparing →
//! segmenting → transcribing → done`, stopping at the first failure. At most
//! one run is active per [`Orchestrator`]; starting another cancels the
//! current one and waits for it to wind down first.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use subforge_common::validation::{validate_inputs, validate_language, validate_output_path};
use subforge_common::{ProgressEvent, TranscriptionPhase, WhisperModel};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::segments::{build_segments, AudioSegment};
use super::sink::{ProgressSink, RunSink};
use super::subtitles::{merge_srts, offset_srt};
use super::timecode::format_clock;
use crate::assets::{AssetProvider, LocalAssets};
use crate::config::EngineConfig;
use crate::error::TranscriptionError;
use crate::ffmpeg::{ensure_ffmpeg, write_concat_list, Ffmpeg};
use crate::whisper::{recognizer_threads, RecognitionRequest, RecognizerEvent, Whisper};

/// Name of the normalized audio inside a run directory.
const NORMALIZED_AUDIO: &str = "audio.wav";

/// What to transcribe and where to put the result.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionRequest {
    /// Audio files, concatenated in this order
    pub inputs: Vec<PathBuf>,
    pub model: WhisperModel,
    /// Destination `.srt`. Defaults to a timestamped file in the output directory.
    pub output_path: Option<PathBuf>,
    /// Overrides the configured recognizer language
    pub language: Option<String>,
    /// Overrides the recognizer thread count
    pub threads: Option<usize>,
}

impl TranscriptionRequest {
    pub fn new(inputs: Vec<PathBuf>, model: WhisperModel) -> Self {
        Self {
            inputs,
            model,
            ..Default::default()
        }
    }
}

struct ActiveRun {
    id: u64,
    token: CancellationToken,
    /// Resolves (with an error) once the run's sender is dropped
    finished: oneshot::Receiver<()>,
}

/// Scratch directory owned by one run.
///
/// The name gets a random suffix and the directory is created exclusively,
/// so an existing directory is never reused. Removed by [`RunDir::cleanup`]
/// on every normal exit path, and by the `TempDir` guard if the run future
/// is abandoned part way.
struct RunDir {
    dir: tempfile::TempDir,
}

impl RunDir {
    fn create(root: &Path, run_id: u64) -> std::io::Result<Self> {
        let prefix = format!("subforge-{}-", run_id);
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?;
        debug!("Created run directory {}", dir.path().display());
        Ok(Self { dir })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn cleanup(self) {
        if let Err(e) = tokio::fs::remove_dir_all(self.dir.path()).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove run directory {}: {}", self.dir.path().display(), e);
            }
        }
        // The guard's own removal now finds nothing and stays quiet
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn run_percent(position_sec: f64, total_sec: f64) -> u8 {
    if total_sec <= 0.0 {
        return 0;
    }
    ((position_sec / total_sec) * 100.0).clamp(0.0, 100.0).round() as u8
}

/// Drives transcription runs.
pub struct Orchestrator {
    config: EngineConfig,
    assets: Arc<dyn AssetProvider>,
    work_root: PathBuf,
    active: Mutex<Option<ActiveRun>>,
    next_run_id: AtomicU64,
}

impl Orchestrator {
    /// Orchestrator using locally stored assets.
    pub fn new(config: EngineConfig) -> Self {
        let assets = LocalAssets::new(config.data_dir(), config.whisper_path.clone());
        Self::with_assets(config, Arc::new(assets))
    }

    pub fn with_assets(config: EngineConfig, assets: Arc<dyn AssetProvider>) -> Self {
        Self {
            config,
            assets,
            work_root: std::env::temp_dir(),
            active: Mutex::new(None),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// Put run directories under `root` instead of the system temp directory.
    pub fn with_work_root(mut self, root: PathBuf) -> Self {
        self.work_root = root;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn assets(&self) -> &Arc<dyn AssetProvider> {
        &self.assets
    }

    /// Whether a run is in progress.
    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Cancel the active run, if any. Returns whether one was running.
    ///
    /// The cancelled run emits no further events and resolves to
    /// [`TranscriptionError::Cancelled`].
    pub async fn cancel(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(run) => {
                info!("Cancelling transcription run {}", run.id);
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Claim the run slot, cancelling and awaiting any previous run.
    async fn begin_run(&self) -> (u64, CancellationToken, oneshot::Sender<()>) {
        let mut slot = self.active.lock().await;

        if let Some(previous) = slot.take() {
            info!("Superseding transcription run {}", previous.id);
            previous.token.cancel();
            // Err just means the previous run dropped its sender, which is the signal
            let _ = previous.finished.await;
        }

        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let (finished_tx, finished_rx) = oneshot::channel();
        *slot = Some(ActiveRun {
            id,
            token: token.clone(),
            finished: finished_rx,
        });

        (id, token, finished_tx)
    }

    async fn end_run(&self, id: u64) {
        let mut slot = self.active.lock().await;
        if slot.as_ref().map(|run| run.id) == Some(id) {
            *slot = None;
        }
    }

    /// Transcribe the request's inputs into a single SRT file.
    ///
    /// Progress goes to `sink`, ending with exactly one `done` or `error`
    /// event. A cancelled run ends silently with
    /// [`TranscriptionError::Cancelled`]. Nothing is written to the output
    /// path unless every segment succeeds.
    pub async fn transcribe(
        &self,
        request: TranscriptionRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<PathBuf, TranscriptionError> {
        let (run_id, token, finished_tx) = self.begin_run().await;
        let sink = RunSink::new(sink, token.clone());
        info!(
            "Starting transcription run {} ({} inputs, model {})",
            run_id,
            request.inputs.len(),
            request.model
        );

        let outcome = match RunDir::create(&self.work_root, run_id) {
            Ok(run_dir) => {
                let result = self.execute(&request, &run_dir, &sink, &token).await;
                run_dir.cleanup().await;
                result
            }
            Err(e) => Err(TranscriptionError::Io(e)),
        };

        let outcome = match outcome {
            Ok(output_path) => {
                info!("Run {} complete: {}", run_id, output_path.display());
                // The file is written, so a late cancel cannot retract this
                sink.emit_final(ProgressEvent::done(output_path.clone()));
                Ok(output_path)
            }
            Err(e) if e.is_cancelled() || token.is_cancelled() => {
                info!("Run {} cancelled", run_id);
                Err(TranscriptionError::Cancelled)
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                sink.emit(ProgressEvent::error(e.to_string()));
                Err(e)
            }
        };

        // Release a superseding run before touching the slot it holds
        drop(finished_tx);
        self.end_run(run_id).await;
        outcome
    }

    async fn execute(
        &self,
        request: &TranscriptionRequest,
        run_dir: &RunDir,
        sink: &RunSink,
        token: &CancellationToken,
    ) -> Result<PathBuf, TranscriptionError> {
        let inputs = validate_inputs(&request.inputs)?;
        let language = request
            .language
            .clone()
            .unwrap_or_else(|| self.config.language.clone());
        validate_language(&language)?;
        let output_path = request
            .output_path
            .clone()
            .unwrap_or_else(|| self.config.default_output_path());
        validate_output_path(&output_path)?;

        // Acquisition. Both calls return immediately when assets are present.
        let whisper = Whisper::new(self.assets.ensure_engine(sink, token).await?);
        let model_path = self.assets.ensure_model(request.model, sink, token).await?;
        let ffmpeg = Ffmpeg::new(ensure_ffmpeg(self.config.ffmpeg_path.as_deref(), token).await?);

        let (wav, total) = self.prepare(&ffmpeg, &inputs, run_dir.path(), sink, token).await?;
        let segments = self.segment(&ffmpeg, &wav, total, sink, token).await?;

        info!("Transcribing {} segments", segments.len());
        let threads = request
            .threads
            .map(|t| t.max(1))
            .unwrap_or_else(|| recognizer_threads(self.config.max_threads));
        sink.emit(
            ProgressEvent::new(TranscriptionPhase::Transcribing, 0)
                .with_message("Transcribing audio...")
                .with_timing(Some(0.0), total),
        );

        let mut documents = Vec::with_capacity(segments.len());
        for segment in &segments {
            if token.is_cancelled() {
                return Err(TranscriptionError::Cancelled);
            }
            let segment_wav = run_dir.path().join(format!("segment_{}.wav", segment.index));
            let prefix = run_dir.path().join(format!("segment_{}", segment.index));
            let recognition = RecognitionRequest {
                model: &model_path,
                audio: &segment_wav,
                output_prefix: &prefix,
                language: &language,
                threads,
            };

            let result = self
                .transcribe_segment(&ffmpeg, &whisper, &wav, segment, &recognition, total, sink, token)
                .await;

            remove_quietly(&segment_wav).await;
            remove_quietly(&recognition.srt_path()).await;
            documents.push(result?);
        }

        sink.emit(
            ProgressEvent::new(TranscriptionPhase::Transcribing, 100)
                .with_message("Merging subtitles...")
                .with_timing(Some(total), total),
        );

        let merged = merge_srts(&documents);
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&output_path, merged).await?;
        remove_quietly(&wav).await;

        Ok(output_path)
    }

    /// Probe, concatenate and normalize the inputs. Returns the WAV and its duration.
    async fn prepare(
        &self,
        ffmpeg: &Ffmpeg,
        inputs: &[PathBuf],
        run_dir: &Path,
        sink: &RunSink,
        token: &CancellationToken,
    ) -> Result<(PathBuf, f64), TranscriptionError> {
        info!("Preparing audio from {} inputs", inputs.len());
        sink.emit(ProgressEvent::new(TranscriptionPhase::Preparing, 0).with_message("Preparing audio..."));

        let mut total = 0.0;
        for input in inputs {
            total += ffmpeg.probe_duration(input, token).await?;
        }
        debug!("Total input duration {:.2}s", total);

        let list = write_concat_list(inputs, run_dir).await?;
        let wav = run_dir.join(NORMALIZED_AUDIO);

        let mut last = 0u8;
        ffmpeg
            .normalize(&list, &wav, token, |position| {
                let pct = run_percent(position, total).min(99);
                if pct > last {
                    last = pct;
                    sink.emit(
                        ProgressEvent::new(TranscriptionPhase::Preparing, pct)
                            .with_message(format!("Preparing audio... {}%", pct))
                            .with_timing(Some(position.min(total)), total),
                    );
                }
            })
            .await?;

        sink.emit(
            ProgressEvent::new(TranscriptionPhase::Preparing, 100)
                .with_message("Audio ready")
                .with_timing(Some(total), total),
        );
        Ok((wav, total))
    }

    async fn segment(
        &self,
        ffmpeg: &Ffmpeg,
        wav: &Path,
        total: f64,
        sink: &RunSink,
        token: &CancellationToken,
    ) -> Result<Vec<AudioSegment>, TranscriptionError> {
        sink.emit(ProgressEvent::new(TranscriptionPhase::Segmenting, 0).with_message("Detecting silences..."));

        let silences = ffmpeg
            .detect_silences(
                wav,
                self.config.silence_noise_db,
                self.config.silence_min_duration_secs,
                token,
            )
            .await?;
        let segments = build_segments(&silences, total);
        if segments.is_empty() {
            return Err(TranscriptionError::Normalization {
                message: "Normalized audio has no duration".to_string(),
                tail: String::new(),
            });
        }

        for segment in &segments {
            debug!(
                "Segment {}: {:.2}s - {:.2}s ({:.2}s)",
                segment.index, segment.start_sec, segment.end_sec, segment.duration_sec
            );
        }
        sink.emit(
            ProgressEvent::new(TranscriptionPhase::Segmenting, 100)
                .with_message(format!("Split into {} segments", segments.len())),
        );
        Ok(segments)
    }

    /// Extract and recognize one segment, returning its SRT on the run timeline.
    #[allow(clippy::too_many_arguments)]
    async fn transcribe_segment(
        &self,
        ffmpeg: &Ffmpeg,
        whisper: &Whisper,
        wav: &Path,
        segment: &AudioSegment,
        recognition: &RecognitionRequest<'_>,
        total: f64,
        sink: &RunSink,
        token: &CancellationToken,
    ) -> Result<String, TranscriptionError> {
        ffmpeg
            .extract_segment(wav, segment, recognition.audio, token)
            .await?;

        whisper
            .transcribe(segment.index, recognition, token, |event| match event {
                RecognizerEvent::Progress(pct) => {
                    let position = segment.start_sec + f64::from(pct) / 100.0 * segment.duration_sec;
                    let percent = run_percent(position, total);
                    sink.emit(
                        ProgressEvent::new(TranscriptionPhase::Transcribing, percent)
                            .with_message(format!("Transcribing... {}%", percent))
                            .with_timing(Some(position), total),
                    );
                }
                RecognizerEvent::Segment(line) => {
                    let position = segment.start_sec + line.start_sec.unwrap_or(0.0);
                    sink.emit(
                        ProgressEvent::new(TranscriptionPhase::Transcribing, run_percent(position, total))
                            .with_segment(line.text, format_clock(position))
                            .with_timing(Some(position), total),
                    );
                }
            })
            .await?;

        let srt_path = recognition.srt_path();
        let document = match tokio::fs::read_to_string(&srt_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Segment {} produced no subtitles", segment.index);
                String::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(offset_srt(&document, segment.start_sec))
    }
}
