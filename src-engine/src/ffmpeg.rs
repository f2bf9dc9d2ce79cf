//! FFmpeg invocations: duration probing, concatenation and normalization to
//! 16 kHz mono PCM, silence detection and segment extraction.
//!
//! FFmpeg is resolved from the configured path, then `PATH`, then the
//! ffmpeg-sidecar location next to our executable (downloading it there as a
//! last resort).

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AssetError, ProcessError, TranscriptionError};
use crate::process::{run_streaming, tool_command, ProcessOutput, Stream};
use crate::transcription::segments::AudioSegment;
use crate::transcription::silence::{parse_silences, SilenceInterval};
use crate::transcription::timecode::parse_clock;

/// Characters of ffmpeg output kept for error reports.
pub const FFMPEG_TAIL_CHARS: usize = 500;

/// Sample rate whisper.cpp expects.
pub const SAMPLE_RATE: u32 = 16_000;

/// Name of the concat demuxer list inside a run directory.
pub const CONCAT_LIST_NAME: &str = "concat_list.txt";

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());

static PROGRESS_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());

/// Locate an existing FFmpeg binary without downloading anything.
pub fn resolve_ffmpeg_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!("Configured ffmpeg path {} does not exist", path.display());
    }

    if let Ok(path) = which::which("ffmpeg") {
        return Some(path);
    }

    let sidecar = ffmpeg_sidecar::paths::ffmpeg_path();
    if sidecar.is_file() {
        return Some(sidecar);
    }

    None
}

/// Locate FFmpeg, downloading a static build via ffmpeg-sidecar if none is installed.
///
/// Cancelling `token` abandons the wait on a download in progress; the
/// blocking download itself runs on to completion in the background.
pub async fn ensure_ffmpeg(
    override_path: Option<&Path>,
    token: &CancellationToken,
) -> Result<PathBuf, AssetError> {
    if token.is_cancelled() {
        return Err(AssetError::Cancelled);
    }

    if let Some(path) = resolve_ffmpeg_path(override_path) {
        debug!("Using ffmpeg at {}", path.display());
        return Ok(path);
    }

    info!("FFmpeg not found, attempting auto-download");
    let download = tokio::task::spawn_blocking(ffmpeg_sidecar::download::auto_download);
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            info!("FFmpeg download abandoned");
            return Err(AssetError::Cancelled);
        }
        joined = download => joined
            .map_err(|e| AssetError::FfmpegUnavailable(format!("download task failed: {}", e)))?
            .map_err(|e| AssetError::FfmpegUnavailable(format!("auto-download failed: {}", e)))?,
    }

    let path = ffmpeg_sidecar::paths::ffmpeg_path();
    if path.is_file() {
        Ok(path)
    } else {
        Err(AssetError::FfmpegUnavailable(format!(
            "downloaded binary not found at {}",
            path.display()
        )))
    }
}

/// Parse `Duration: HH:MM:SS.xx` from ffmpeg's input banner.
pub fn parse_duration(text: &str) -> Option<f64> {
    let caps = DURATION.captures(text)?;
    parse_clock(caps.get(1)?.as_str())
}

/// Parse the `time=HH:MM:SS.xx` field of an ffmpeg status line.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let caps = PROGRESS_TIME.captures(line)?;
    parse_clock(caps.get(1)?.as_str())
}

/// One line of a concat demuxer list.
///
/// The demuxer wants forward slashes, and single quotes are closed, escaped
/// and reopened.
pub fn concat_list_entry(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/").replace('\'', r"'\''");
    format!("file '{}'", text)
}

/// Write the concat list for `inputs` into `dir`.
pub async fn write_concat_list(inputs: &[PathBuf], dir: &Path) -> io::Result<PathBuf> {
    let list_path = dir.join(CONCAT_LIST_NAME);
    let content = inputs
        .iter()
        .map(|p| concat_list_entry(p))
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(&list_path, content).await?;
    Ok(list_path)
}

fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

/// A resolved FFmpeg binary.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    path: PathBuf,
}

impl Ffmpeg {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<F>(
        &self,
        args: Vec<String>,
        token: &CancellationToken,
        on_line: F,
    ) -> Result<ProcessOutput, ProcessError>
    where
        F: FnMut(Stream, &str),
    {
        let command = tool_command(&self.path, &args);
        run_streaming(command, "ffmpeg", token, FFMPEG_TAIL_CHARS, on_line).await
    }

    /// Duration of one input file in seconds.
    pub async fn probe_duration(
        &self,
        input: &Path,
        token: &CancellationToken,
    ) -> Result<f64, TranscriptionError> {
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
        ];

        let mut duration = None;
        // ffmpeg exits non-zero here because no output is given; only the banner matters.
        let output = self
            .run(args, token, |_, line| {
                if duration.is_none() {
                    duration = parse_duration(line);
                }
            })
            .await
            .map_err(normalization_failure)?;

        match duration {
            Some(secs) => {
                debug!("Probed {}: {:.2}s", input.display(), secs);
                Ok(secs)
            }
            None => Err(TranscriptionError::Normalization {
                message: format!("Could not determine duration of {}", input.display()),
                tail: output.tail,
            }),
        }
    }

    /// Concatenate the list into one mono 16 kHz `pcm_s16le` WAV.
    ///
    /// `on_time` receives the output position in seconds as ffmpeg reports it.
    pub async fn normalize<F>(
        &self,
        concat_list: &Path,
        output: &Path,
        token: &CancellationToken,
        mut on_time: F,
    ) -> Result<(), TranscriptionError>
    where
        F: FnMut(f64),
    {
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            concat_list.to_string_lossy().into_owned(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        let result = self
            .run(args, token, |_, line| {
                if let Some(secs) = parse_progress_time(line) {
                    on_time(secs);
                }
            })
            .await
            .map_err(normalization_failure)?;

        if !result.success() {
            return Err(TranscriptionError::Normalization {
                message: result.describe_exit("ffmpeg"),
                tail: result.tail,
            });
        }
        Ok(())
    }

    /// Run `silencedetect` over the normalized audio.
    pub async fn detect_silences(
        &self,
        wav: &Path,
        noise_db: f64,
        min_duration_secs: f64,
        token: &CancellationToken,
    ) -> Result<Vec<SilenceInterval>, TranscriptionError> {
        let filter = format!("silencedetect=noise={}dB:d={}", noise_db, min_duration_secs);
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            wav.to_string_lossy().into_owned(),
            "-af".to_string(),
            filter,
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        let mut report = String::new();
        let result = self
            .run(args, token, |_, line| {
                if line.contains("silence_") {
                    report.push_str(line);
                    report.push('\n');
                }
            })
            .await
            .map_err(|e| match e {
                ProcessError::Cancelled => TranscriptionError::Cancelled,
                other => TranscriptionError::Analysis {
                    message: other.to_string(),
                    tail: String::new(),
                },
            })?;

        if !result.success() {
            return Err(TranscriptionError::Analysis {
                message: result.describe_exit("ffmpeg"),
                tail: result.tail,
            });
        }

        let silences = parse_silences(&report);
        debug!("Detected {} silences", silences.len());
        Ok(silences)
    }

    /// Copy one segment's time range out of the normalized WAV.
    pub async fn extract_segment(
        &self,
        wav: &Path,
        segment: &AudioSegment,
        output: &Path,
        token: &CancellationToken,
    ) -> Result<(), TranscriptionError> {
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-ss".to_string(),
            format_secs(segment.start_sec),
            "-t".to_string(),
            format_secs(segment.duration_sec),
            "-i".to_string(),
            wav.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        let result = self
            .run(args, token, |_, _| {})
            .await
            .map_err(|e| match e {
                ProcessError::Cancelled => TranscriptionError::Cancelled,
                other => TranscriptionError::Recognition {
                    segment: segment.index,
                    message: format!("segment extraction failed: {}", other),
                    tail: String::new(),
                },
            })?;

        if !result.success() {
            return Err(TranscriptionError::Recognition {
                segment: segment.index,
                message: format!("segment extraction failed: {}", result.describe_exit("ffmpeg")),
                tail: result.tail,
            });
        }
        Ok(())
    }
}

fn normalization_failure(err: ProcessError) -> TranscriptionError {
    match err {
        ProcessError::Cancelled => TranscriptionError::Cancelled,
        other => TranscriptionError::Normalization {
            message: other.to_string(),
            tail: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_ffmpeg_honours_cancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            ensure_ffmpeg(Some(Path::new("/nonexistent/ffmpeg")), &token),
        )
        .await
        .expect("cancelled lookup did not return promptly");
        assert!(matches!(result, Err(AssetError::Cancelled)));
    }

    #[test]
    fn test_parse_duration() {
        let banner = "Input #0, mp3, from 'book.mp3':\n  Duration: 01:02:03.45, start: 0.025057, bitrate: 64 kb/s";
        let secs = parse_duration(banner).unwrap();
        assert!((secs - 3723.45).abs() < 1e-9);
        assert_eq!(parse_duration("Duration: N/A, bitrate: N/A"), None);
    }

    #[test]
    fn test_parse_progress_time() {
        let line = "size=   10240kB time=00:05:20.48 bitrate= 256.0kbits/s speed= 412x";
        let secs = parse_progress_time(line).unwrap();
        assert!((secs - 320.48).abs() < 1e-9);
        assert_eq!(parse_progress_time("size=N/A time=N/A bitrate=N/A"), None);
    }

    #[test]
    fn test_concat_list_entry_escaping() {
        assert_eq!(
            concat_list_entry(Path::new("/books/Chapter 1.mp3")),
            "file '/books/Chapter 1.mp3'"
        );
        assert_eq!(
            concat_list_entry(Path::new("/books/Ender's Game.m4b")),
            r"file '/books/Ender'\''s Game.m4b'"
        );
        assert_eq!(
            concat_list_entry(Path::new(r"C:\Audio\part1.mp3")),
            "file 'C:/Audio/part1.mp3'"
        );
    }

    #[tokio::test]
    async fn test_write_concat_list() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![PathBuf::from("/a/one.mp3"), PathBuf::from("/a/two.mp3")];
        let list = write_concat_list(&inputs, dir.path()).await.unwrap();

        assert_eq!(list.file_name().unwrap(), CONCAT_LIST_NAME);
        let content = std::fs::read_to_string(list).unwrap();
        assert_eq!(content, "file '/a/one.mp3'\nfile '/a/two.mp3'");
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(12.3456), "12.346");
        assert_eq!(format_secs(-1.0), "0.000");
    }

    #[test]
    fn test_override_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-ffmpeg");
        std::fs::write(&fake, b"").unwrap();
        assert_eq!(resolve_ffmpeg_path(Some(&fake)), Some(fake));
    }
}
