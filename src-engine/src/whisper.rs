//! whisper.cpp command-line recognizer.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ProcessError, TranscriptionError};
use crate::process::{run_streaming, tool_command};
use crate::transcription::recognizer::{parse_progress, RecognizedSegment, SegmentDeduplicator};

/// Characters of recognizer output kept for error reports.
pub const RECOGNIZER_TAIL_CHARS: usize = 1500;

/// Executable names used by whisper.cpp releases over time.
#[cfg(windows)]
pub const BINARY_NAMES: &[&str] = &["whisper-cli.exe", "whisper-main.exe", "main.exe"];
#[cfg(not(windows))]
pub const BINARY_NAMES: &[&str] = &["whisper-cli", "whisper-main", "main"];

/// Search an extracted release for the recognizer executable.
///
/// Archives nest their contents differently between versions, so the bin
/// directory and two levels of subdirectories are checked.
pub fn find_in_bin_dir(bin_dir: &Path) -> Option<PathBuf> {
    let mut candidates = vec![bin_dir.to_path_buf()];

    if let Ok(entries) = std::fs::read_dir(bin_dir) {
        for entry in entries.flatten() {
            let sub = entry.path();
            if !sub.is_dir() {
                continue;
            }
            if let Ok(nested) = std::fs::read_dir(&sub) {
                candidates.extend(
                    nested
                        .flatten()
                        .map(|e| e.path())
                        .filter(|p| p.is_dir()),
                );
            }
            candidates.push(sub);
        }
    }

    // Shallowest match wins
    candidates.sort_by_key(|dir| dir.components().count());

    candidates
        .iter()
        .flat_map(|dir| BINARY_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Locate the recognizer: configured path, downloaded release, then `PATH`.
pub fn resolve_whisper_path(override_path: Option<&Path>, bin_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    if let Some(path) = find_in_bin_dir(bin_dir) {
        return Some(path);
    }

    // `main` is too generic a name to trust on PATH
    BINARY_NAMES
        .iter()
        .filter(|name| !name.starts_with("main"))
        .find_map(|name| which::which(name).ok())
}

/// Worker threads for the recognizer: every available core, up to `max_threads`.
pub fn recognizer_threads(max_threads: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    available.min(max_threads.max(1))
}

/// One recognizer invocation.
#[derive(Debug, Clone)]
pub struct RecognitionRequest<'a> {
    pub model: &'a Path,
    pub audio: &'a Path,
    /// The recognizer writes `<prefix>.srt`
    pub output_prefix: &'a Path,
    pub language: &'a str,
    pub threads: usize,
}

impl RecognitionRequest<'_> {
    pub fn args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.model.to_string_lossy().into_owned(),
            "-f".to_string(),
            self.audio.to_string_lossy().into_owned(),
            "-osrt".to_string(),
            "-of".to_string(),
            self.output_prefix.to_string_lossy().into_owned(),
            "-l".to_string(),
            self.language.to_string(),
            "-t".to_string(),
            self.threads.to_string(),
            "-pp".to_string(),
        ]
    }

    /// Path of the subtitle file the recognizer will write.
    pub fn srt_path(&self) -> PathBuf {
        let mut path = self.output_prefix.as_os_str().to_owned();
        path.push(".srt");
        PathBuf::from(path)
    }
}

/// Live output from a recognizer run, relative to the segment's own audio.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Progress(u8),
    /// A line of text seen for the first time
    Segment(RecognizedSegment),
}

/// A resolved whisper-cli binary.
#[derive(Debug, Clone)]
pub struct Whisper {
    path: PathBuf,
}

impl Whisper {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the recognizer over one segment's audio.
    ///
    /// Repeated segment lines from the recognizer's rolling context are
    /// filtered out before reaching `on_event`.
    pub async fn transcribe<F>(
        &self,
        segment_index: usize,
        request: &RecognitionRequest<'_>,
        token: &CancellationToken,
        mut on_event: F,
    ) -> Result<(), TranscriptionError>
    where
        F: FnMut(RecognizerEvent),
    {
        let mut command = tool_command(&self.path, request.args());
        // Release builds ship their DLLs beside the executable
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let mut dedup = SegmentDeduplicator::new();
        let result = run_streaming(command, "whisper-cli", token, RECOGNIZER_TAIL_CHARS, |_, line| {
            if let Some(pct) = parse_progress(line) {
                on_event(RecognizerEvent::Progress(pct));
            } else if let Some(segment) = dedup.accept_line(line) {
                on_event(RecognizerEvent::Segment(segment));
            }
        })
        .await
        .map_err(|e| match e {
            ProcessError::Cancelled => TranscriptionError::Cancelled,
            other => TranscriptionError::Recognition {
                segment: segment_index,
                message: other.to_string(),
                tail: String::new(),
            },
        })?;

        if !result.success() {
            return Err(TranscriptionError::Recognition {
                segment: segment_index,
                message: result.describe_exit("whisper-cli"),
                tail: result.tail,
            });
        }

        debug!("Segment {}: {} distinct lines recognized", segment_index, dedup.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_args() {
        let request = RecognitionRequest {
            model: Path::new("/models/ggml-small.bin"),
            audio: Path::new("/run/segment_0.wav"),
            output_prefix: Path::new("/run/segment_0"),
            language: "auto",
            threads: 8,
        };
        assert_eq!(
            request.args(),
            vec![
                "-m",
                "/models/ggml-small.bin",
                "-f",
                "/run/segment_0.wav",
                "-osrt",
                "-of",
                "/run/segment_0",
                "-l",
                "auto",
                "-t",
                "8",
                "-pp"
            ]
        );
        assert_eq!(request.srt_path(), PathBuf::from("/run/segment_0.srt"));
    }

    #[test]
    fn test_threads_capped() {
        assert_eq!(recognizer_threads(1), 1);
        assert!(recognizer_threads(8) <= 8);
        assert!(recognizer_threads(0) >= 1);
    }

    #[test]
    fn test_find_nested_binary() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("whisper-bin-x64").join("Release");
        std::fs::create_dir_all(&nested).unwrap();
        let exe = nested.join(BINARY_NAMES[0]);
        std::fs::write(&exe, b"").unwrap();

        assert_eq!(find_in_bin_dir(dir.path()), Some(exe));
    }

    #[test]
    fn test_find_prefers_shallow_binary() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Release");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join(BINARY_NAMES[0]), b"").unwrap();
        let top = dir.path().join(BINARY_NAMES[1]);
        std::fs::write(&top, b"").unwrap();

        assert_eq!(find_in_bin_dir(dir.path()), Some(top));
    }

    #[test]
    fn test_find_in_missing_dir() {
        assert_eq!(find_in_bin_dir(Path::new("/nonexistent/subforge/bin")), None);
    }

    #[test]
    fn test_override_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("custom-whisper");
        std::fs::write(&exe, b"").unwrap();
        assert_eq!(resolve_whisper_path(Some(&exe), dir.path()), Some(exe));
    }
}
