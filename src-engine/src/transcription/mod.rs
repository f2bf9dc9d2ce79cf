//! Audio-to-subtitle pipeline.
//!
//! The pure pieces (silence parsing, segment planning, SRT arithmetic) live in
//! their own modules so they can be tested without any external tools.
//! [`orchestrator`] ties them to ffmpeg and whisper-cli.

pub mod orchestrator;
pub mod recognizer;
pub mod segments;
pub mod silence;
pub mod sink;
pub mod subtitles;
pub mod timecode;

pub use orchestrator::{Orchestrator, TranscriptionRequest};
pub use segments::{build_segments, AudioSegment, MAX_SEGMENT_SECS, MIN_SEGMENT_SECS, PAD_SECS};
pub use silence::{parse_silences, SilenceInterval};
pub use sink::{FnSink, NullSink, ProgressSink};
pub use subtitles::{merge_srts, offset_srt};
