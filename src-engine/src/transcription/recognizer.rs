//! Parsing of whisper-cli's live output.
//!
//! With `-pp` the recognizer prints `progress = NN%` on stderr, and every
//! decoded segment appears on stdout as `[00:00:01.000 --> 00:00:04.500]  text`.
//! Segments are re-printed with each new one as rolling context, so callers
//! run them through a [`SegmentDeduplicator`].

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::timecode::parse_clock;

static PROGRESS_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"progress\s*=\s*(\d+)%").unwrap());

static SEGMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([\d:.,]+)\s*-->\s*[\d:.,]+\]\s+(.+)").unwrap());

/// A transcribed line reported by the recognizer, timed relative to the
/// start of the audio it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedSegment {
    /// Start timestamp exactly as printed, used as the identity for de-duplication
    pub start_stamp: String,
    /// Start offset in seconds, when the timestamp is parseable
    pub start_sec: Option<f64>,
    pub text: String,
}

/// Extract a percentage from a `progress = NN%` line, capped at 100.
pub fn parse_progress(line: &str) -> Option<u8> {
    let caps = PROGRESS_LINE.captures(line)?;
    let pct: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(pct.min(100) as u8)
}

/// Parse a `[start --> end] text` line. Lines whose text is blank are ignored.
pub fn parse_segment_line(line: &str) -> Option<RecognizedSegment> {
    let caps = SEGMENT_LINE.captures(line)?;
    let start_stamp = caps.get(1)?.as_str().to_string();
    let text = caps.get(2)?.as_str().trim();
    if text.is_empty() {
        return None;
    }

    Some(RecognizedSegment {
        start_sec: parse_clock(&start_stamp),
        start_stamp,
        text: text.to_string(),
    })
}

/// Forwards each distinct start timestamp once.
///
/// One instance covers a single recognizer invocation; timestamps from
/// different segments of a run are local to their own audio and may repeat.
#[derive(Debug, Default)]
pub struct SegmentDeduplicator {
    seen: HashSet<String>,
}

impl SegmentDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the segment if its start timestamp has not been seen before.
    pub fn accept(&mut self, segment: RecognizedSegment) -> Option<RecognizedSegment> {
        if self.seen.insert(segment.start_stamp.clone()) {
            Some(segment)
        } else {
            None
        }
    }

    /// Parse a stdout line and de-duplicate it in one step.
    pub fn accept_line(&mut self, line: &str) -> Option<RecognizedSegment> {
        parse_segment_line(line).and_then(|segment| self.accept(segment))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("whisper_print_progress_callback: progress =  45%"), Some(45));
        assert_eq!(parse_progress("progress=100%"), Some(100));
        assert_eq!(parse_progress("progress = 250%"), Some(100));
        assert_eq!(parse_progress("whisper_init_from_file: loading model"), None);
    }

    #[test]
    fn test_parse_segment_line() {
        let segment = parse_segment_line("[00:02:34.560 --> 00:02:38.000]   It was a dark and stormy night.")
            .expect("segment line");
        assert_eq!(segment.start_stamp, "00:02:34.560");
        assert_eq!(segment.text, "It was a dark and stormy night.");
        let start = segment.start_sec.expect("parsed start");
        assert!((start - 154.56).abs() < 1e-9);
    }

    #[test]
    fn test_parse_segment_line_rejects_noise() {
        assert_eq!(parse_segment_line("system_info: n_threads = 8"), None);
        assert_eq!(parse_segment_line("[00:00:00.000 --> 00:00:02.000]    "), None);
        assert_eq!(parse_segment_line(""), None);
    }

    #[test]
    fn test_rolling_reprint_forwards_each_start_once() {
        let chunks = [
            "[00:00:00.000 --> 00:00:04.000]   Chapter one.\n",
            "[00:00:00.000 --> 00:00:04.000]   Chapter one.\n[00:00:04.000 --> 00:00:09.500]   The house stood alone.\n",
            "[00:00:04.000 --> 00:00:09.500]   The house stood alone.\n[00:00:09.500 --> 00:00:12.000]   Nobody came.\n",
        ];

        let mut dedup = SegmentDeduplicator::new();
        let forwarded: Vec<String> = chunks
            .iter()
            .flat_map(|chunk| chunk.lines())
            .filter_map(|line| dedup.accept_line(line))
            .map(|segment| segment.text)
            .collect();

        assert_eq!(
            forwarded,
            vec!["Chapter one.", "The house stood alone.", "Nobody came."]
        );
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn test_blank_text_does_not_consume_timestamp() {
        let mut dedup = SegmentDeduplicator::new();
        assert!(dedup.accept_line("[00:00:01.000 --> 00:00:02.000]   ").is_none());
        assert!(dedup.is_empty());
        assert!(dedup.accept_line("[00:00:01.000 --> 00:00:02.000]   hello").is_some());
    }
}
