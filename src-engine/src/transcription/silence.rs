//! Silence interval extraction from ffmpeg `silencedetect` output.
//!
//! ffmpeg reports silences on its status stream as it encounters them:
//!
//! ```text
//! [silencedetect @ 0x5581] silence_start: 12.345
//! [silencedetect @ 0x5581] silence_end: 14.001 | silence_duration: 1.656
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static SILENCE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"silence_start:\s*([\d.]+)").unwrap());

static SILENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"silence_end:\s*([\d.]+)").unwrap());

/// A detected stretch of silence, in seconds from the start of the audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceInterval {
    pub start_sec: f64,
    pub end_sec: f64,
}

impl SilenceInterval {
    pub fn new(start_sec: f64, end_sec: f64) -> Self {
        Self { start_sec, end_sec }
    }
}

fn collect_markers(pattern: &Regex, text: &str) -> Vec<f64> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .collect()
}

/// Parse paired silence intervals from analysis output.
///
/// The i-th start marker is paired with the i-th end marker. Audio that ends
/// while still silent leaves an unpaired start, which is dropped. Output with
/// no markers yields an empty list, meaning the clip is one continuous region.
pub fn parse_silences(text: &str) -> Vec<SilenceInterval> {
    let starts = collect_markers(&SILENCE_START, text);
    let ends = collect_markers(&SILENCE_END, text);

    starts
        .into_iter()
        .zip(ends)
        .map(|(start, end)| SilenceInterval::new(start, end))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paired_silences() {
        let stderr = "\
[silencedetect @ 0x55d1] silence_start: 10
[silencedetect @ 0x55d1] silence_end: 12.5 | silence_duration: 2.5
size=N/A time=00:00:30.00 bitrate=N/A speed= 900x
[silencedetect @ 0x55d1] silence_start: 500.25
[silencedetect @ 0x55d1] silence_end: 505 | silence_duration: 4.75
";
        let silences = parse_silences(stderr);
        assert_eq!(
            silences,
            vec![
                SilenceInterval::new(10.0, 12.5),
                SilenceInterval::new(500.25, 505.0)
            ]
        );
    }

    #[test]
    fn test_unpaired_trailing_start_dropped() {
        let stderr = "\
silence_start: 1.0
silence_end: 2.0 | silence_duration: 1.0
silence_start: 58.2
";
        let silences = parse_silences(stderr);
        assert_eq!(silences, vec![SilenceInterval::new(1.0, 2.0)]);
    }

    #[test]
    fn test_no_markers_is_empty() {
        assert!(parse_silences("").is_empty());
        assert!(parse_silences("Input #0, wav, from 'audio.wav':\n  Duration: 00:10:00.00").is_empty());
    }

    #[test]
    fn test_markers_split_across_carriage_returns() {
        let stderr = "size=N/A time=00:00:05.00\rsilence_start: 3.5\rsilence_end: 4.25 | silence_duration: 0.75\r";
        assert_eq!(parse_silences(stderr), vec![SilenceInterval::new(3.5, 4.25)]);
    }
}
