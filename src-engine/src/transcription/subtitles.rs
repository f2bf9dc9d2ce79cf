//! SRT document assembly: shifting timestamps onto a global timeline and
//! merging per-segment documents into one renumbered transcript.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::timecode::{format_srt_timestamp, srt_fields_to_seconds};

static TIMING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2}),(\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2}),(\d{3})").unwrap()
});

static BLOCK_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

fn captured_seconds(caps: &Captures<'_>, first_group: usize) -> f64 {
    let field = |offset: usize| -> u64 {
        caps.get(first_group + offset)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    srt_fields_to_seconds(field(0), field(1), field(2), field(3))
}

/// Shift every `start --> end` timing line by `delta_sec`.
///
/// Results below zero are floored at zero. Everything other than the timing
/// lines is passed through untouched. A zero delta returns the input as-is.
pub fn offset_srt(document: &str, delta_sec: f64) -> String {
    if delta_sec == 0.0 {
        return document.to_string();
    }

    TIMING_LINE
        .replace_all(document, |caps: &Captures<'_>| {
            let start = captured_seconds(caps, 1) + delta_sec;
            let end = captured_seconds(caps, 5) + delta_sec;
            format!(
                "{} --> {}",
                format_srt_timestamp(start.max(0.0)),
                format_srt_timestamp(end.max(0.0))
            )
        })
        .into_owned()
}

/// Merge documents into a single transcript, renumbering blocks from 1.
///
/// Documents are taken in the given order, which must already be
/// chronological and on a shared timeline. Blank documents are skipped and
/// blocks with fewer than two lines are dropped.
pub fn merge_srts<S: AsRef<str>>(documents: &[S]) -> String {
    let mut counter = 1usize;
    let mut blocks: Vec<String> = Vec::new();

    for document in documents {
        let normalized = document.as_ref().replace("\r\n", "\n");
        let trimmed = normalized.trim();
        if trimmed.is_empty() {
            continue;
        }

        for block in BLOCK_SEPARATOR.split(trimmed) {
            let lines: Vec<&str> = block.trim().split('\n').collect();
            if lines.len() < 2 {
                continue;
            }

            let mut renumbered = Vec::with_capacity(lines.len());
            renumbered.push(counter.to_string());
            renumbered.extend(lines[1..].iter().map(|line| line.to_string()));
            blocks.push(renumbered.join("\n"));
            counter += 1;
        }
    }

    let mut merged = blocks.join("\n\n");
    merged.push('\n');
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
1
00:00:01,000 --> 00:00:03,500
Call me Ishmael.

2
00:00:04,000 --> 00:00:07,250
Some years ago, never mind how long precisely,
having little or no money in my purse,
";

    #[test]
    fn test_offset_zero_is_identity() {
        assert_eq!(offset_srt(DOC, 0.0), DOC);
    }

    #[test]
    fn test_offset_shifts_timing_lines_only() {
        let shifted = offset_srt(DOC, 3600.25);
        assert!(shifted.contains("01:00:01,250 --> 01:00:03,750"));
        assert!(shifted.contains("01:00:04,250 --> 01:00:07,500"));
        assert!(shifted.contains("Call me Ishmael."));
        assert!(shifted.starts_with("1\n"));
    }

    #[test]
    fn test_offset_is_additive() {
        let once = offset_srt(&offset_srt(DOC, 12.5), 600.0);
        let direct = offset_srt(DOC, 612.5);
        assert_eq!(once, direct);
    }

    #[test]
    fn test_offset_floors_at_zero() {
        let shifted = offset_srt(DOC, -2.0);
        assert!(shifted.contains("00:00:00,000 --> 00:00:01,500"));
        assert!(shifted.contains("00:00:02,000 --> 00:00:05,250"));
    }

    #[test]
    fn test_offset_leaves_text_timestamps_alone() {
        let doc = "1\n00:00:00,500 --> 00:00:01,000\nMeet me at 12:30 sharp\n";
        let shifted = offset_srt(doc, 10.0);
        assert_eq!(shifted, "1\n00:00:10,500 --> 00:00:11,000\nMeet me at 12:30 sharp\n");
    }

    #[test]
    fn test_merge_single_renumbers_from_one() {
        let doc = "\
7
00:00:01,000 --> 00:00:02,000
first

9
00:00:03,000 --> 00:00:04,000
second
";
        let merged = merge_srts(&[doc]);
        assert_eq!(
            merged,
            "1\n00:00:01,000 --> 00:00:02,000\nfirst\n\n2\n00:00:03,000 --> 00:00:04,000\nsecond\n"
        );
    }

    #[test]
    fn test_merge_concatenates_in_order() {
        let a = "1\n00:00:01,000 --> 00:00:02,000\nalpha\n";
        let b = "1\n00:20:00,000 --> 00:20:01,000\nbeta\n\n2\n00:20:02,000 --> 00:20:03,000\ngamma\n";
        let merged = merge_srts(&[a, "", "   \n", b]);

        let numbers: Vec<&str> = merged
            .split("\n\n")
            .filter_map(|block| block.lines().next())
            .collect();
        assert_eq!(numbers, vec!["1", "2", "3"]);
        assert!(merged.find("alpha").unwrap() < merged.find("beta").unwrap());
        assert!(merged.find("beta").unwrap() < merged.find("gamma").unwrap());
        assert!(merged.ends_with("gamma\n"));
    }

    #[test]
    fn test_merge_drops_malformed_blocks() {
        let doc = "1\n00:00:01,000 --> 00:00:02,000\nkept\n\n42\n\n3\n00:00:05,000 --> 00:00:06,000\nalso kept\n";
        let merged = merge_srts(&[doc]);
        assert_eq!(
            merged,
            "1\n00:00:01,000 --> 00:00:02,000\nkept\n\n2\n00:00:05,000 --> 00:00:06,000\nalso kept\n"
        );
    }

    #[test]
    fn test_merge_handles_crlf_and_whitespace_separators() {
        let doc = "1\r\n00:00:01,000 --> 00:00:02,000\r\none\r\n \r\n2\r\n00:00:03,000 --> 00:00:04,000\r\ntwo\r\n";
        let merged = merge_srts(&[doc]);
        assert_eq!(
            merged,
            "1\n00:00:01,000 --> 00:00:02,000\none\n\n2\n00:00:03,000 --> 00:00:04,000\ntwo\n"
        );
    }

    #[test]
    fn test_merge_nothing() {
        let empty: [&str; 0] = [];
        assert_eq!(merge_srts(&empty), "\n");
        assert_eq!(merge_srts(&["", "\n\n"]), "\n");
    }
}
