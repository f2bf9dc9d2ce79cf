//! Silence-aware segmentation of long audio into recognizer-sized pieces.
//!
//! The recognizer handles bounded chunks best, so the normalized audio is cut
//! into segments between [`MIN_SEGMENT_SECS`] and [`MAX_SEGMENT_SECS`] long,
//! preferring cut points inside detected silences.

use super::silence::SilenceInterval;

/// Segments shorter than this are absorbed into the preceding segment.
pub const MIN_SEGMENT_SECS: f64 = 60.0;

/// Hard ceiling on a segment's unpadded length.
pub const MAX_SEGMENT_SECS: f64 = 1200.0;

/// Symmetric boundary expansion so words at cut points are heard in full.
pub const PAD_SECS: f64 = 0.35;

/// A time range of the normalized audio submitted to the recognizer as one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSegment {
    pub index: usize,
    /// Padded and clamped to `[0, total_duration]`
    pub start_sec: f64,
    /// Padded and clamped to `[0, total_duration]`
    pub end_sec: f64,
    pub duration_sec: f64,
}

type Span = (f64, f64);

/// Complement of the silences within `[0, total]`.
fn speech_spans(silences: &[SilenceInterval], total: f64) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = 0.0;

    for silence in silences {
        if silence.start_sec > cursor {
            spans.push((cursor, silence.start_sec));
        }
        cursor = silence.end_sec;
    }
    if cursor < total {
        spans.push((cursor, total));
    }

    if spans.is_empty() {
        spans.push((0.0, total));
    }
    spans
}

/// Greedily extend chunks while they stay within the ceiling.
/// Silence gaps between merged spans become part of the chunk.
fn coalesce(spans: &[Span]) -> Vec<Span> {
    let mut chunks = Vec::new();
    let Some(&(first_start, first_end)) = spans.first() else {
        return chunks;
    };

    let (mut chunk_start, mut chunk_end) = (first_start, first_end);
    for &(span_start, span_end) in &spans[1..] {
        if span_end - chunk_start <= MAX_SEGMENT_SECS {
            chunk_end = span_end;
        } else {
            chunks.push((chunk_start, chunk_end));
            chunk_start = span_start;
            chunk_end = span_end;
        }
    }
    chunks.push((chunk_start, chunk_end));
    chunks
}

/// Slice chunks that still exceed the ceiling into fixed-length pieces.
fn hard_split(chunks: Vec<Span>) -> Vec<Span> {
    let mut pieces = Vec::with_capacity(chunks.len());

    for (start, end) in chunks {
        if end - start <= MAX_SEGMENT_SECS {
            pieces.push((start, end));
            continue;
        }
        let mut pos = start;
        while pos < end {
            let piece_end = (pos + MAX_SEGMENT_SECS).min(end);
            pieces.push((pos, piece_end));
            pos = piece_end;
        }
    }
    pieces
}

/// Fold short chunks into their predecessor. A short first chunk has no
/// predecessor and is kept as-is.
fn absorb_short(chunks: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(chunks.len());

    for (start, end) in chunks {
        match merged.last_mut() {
            Some(previous) if end - start < MIN_SEGMENT_SECS => previous.1 = end,
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Build padded recognizer segments from detected silences.
///
/// The steps run in a fixed order: invert silences into speech spans,
/// coalesce spans up to the ceiling, hard-split anything still too long,
/// absorb short chunks, then pad and clamp. A non-positive duration yields
/// no segments.
pub fn build_segments(silences: &[SilenceInterval], total_duration_sec: f64) -> Vec<AudioSegment> {
    if total_duration_sec <= 0.0 || !total_duration_sec.is_finite() {
        return Vec::new();
    }

    let spans = speech_spans(silences, total_duration_sec);
    let chunks = absorb_short(hard_split(coalesce(&spans)));

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let start_sec = (start - PAD_SECS).max(0.0);
            let end_sec = (end + PAD_SECS).min(total_duration_sec);
            AudioSegment {
                index,
                start_sec,
                end_sec,
                duration_sec: end_sec - start_sec,
            }
        })
        .collect()
}
