//! Conversions between seconds and the textual time formats used by SRT
//! documents, ffmpeg/whisper status streams and progress display.

/// Format seconds as an SRT timestamp `HH:MM:SS,mmm`.
///
/// Negative input is clamped to zero. Milliseconds are rounded, carrying into
/// the seconds field rather than producing `,1000`.
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Seconds represented by SRT timestamp fields.
pub fn srt_fields_to_seconds(hours: u64, minutes: u64, seconds: u64, millis: u64) -> f64 {
    (hours * 3600 + minutes * 60 + seconds) as f64 + millis as f64 / 1000.0
}

/// Format elapsed seconds as a wall-clock display string `HH:MM:SS`.
///
/// Fractional seconds are truncated.
pub fn format_clock(seconds: f64) -> String {
    let total_secs = seconds.max(0.0).floor() as u64;
    let secs = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Parse `HH:MM:SS`, `HH:MM:SS.fff` or `HH:MM:SS,fff` into seconds.
///
/// Returns `None` for malformed or negative input.
pub fn parse_clock(text: &str) -> Option<f64> {
    let normalized = text.trim().replace(',', ".");
    let mut parts = normalized.split(':');

    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    if hours < 0.0 || minutes < 0.0 || seconds < 0.0 || normalized.starts_with('-') {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
