//! Validation of caller-supplied transcription parameters.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Recognizer language: `auto` or an ISO 639-1/639-3 code.
static LANGUAGE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(auto|[a-z]{2,3})$").unwrap());

/// Maximum path length in characters.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// No input files were given
    #[error("No input audio files given")]
    NoInputs,
    /// Path contains null bytes
    #[error("Path contains null byte")]
    ContainsNullByte,
    /// Path is too long
    #[error("Path too long: {0} chars")]
    TooLong(usize),
    /// Input does not exist
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),
    /// Input exists but is not a regular file
    #[error("Input is not a file: {0}")]
    NotAFile(PathBuf),
    /// Language code not understood by the recognizer
    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),
}

impl From<ValidationError> for String {
    fn from(err: ValidationError) -> Self {
        err.to_string()
    }
}

fn check_path_text(path: &Path) -> Result<(), ValidationError> {
    let path_str = path.to_string_lossy();

    if path_str.contains('\0') {
        return Err(ValidationError::ContainsNullByte);
    }

    if path_str.len() > MAX_PATH_LENGTH {
        return Err(ValidationError::TooLong(path_str.len()));
    }

    Ok(())
}

/// Validate a single input audio path and return it made absolute.
pub fn validate_input_audio(path: &Path) -> Result<PathBuf, ValidationError> {
    check_path_text(path)?;

    let metadata =
        std::fs::metadata(path).map_err(|_| ValidationError::NotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ValidationError::NotAFile(path.to_path_buf()));
    }

    // Canonical paths keep the ffmpeg concat list independent of the working directory.
    std::fs::canonicalize(path).map_err(|_| ValidationError::NotFound(path.to_path_buf()))
}

/// Validate an ordered list of input audio paths.
pub fn validate_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ValidationError> {
    if paths.is_empty() {
        return Err(ValidationError::NoInputs);
    }
    paths.iter().map(|p| validate_input_audio(p)).collect()
}

/// Validate an output file path (the file itself need not exist).
pub fn validate_output_path(path: &Path) -> Result<(), ValidationError> {
    check_path_text(path)
}

/// Validate a recognizer language code.
pub fn validate_language(code: &str) -> Result<(), ValidationError> {
    if LANGUAGE_PATTERN.is_match(code) {
        Ok(())
    } else {
        Err(ValidationError::InvalidLanguage(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_language() {
        assert!(validate_language("auto").is_ok());
        assert!(validate_language("en").is_ok());
        assert!(validate_language("yue").is_ok());
        assert!(validate_language("EN").is_err());
        assert!(validate_language("english").is_err());
        assert!(validate_language("").is_err());
    }

    #[test]
    fn test_validate_inputs_empty() {
        assert_eq!(validate_inputs(&[]), Err(ValidationError::NoInputs));
    }

    #[test]
    fn test_validate_input_missing() {
        let path = PathBuf::from("/definitely/not/here/book.m4b");
        assert_eq!(
            validate_input_audio(&path),
            Err(ValidationError::NotFound(path.clone()))
        );
    }

    #[test]
    fn test_validate_input_directory() {
        let dir = std::env::temp_dir();
        assert!(matches!(
            validate_input_audio(&dir),
            Err(ValidationError::NotAFile(_))
        ));
    }

    #[test]
    fn test_validate_input_file() {
        let path = std::env::temp_dir().join(format!("subforge-validate-{}.mp3", std::process::id()));
        std::fs::write(&path, b"ID3").unwrap();
        let validated = validate_input_audio(&path).unwrap();
        assert!(validated.is_absolute());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_validate_output_too_long() {
        let long = "a".repeat(MAX_PATH_LENGTH + 1);
        assert_eq!(
            validate_output_path(Path::new(&long)),
            Err(ValidationError::TooLong(MAX_PATH_LENGTH + 1))
        );
    }
}
