//! Exit codes for the CLI.
//!
//! These codes enable scripting integration by providing structured
//! feedback about operation results.

use subforge_engine::TranscriptionError;

/// Exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Invalid command-line arguments or input files
    InvalidArguments = 2,
    /// Recognizer, model or ffmpeg could not be obtained
    AcquisitionFailed = 3,
    /// Decoding, concatenation or silence detection failed
    AudioPreparationFailed = 4,
    /// The recognizer failed on a segment
    RecognitionFailed = 5,
    /// Interrupted with Ctrl-C
    UserCancelled = 6,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_error(err: &TranscriptionError) -> Self {
        match err {
            _ if err.is_cancelled() => ExitCode::UserCancelled,
            TranscriptionError::Validation(_) => ExitCode::InvalidArguments,
            TranscriptionError::Acquisition(_) => ExitCode::AcquisitionFailed,
            TranscriptionError::Normalization { .. } | TranscriptionError::Analysis { .. } => {
                ExitCode::AudioPreparationFailed
            }
            TranscriptionError::Recognition { .. } => ExitCode::RecognitionFailed,
            TranscriptionError::Io(_) | TranscriptionError::Cancelled => ExitCode::GeneralError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::GeneralError => write!(f, "general error"),
            ExitCode::InvalidArguments => write!(f, "invalid arguments"),
            ExitCode::AcquisitionFailed => write!(f, "acquisition failed"),
            ExitCode::AudioPreparationFailed => write!(f, "audio preparation failed"),
            ExitCode::RecognitionFailed => write!(f, "recognition failed"),
            ExitCode::UserCancelled => write!(f, "user cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subforge_common::validation::ValidationError;
    use subforge_engine::AssetError;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ExitCode::from_error(&TranscriptionError::Cancelled),
            ExitCode::UserCancelled
        );
        assert_eq!(
            ExitCode::from_error(&TranscriptionError::Acquisition(AssetError::Cancelled)),
            ExitCode::UserCancelled
        );
        assert_eq!(
            ExitCode::from_error(&TranscriptionError::Acquisition(AssetError::UnsupportedPlatform)),
            ExitCode::AcquisitionFailed
        );
        assert_eq!(
            ExitCode::from_error(&TranscriptionError::Validation(ValidationError::NoInputs)),
            ExitCode::InvalidArguments
        );
        assert_eq!(
            ExitCode::from_error(&TranscriptionError::Analysis {
                message: "ffmpeg exited with code 1".to_string(),
                tail: String::new(),
            }),
            ExitCode::AudioPreparationFailed
        );
        assert_eq!(
            ExitCode::from_error(&TranscriptionError::Recognition {
                segment: 3,
                message: "whisper-cli exited with code 1".to_string(),
                tail: String::new(),
            }),
            ExitCode::RecognitionFailed
        );
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ExitCode::Success,
            ExitCode::GeneralError,
            ExitCode::InvalidArguments,
            ExitCode::AcquisitionFailed,
            ExitCode::AudioPreparationFailed,
            ExitCode::RecognitionFailed,
            ExitCode::UserCancelled,
        ];
        for (i, code) in codes.iter().enumerate() {
            assert_eq!(code.as_i32(), i as i32);
        }
    }
}
