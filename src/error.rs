use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur while locating or extracting the target array.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input file does not exist: {0}")]
    InputNotFound(PathBuf),

    #[error("no array found under key \"{key}\"")]
    TargetNotFound { key: String },

    #[error("malformed JSON: unexpected end of input inside an element")]
    TruncatedElement,

    #[error("element exceeds maximum size of {limit} bytes")]
    ElementTooLarge { limit: usize },

    #[error("invalid configuration: {0}")]
    BadConfig(String),

    #[error("writer worker failed: {0}")]
    WorkerFailure(String),
}

impl ExtractError {
    /// Process exit code for this error.
    ///
    /// Configuration and usage problems exit with 2, everything that went
    /// wrong with the input or the output pipeline exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractError::BadConfig(_) | ExtractError::InputNotFound(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExtractError::BadConfig("x".into()).exit_code(), 2);
        assert_eq!(
            ExtractError::InputNotFound(PathBuf::from("missing.json")).exit_code(),
            2
        );
        assert_eq!(
            ExtractError::TargetNotFound { key: "accounts".into() }.exit_code(),
            1
        );
        assert_eq!(ExtractError::TruncatedElement.exit_code(), 1);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(ExtractError::Io(io).exit_code(), 1);
    }

    #[test]
    fn test_messages_name_the_condition() {
        let err = ExtractError::TargetNotFound { key: "accounts".into() };
        assert!(err.to_string().contains("accounts"));

        let err = ExtractError::ElementTooLarge { limit: 1024 };
        assert!(err.to_string().contains("1024"));
    }
}
