//! Error taxonomy for the OCR pipeline

use thiserror::Error;

/// Errors raised inside the OCR pipeline.
///
/// Only `Configuration` escapes to callers (from service construction).
/// Everything else is folded into a failed `RecognitionResult` or degraded
/// locally.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("{0}")]
    Validation(String),

    #[error("{engine} engine failed: {message}")]
    Engine { engine: String, message: String },

    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Barcode detection failed: {0}")]
    Barcode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OcrError {
    /// Build an engine error tagged with the engine name
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_message() {
        let err = OcrError::engine("tesseract", "binary not found");
        assert_eq!(err.to_string(), "tesseract engine failed: binary not found");
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = OcrError::Validation("File not found: a.png".to_string());
        assert_eq!(err.to_string(), "File not found: a.png");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: OcrError = io.into();
        assert!(matches!(err, OcrError::Io(_)));
    }
}
