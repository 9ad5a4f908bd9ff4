//! OCR engine contract
//!
//! Every backend implements [`OcrEngine`]. The active backend is chosen once
//! from the configuration key and never changes for the life of the service.

use serde::Serialize;
use std::path::Path;

use super::azure_vision::AzureVisionEngine;
use super::cloud_vision::CloudVisionEngine;
use super::tesseract::TesseractEngine;
use crate::config::EnginesConfig;
use crate::error::OcrError;

/// Engine selection key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Local Tesseract binary
    Tesseract,
    /// Google Cloud Vision
    CloudVision,
    /// Azure Computer Vision
    AzureVision,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Tesseract => "tesseract",
            EngineKind::CloudVision => "cloud_vision",
            EngineKind::AzureVision => "azure_vision",
        }
    }

    /// Parse a configuration key, failing on anything unrecognized
    pub fn parse(key: &str) -> Result<Self, OcrError> {
        match key.trim() {
            "tesseract" => Ok(EngineKind::Tesseract),
            "cloud_vision" => Ok(EngineKind::CloudVision),
            "azure_vision" => Ok(EngineKind::AzureVision),
            other => Err(OcrError::Configuration(format!(
                "Unsupported OCR engine: '{}' (expected tesseract, cloud_vision or azure_vision)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-call recognition options
#[derive(Debug, Clone, Default)]
pub struct RecognizeOptions {
    /// Overrides the engine's configured languages when non-empty
    pub languages: Vec<String>,
    /// Page segmentation mode (Tesseract only)
    pub psm: Option<u32>,
}

/// Confidence for a single recognized token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordConfidence {
    pub text: String,
    pub confidence: f32,
}

/// Normalized output of one engine call
#[derive(Debug, Clone, Serialize)]
pub struct EngineOutput {
    pub success: bool,
    pub text: String,
    /// Always within 0-100
    pub confidence: f32,
    pub engine: EngineKind,
    pub error: Option<String>,
    /// Language the engine reported, if any
    pub language: Option<String>,
    /// Orientation the engine reported, if any
    pub orientation: Option<String>,
    /// Rotation of the text in degrees, if the engine measured it
    pub text_angle: Option<f32>,
    /// Number of text blocks/regions the engine found
    pub text_regions: usize,
    /// Token-level confidences, where the engine provides them
    pub words: Vec<WordConfidence>,
}

impl EngineOutput {
    /// Successful output with the confidence clamped into 0-100
    pub fn success(engine: EngineKind, text: String, confidence: f32) -> Self {
        Self {
            success: true,
            text,
            confidence: clamp_confidence(confidence),
            engine,
            error: None,
            language: None,
            orientation: None,
            text_angle: None,
            text_regions: 0,
            words: Vec::new(),
        }
    }

    /// Failed output carrying the error message
    pub fn failure(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            confidence: 0.0,
            engine,
            error: Some(message.into()),
            language: None,
            orientation: None,
            text_angle: None,
            text_regions: 0,
            words: Vec::new(),
        }
    }
}

/// Clamp a confidence into 0-100, mapping non-finite values to 0
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Mean of the strictly positive values, 0 when there are none
pub fn mean_positive(values: impl IntoIterator<Item = f32>) -> f32 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| *v > 0.0)
        .fold((0.0f64, 0usize), |(sum, count), v| (sum + v as f64, count + 1));

    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Capability shared by all OCR backends
pub trait OcrEngine: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> EngineKind;

    /// Recognize text in an image file. Never panics or returns an error;
    /// failures come back as `EngineOutput { success: false, .. }`.
    fn recognize(&self, path: &Path, options: &RecognizeOptions) -> EngineOutput;

    /// Whether the backend is configured and reachable
    fn is_available(&self) -> bool;

    /// Languages the backend can recognize
    fn supported_languages(&self) -> Vec<String>;
}

/// Build the adapter for `kind` from the engine settings
pub fn build_engine(kind: EngineKind, config: &EnginesConfig) -> Result<Box<dyn OcrEngine>, OcrError> {
    let engine: Box<dyn OcrEngine> = match kind {
        EngineKind::Tesseract => Box::new(TesseractEngine::new(config.tesseract.clone())),
        EngineKind::CloudVision => Box::new(CloudVisionEngine::new(config.cloud_vision.clone())?),
        EngineKind::AzureVision => Box::new(AzureVisionEngine::new(config.azure_vision.clone())?),
    };
    Ok(engine)
}
