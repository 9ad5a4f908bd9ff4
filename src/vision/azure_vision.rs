//! Azure Computer Vision backend
//!
//! Uses the synchronous `vision/v3.2/ocr` endpoint. The endpoint does not
//! report word confidence, so every successful result carries
//! [`AZURE_FIXED_CONFIDENCE`].

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::engine::{EngineKind, EngineOutput, OcrEngine, RecognizeOptions};
use crate::config::AzureVisionConfig;
use crate::error::OcrError;

/// Confidence reported for every successful Azure result
pub const AZURE_FIXED_CONFIDENCE: f32 = 85.0;

/// Languages accepted by the v3.2 OCR endpoint
const AZURE_OCR_LANGUAGES: &[&str] = &[
    "zh-Hans", "zh-Hant", "cs", "da", "nl", "en", "fi", "fr", "de", "el", "hu", "it", "ja", "ko",
    "nb", "pl", "pt", "ru", "es", "sv", "tr", "ar", "ro", "sr-Cyrl", "sr-Latn", "sk",
];

/// Azure Computer Vision REST client
pub struct AzureVisionEngine {
    config: AzureVisionConfig,
    client: reqwest::blocking::Client,
}

impl AzureVisionEngine {
    pub fn new(config: AzureVisionConfig) -> Result<Self, OcrError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OcrError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn is_configured(&self) -> bool {
        !self.config.subscription_key.trim().is_empty() && !self.config.endpoint.trim().is_empty()
    }

    /// The endpoint takes a single language; `unk` asks it to detect one
    fn language_param(&self, options: &RecognizeOptions) -> String {
        options
            .languages
            .first()
            .or_else(|| self.config.languages.first())
            .cloned()
            .unwrap_or_else(|| "unk".to_string())
    }

    fn try_recognize(&self, path: &Path, options: &RecognizeOptions) -> Result<EngineOutput, OcrError> {
        if !self.is_configured() {
            return Err(OcrError::engine(
                EngineKind::AzureVision.as_str(),
                "subscription_key and endpoint must be configured",
            ));
        }

        let bytes = std::fs::read(path)?;
        let url = format!("{}/vision/v3.2/ocr", self.config.endpoint.trim_end_matches('/'));
        let language = self.language_param(options);

        debug!(file = %path.display(), bytes = bytes.len(), language = %language, "Calling Azure OCR");

        let response = self
            .client
            .post(&url)
            .query(&[("language", language.as_str()), ("detectOrientation", "true")])
            .header("Ocp-Apim-Subscription-Key", self.config.subscription_key.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()?;

        let status = response.status();
        let payload = response.text()?;
        if !status.is_success() {
            return Err(OcrError::engine(
                EngineKind::AzureVision.as_str(),
                format!("HTTP {}: {}", status, payload.trim()),
            ));
        }

        parse_ocr_response(&payload)
    }
}

impl OcrEngine for AzureVisionEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::AzureVision
    }

    fn recognize(&self, path: &Path, options: &RecognizeOptions) -> EngineOutput {
        match self.try_recognize(path, options) {
            Ok(output) => output,
            Err(e) => {
                warn!("Azure OCR recognition failed: {}", e);
                EngineOutput::failure(EngineKind::AzureVision, e.to_string())
            }
        }
    }

    fn is_available(&self) -> bool {
        self.config.enabled && self.is_configured()
    }

    fn supported_languages(&self) -> Vec<String> {
        AZURE_OCR_LANGUAGES.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcrResponse {
    language: Option<String>,
    orientation: Option<String>,
    text_angle: Option<f32>,
    #[serde(default)]
    regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
struct Region {
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Deserialize)]
struct Word {
    text: String,
}

fn parse_ocr_response(payload: &str) -> Result<EngineOutput, OcrError> {
    let response: OcrResponse = serde_json::from_str(payload)?;

    let text = response
        .regions
        .iter()
        .map(|region| {
            region
                .lines
                .iter()
                .map(|line| {
                    line.words
                        .iter()
                        .map(|w| w.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut output = EngineOutput::success(EngineKind::AzureVision, text, AZURE_FIXED_CONFIDENCE);
    output.language = response.language.filter(|l| l != "unk");
    output.orientation = response.orientation.filter(|o| !o.is_empty() && o != "NotDetected");
    output.text_angle = response.text_angle.filter(|a| a.is_finite());
    output.text_regions = response.regions.len();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regions_into_text() {
        let payload = r#"{
            "language": "es",
            "textAngle": -0.0524,
            "orientation": "Up",
            "regions": [
                {"boundingBox": "0,0,10,10", "lines": [
                    {"boundingBox": "0,0,10,5", "words": [{"boundingBox": "0,0,5,5", "text": "Serie"}, {"boundingBox": "5,0,5,5", "text": "documental"}]},
                    {"boundingBox": "0,5,10,5", "words": [{"boundingBox": "0,5,5,5", "text": "TRD"}]}
                ]},
                {"boundingBox": "0,20,10,10", "lines": [
                    {"boundingBox": "0,20,10,5", "words": [{"boundingBox": "0,20,5,5", "text": "Folio"}]}
                ]}
            ]
        }"#;

        let out = parse_ocr_response(payload).unwrap();
        assert!(out.success);
        assert_eq!(out.text, "Serie documental\nTRD\n\nFolio");
        assert_eq!(out.language.as_deref(), Some("es"));
        assert_eq!(out.orientation.as_deref(), Some("Up"));
        assert_eq!(out.text_angle, Some(-0.0524));
        assert_eq!(out.text_regions, 2);
    }

    #[test]
    fn test_confidence_is_always_fixed() {
        let empty = parse_ocr_response(r#"{"regions": []}"#).unwrap();
        assert_eq!(empty.confidence, 85.0);

        let one = parse_ocr_response(r#"{"regions": [{"lines": [{"words": [{"text": "a"}]}]}]}"#).unwrap();
        assert_eq!(one.confidence, 85.0);
    }

    #[test]
    fn test_undetected_orientation_is_dropped() {
        let out = parse_ocr_response(r#"{"language": "unk", "orientation": "NotDetected", "regions": []}"#).unwrap();
        assert!(out.language.is_none());
        assert!(out.orientation.is_none());
        assert!(out.text_angle.is_none());
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(parse_ocr_response("not json").is_err());
    }

    #[test]
    fn test_language_param() {
        let engine = AzureVisionEngine::new(AzureVisionConfig::default()).unwrap();
        assert_eq!(engine.language_param(&RecognizeOptions::default()), "es");

        let options = RecognizeOptions {
            languages: vec!["en".to_string()],
            psm: None,
        };
        assert_eq!(engine.language_param(&options), "en");

        let bare = AzureVisionEngine::new(AzureVisionConfig {
            languages: vec![],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(bare.language_param(&RecognizeOptions::default()), "unk");
    }

    #[test]
    fn test_unconfigured_recognize_fails_gracefully() {
        let engine = AzureVisionEngine::new(AzureVisionConfig::default()).unwrap();
        let out = engine.recognize(Path::new("scan.png"), &RecognizeOptions::default());
        assert!(!out.success);
        assert!(out.error.unwrap().contains("subscription_key"));
        assert!(!engine.is_available());
    }

    #[test]
    fn test_supported_languages_include_spanish() {
        let engine = AzureVisionEngine::new(AzureVisionConfig::default()).unwrap();
        assert!(engine.supported_languages().contains(&"es".to_string()));
    }
}
