//! Google Cloud Vision backend
//!
//! Sends the image to `images:annotate` with DOCUMENT_TEXT_DETECTION and
//! averages the per-word confidences.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::engine::{mean_positive, EngineKind, EngineOutput, OcrEngine, RecognizeOptions, WordConfidence};
use crate::config::CloudVisionConfig;
use crate::error::OcrError;

/// Cloud Vision REST client
pub struct CloudVisionEngine {
    config: CloudVisionConfig,
    client: reqwest::blocking::Client,
}

impl CloudVisionEngine {
    pub fn new(config: CloudVisionConfig) -> Result<Self, OcrError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OcrError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty() && !self.config.project_id.trim().is_empty()
    }

    fn try_recognize(&self, path: &Path, options: &RecognizeOptions) -> Result<EngineOutput, OcrError> {
        if !self.is_configured() {
            return Err(OcrError::engine(
                EngineKind::CloudVision.as_str(),
                "api_key and project_id must be configured",
            ));
        }

        let bytes = std::fs::read(path)?;
        let hints = if options.languages.is_empty() {
            &self.config.languages
        } else {
            &options.languages
        };

        let body = json!({
            "requests": [{
                "image": { "content": BASE64_STANDARD.encode(&bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
                "imageContext": { "languageHints": hints },
            }]
        });

        let url = format!("{}/v1/images:annotate", self.config.endpoint.trim_end_matches('/'));
        debug!(file = %path.display(), bytes = bytes.len(), "Calling Cloud Vision");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .header("x-goog-user-project", self.config.project_id.as_str())
            .json(&body)
            .send()?;

        let status = response.status();
        let payload = response.text()?;
        if !status.is_success() {
            return Err(OcrError::engine(
                EngineKind::CloudVision.as_str(),
                format!("HTTP {}: {}", status, payload.trim()),
            ));
        }

        parse_annotate_response(&payload)
    }
}

impl OcrEngine for CloudVisionEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::CloudVision
    }

    fn recognize(&self, path: &Path, options: &RecognizeOptions) -> EngineOutput {
        match self.try_recognize(path, options) {
            Ok(output) => output,
            Err(e) => {
                warn!("Cloud Vision recognition failed: {}", e);
                EngineOutput::failure(EngineKind::CloudVision, e.to_string())
            }
        }
    }

    fn is_available(&self) -> bool {
        self.config.enabled && self.is_configured()
    }

    fn supported_languages(&self) -> Vec<String> {
        self.config.languages.clone()
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    property: Option<TextProperty>,
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextProperty {
    #[serde(default)]
    detected_languages: Vec<DetectedLanguage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguage {
    language_code: String,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Deserialize)]
struct Paragraph {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Deserialize)]
struct Word {
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    symbols: Vec<Symbol>,
}

#[derive(Debug, Deserialize)]
struct Symbol {
    #[serde(default)]
    text: String,
}

/// Convert an `images:annotate` response body into engine output.
///
/// Word confidences arrive in 0-1 and are scaled to 0-100.
fn parse_annotate_response(payload: &str) -> Result<EngineOutput, OcrError> {
    let response: AnnotateResponse = serde_json::from_str(payload)?;
    let Some(image) = response.responses.into_iter().next() else {
        return Err(OcrError::engine(EngineKind::CloudVision.as_str(), "empty response"));
    };

    if let Some(status) = image.error {
        return Err(OcrError::engine(EngineKind::CloudVision.as_str(), status.message));
    }

    // No annotation means no text was found
    let Some(annotation) = image.full_text_annotation else {
        return Ok(EngineOutput::success(EngineKind::CloudVision, String::new(), 0.0));
    };

    let mut words = Vec::new();
    let mut regions = 0usize;
    let mut language = None;

    for page in &annotation.pages {
        if language.is_none() {
            language = page
                .property
                .as_ref()
                .and_then(|p| p.detected_languages.first())
                .map(|l| l.language_code.clone());
        }
        regions += page.blocks.len();
        for word in page.blocks.iter().flat_map(|b| &b.paragraphs).flat_map(|p| &p.words) {
            words.push(WordConfidence {
                text: word.symbols.iter().map(|s| s.text.as_str()).collect(),
                confidence: word.confidence * 100.0,
            });
        }
    }

    let confidence = mean_positive(words.iter().map(|w| w.confidence));
    let mut output = EngineOutput::success(EngineKind::CloudVision, annotation.text, confidence);
    output.language = language;
    output.text_regions = regions;
    output.words = words;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, confidence: f32) -> serde_json::Value {
        json!({
            "confidence": confidence,
            "symbols": text.chars().map(|c| json!({ "text": c.to_string() })).collect::<Vec<_>>(),
        })
    }

    #[test]
    fn test_confidence_scaled_and_averaged() {
        let payload = json!({
            "responses": [{
                "fullTextAnnotation": {
                    "text": "Hola mundo\n",
                    "pages": [{
                        "property": { "detectedLanguages": [{ "languageCode": "es", "confidence": 0.9 }] },
                        "blocks": [{ "paragraphs": [{ "words": [word("Hola", 0.9), word("mundo", 0.7), word("x", 0.0)] }] }]
                    }]
                }
            }]
        })
        .to_string();

        let out = parse_annotate_response(&payload).unwrap();
        assert!(out.success);
        assert_eq!(out.text, "Hola mundo\n");
        assert!((out.confidence - 80.0).abs() < 0.01);
        assert_eq!(out.language.as_deref(), Some("es"));
        assert_eq!(out.text_regions, 1);
        assert_eq!(out.words[0].text, "Hola");
    }

    #[test]
    fn test_no_annotation_is_empty_success() {
        let out = parse_annotate_response(r#"{"responses":[{}]}"#).unwrap();
        assert!(out.success);
        assert!(out.text.is_empty());
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn test_api_error_is_engine_error() {
        let payload = r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#;
        let err = parse_annotate_response(payload).unwrap_err();
        assert!(err.to_string().contains("Bad image data."));
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(parse_annotate_response("<html>").is_err());
        assert!(parse_annotate_response(r#"{"responses":[]}"#).is_err());
    }

    #[test]
    fn test_availability_requires_credentials() {
        let mut config = CloudVisionConfig {
            enabled: true,
            ..Default::default()
        };
        let engine = CloudVisionEngine::new(config.clone()).unwrap();
        assert!(!engine.is_available());

        config.api_key = "key".to_string();
        config.project_id = "archivey".to_string();
        let engine = CloudVisionEngine::new(config).unwrap();
        assert!(engine.is_available());
    }

    #[test]
    fn test_unconfigured_recognize_fails_gracefully() {
        let engine = CloudVisionEngine::new(CloudVisionConfig::default()).unwrap();
        let out = engine.recognize(Path::new("scan.png"), &RecognizeOptions::default());
        assert!(!out.success);
        assert!(out.text.is_empty());
        assert!(out.error.is_some());
    }
}
