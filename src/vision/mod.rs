//! OCR Layer
//!
//! Turns an image file into a [`RecognitionResult`]. Supports multiple OCR
//! backends, selected once from configuration:
//! - Tesseract (local binary)
//! - Google Cloud Vision
//! - Azure Computer Vision

pub mod azure_vision;
pub mod barcode;
pub mod cloud_vision;
pub mod engine;
pub mod metadata;
pub mod ocr_preprocess;
pub mod postprocess;
pub mod tesseract;

pub use barcode::{Barcode, BarcodeDetector, BarcodeOutcome};
pub use engine::{EngineKind, OcrEngine, RecognizeOptions};
pub use metadata::DocumentMetadata;
pub use ocr_preprocess::{ImagePreprocessor, PreprocessOutcome};

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::storage::{ArtifactPaths, Disk, LocalDisk};
use engine::{build_engine, clamp_confidence, EngineOutput};

/// Storage root used when the configuration does not name one
const FALLBACK_STORAGE_ROOT: &str = "ocr-storage";

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Overrides the engine's configured languages when non-empty
    pub languages: Vec<String>,
    /// Tesseract page segmentation mode
    pub psm: Option<u32>,
    /// Overrides whether artifacts are written to storage
    pub save_results: Option<bool>,
    /// Overrides `barcode_detection.enabled`
    pub detect_barcodes: Option<bool>,
}

impl ProcessOptions {
    fn recognize_options(&self) -> RecognizeOptions {
        RecognizeOptions {
            languages: self.languages.clone(),
            psm: self.psm,
        }
    }
}

/// Outcome of processing one file
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionResult {
    pub success: bool,
    pub text: String,
    /// 0-100 regardless of engine
    pub confidence: f32,
    pub engine: EngineKind,
    pub error: Option<String>,
    pub barcodes: Vec<Barcode>,
    pub metadata: DocumentMetadata,
    /// Whether the engine read a preprocessed image
    pub preprocessed: bool,
    /// Storage paths written for this file
    pub artifacts: Vec<String>,
    pub processing_time_ms: u64,
}

impl RecognitionResult {
    fn failure(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            confidence: 0.0,
            engine,
            error: Some(message.into()),
            barcodes: Vec::new(),
            metadata: DocumentMetadata::default(),
            preprocessed: false,
            artifacts: Vec::new(),
            processing_time_ms: 0,
        }
    }
}

/// Availability report for the active engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub engine: EngineKind,
    pub available: bool,
    pub supported_languages: Vec<String>,
    pub barcode_decoding: bool,
}

/// OCR orchestrator: validate, preprocess, recognize, postprocess, enrich,
/// persist
pub struct OcrService {
    config: OcrConfig,
    engine: Box<dyn OcrEngine>,
    preprocessor: ImagePreprocessor,
    barcode_detector: BarcodeDetector,
    disk: Box<dyn Disk>,
}

impl OcrService {
    /// Build the service for the configured engine. Fails on an unknown
    /// engine key or invalid limits.
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        let kind = config.validate()?;
        let engine = build_engine(kind, &config.engines)?;
        let root = config
            .storage
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(FALLBACK_STORAGE_ROOT));
        let disk = Box::new(LocalDisk::new(root));

        info!("OCR service initialized with {} engine", kind);
        Ok(Self::with_parts(config, engine, disk))
    }

    /// Build the service around an existing engine and disk
    pub fn with_parts(config: OcrConfig, engine: Box<dyn OcrEngine>, disk: Box<dyn Disk>) -> Self {
        let preprocessor = ImagePreprocessor::new(config.preprocessing.clone());
        let barcode_detector = BarcodeDetector::from_config(&config.barcode_detection);

        Self {
            config,
            engine,
            preprocessor,
            barcode_detector,
            disk,
        }
    }

    /// Replace the barcode detector
    #[cfg(test)]
    pub fn with_barcode_detector(mut self, detector: BarcodeDetector) -> Self {
        self.barcode_detector = detector;
        self
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Report on the active engine
    pub fn engine_status(&self) -> EngineStatus {
        EngineStatus {
            engine: self.engine.kind(),
            available: self.engine.is_available(),
            supported_languages: self.engine.supported_languages(),
            barcode_decoding: self.barcode_detector.is_available(),
        }
    }

    /// Process one image file. Never fails: every error ends up in the
    /// returned result with `success = false`.
    pub fn process(&self, path: &Path, options: &ProcessOptions) -> RecognitionResult {
        let start = Instant::now();

        let mut result = match self.run_pipeline(path, options) {
            Ok(result) => result,
            Err(e) => {
                if self.config.logging.enabled {
                    error!(
                        channel = %self.config.logging.channel,
                        file = %path.display(),
                        "OCR processing failed: {}", e
                    );
                }
                RecognitionResult::failure(self.engine.kind(), e.to_string())
            }
        };

        result.processing_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Process files one at a time in list order, keyed by input path
    pub fn process_batch(&self, paths: &[PathBuf], options: &ProcessOptions) -> BTreeMap<PathBuf, RecognitionResult> {
        info!("Processing batch of {} file(s)", paths.len());

        let mut results = BTreeMap::new();
        for path in paths {
            let result = self.process(path, options);
            results.insert(path.clone(), result);
        }
        results
    }

    /// Input checks done before any processing
    fn validate(&self, path: &Path) -> Result<u64, OcrError> {
        if !path.is_file() {
            return Err(OcrError::Validation(format!("File not found: {}", path.display())));
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !self.config.is_supported_format(&extension) {
            return Err(OcrError::Validation(format!(
                "Unsupported file format: '{}' (allowed: {})",
                extension,
                self.config.supported_formats.join(", ")
            )));
        }

        let size = std::fs::metadata(path)?.len();
        let max = self.config.processing.max_file_size;
        if size > max {
            return Err(OcrError::Validation(format!(
                "File too large: {} bytes (max {} bytes)",
                size, max
            )));
        }

        Ok(size)
    }

    fn run_pipeline(&self, path: &Path, options: &ProcessOptions) -> Result<RecognitionResult, OcrError> {
        let size = self.validate(path)?;
        debug!(file = %path.display(), size, "Input validated");

        let prepared = self.preprocessor.process(path);
        if let Some(reason) = prepared.fallback_reason() {
            if self.config.logging.enabled {
                warn!(
                    channel = %self.config.logging.channel,
                    file = %path.display(),
                    "Using original image after preprocessing failure: {}", reason
                );
            }
        }

        let output = self.engine.recognize(prepared.path(), &options.recognize_options());
        if !output.success {
            let message = output
                .error
                .unwrap_or_else(|| format!("{} returned no result", output.engine));
            return Err(OcrError::engine(output.engine.as_str(), message));
        }

        let text = if self.config.postprocessing.enabled {
            postprocess::apply(&output.text, &self.config.postprocessing)
        } else {
            output.text.clone()
        };

        let metadata = self.extract_metadata(path, &text, &output);

        let detect_barcodes = options
            .detect_barcodes
            .unwrap_or(self.config.barcode_detection.enabled);
        let barcodes = if detect_barcodes {
            let outcome = self.barcode_detector.detect(prepared.path());
            if let BarcodeOutcome::Failed(reason) = &outcome {
                if self.config.logging.enabled {
                    warn!(
                        channel = %self.config.logging.channel,
                        file = %path.display(),
                        "Barcode detection failed, continuing without barcodes: {}", reason
                    );
                }
            }
            outcome.into_barcodes()
        } else {
            Vec::new()
        };

        let save = options.save_results.unwrap_or(true);
        let artifacts = if save {
            self.persist(path, &prepared, &text, &output)
        } else {
            Vec::new()
        };

        let confidence = clamp_confidence(output.confidence);
        if self.config.logging.enabled {
            info!(
                channel = %self.config.logging.channel,
                file = %path.display(),
                engine = %output.engine,
                confidence,
                text_length = text.len(),
                "OCR processing completed"
            );
        }

        Ok(RecognitionResult {
            success: true,
            text,
            confidence,
            engine: output.engine,
            error: None,
            barcodes,
            metadata,
            preprocessed: prepared.is_transformed(),
            artifacts,
            processing_time_ms: 0,
        })
    }

    fn extract_metadata(&self, path: &Path, text: &str, output: &EngineOutput) -> DocumentMetadata {
        let settings = &self.config.metadata_extraction;
        let mut meta = DocumentMetadata {
            text_regions: output.text_regions,
            word_count: text.split_whitespace().count(),
            character_count: text.chars().count(),
            ..Default::default()
        };

        if !settings.enabled {
            return meta;
        }

        if settings.detect_language {
            meta.language = output
                .language
                .clone()
                .filter(|l| !l.trim().is_empty())
                .or_else(|| Some(metadata::detect_language(text).to_string()));
        }
        if settings.extract_dpi {
            meta.dpi = metadata::read_dpi(path);
        }
        if settings.detect_orientation {
            meta.orientation = output.orientation.clone();
            meta.text_angle = output.text_angle;
        }
        meta
    }

    /// Write the enabled artifacts. Failures are logged and skipped.
    fn persist(
        &self,
        source: &Path,
        prepared: &PreprocessOutcome,
        text: &str,
        output: &EngineOutput,
    ) -> Vec<String> {
        let storage = &self.config.storage;
        let paths = ArtifactPaths::for_source(&storage.path, source);
        let mut written = Vec::new();

        if storage.save_processed_image && prepared.is_transformed() {
            match std::fs::read(prepared.path()) {
                Ok(bytes) => self.put_artifact(&paths.processed_image, &bytes, &mut written),
                Err(e) => warn!("Could not read processed image {}: {}", prepared.path().display(), e),
            }
        }

        if storage.save_ocr_text {
            self.put_artifact(&paths.text, text.as_bytes(), &mut written);
        }

        if storage.save_confidence {
            let breakdown = serde_json::json!({
                "engine": output.engine,
                "confidence": clamp_confidence(output.confidence),
                "words": output.words,
            });
            match serde_json::to_vec_pretty(&breakdown) {
                Ok(bytes) => self.put_artifact(&paths.confidence, &bytes, &mut written),
                Err(e) => warn!("Could not serialize confidence breakdown: {}", e),
            }
        }

        written
    }

    fn put_artifact(&self, path: &str, bytes: &[u8], written: &mut Vec<String>) {
        if self.disk.exists(path) {
            debug!("Replacing existing OCR artifact {}", path);
        }
        match self.disk.put(path, bytes) {
            Ok(()) => {
                debug!("Stored OCR artifact {}", path);
                written.push(path.to_string());
            }
            Err(e) => warn!("Failed to store OCR artifact {}: {}", path, e),
        }
    }
}
