//! OCR Configuration
//!
//! Pipeline settings stored in TOML format. Loaded once at startup and
//! handed to the service; never mutated afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::OcrError;
use crate::vision::engine::EngineKind;

/// Largest accepted `preprocessing.scale_factor`
pub const MAX_SCALE_FACTOR: f32 = 8.0;

/// Complete OCR pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Active engine key: `tesseract`, `cloud_vision` or `azure_vision`
    pub default_engine: String,
    /// Per-engine settings
    pub engines: EnginesConfig,
    /// Allowed input file extensions (lowercase, without dot)
    pub supported_formats: Vec<String>,
    /// Input limits
    pub processing: ProcessingConfig,
    /// Image transforms applied before recognition
    pub preprocessing: PreprocessingConfig,
    /// Text cleanup applied after recognition
    pub postprocessing: PostprocessingConfig,
    /// Derived document metadata
    pub metadata_extraction: MetadataConfig,
    /// Secondary barcode/QR pass
    pub barcode_detection: BarcodeConfig,
    /// Where result artifacts are written
    pub storage: StorageConfig,
    /// Per-file log records
    pub logging: LoggingConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            default_engine: EngineKind::Tesseract.as_str().to_string(),
            engines: EnginesConfig::default(),
            supported_formats: ["jpg", "jpeg", "png", "tiff", "tif", "bmp", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            processing: ProcessingConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            postprocessing: PostprocessingConfig::default(),
            metadata_extraction: MetadataConfig::default(),
            barcode_detection: BarcodeConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl OcrConfig {
    /// Check the settings that must be right before the service starts
    pub fn validate(&self) -> std::result::Result<EngineKind, OcrError> {
        let kind = EngineKind::parse(&self.default_engine)?;
        if !self.engines.is_enabled(kind) {
            return Err(OcrError::Configuration(format!(
                "{} is disabled in engines.{}",
                kind, kind
            )));
        }

        if self.processing.max_file_size == 0 {
            return Err(OcrError::Configuration(
                "processing.max_file_size must be greater than zero".to_string(),
            ));
        }

        let factor = self.preprocessing.scale_factor;
        if !factor.is_finite() || factor <= 0.0 || factor > MAX_SCALE_FACTOR {
            return Err(OcrError::Configuration(format!(
                "preprocessing.scale_factor must be in (0, {}], got {}",
                MAX_SCALE_FACTOR, factor
            )));
        }

        Ok(kind)
    }

    /// Whether an extension (any case, no dot) is in the allow-list
    pub fn is_supported_format(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.supported_formats.iter().any(|f| f.eq_ignore_ascii_case(&ext))
    }
}

/// Settings for every engine adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub tesseract: TesseractConfig,
    pub cloud_vision: CloudVisionConfig,
    pub azure_vision: AzureVisionConfig,
}

impl EnginesConfig {
    /// Whether the `enabled` flag of the given engine is set
    pub fn is_enabled(&self, kind: EngineKind) -> bool {
        match kind {
            EngineKind::Tesseract => self.tesseract.enabled,
            EngineKind::CloudVision => self.cloud_vision.enabled,
            EngineKind::AzureVision => self.azure_vision.enabled,
        }
    }
}

/// Local Tesseract binary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    pub enabled: bool,
    /// Executable name or absolute path
    pub binary_path: PathBuf,
    /// Optional `--tessdata-dir`
    pub tessdata_dir: Option<PathBuf>,
    /// Tesseract language codes, joined with `+`
    pub languages: Vec<String>,
    /// Page segmentation mode
    pub psm: u32,
    /// OCR engine mode
    pub oem: u32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary_path: PathBuf::from("tesseract"),
            tessdata_dir: None,
            languages: vec!["spa".to_string(), "eng".to_string()],
            psm: 3,
            oem: 3,
        }
    }
}

/// Google Cloud Vision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudVisionConfig {
    pub enabled: bool,
    pub api_key: String,
    pub project_id: String,
    pub endpoint: String,
    /// BCP-47 language hints
    pub languages: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CloudVisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            project_id: String::new(),
            endpoint: "https://vision.googleapis.com".to_string(),
            languages: vec!["es".to_string(), "en".to_string()],
            timeout_secs: 30,
        }
    }
}

/// Azure Computer Vision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureVisionConfig {
    pub enabled: bool,
    pub subscription_key: String,
    /// Resource endpoint, e.g. `https://<name>.cognitiveservices.azure.com`
    pub endpoint: String,
    pub languages: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AzureVisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            subscription_key: String::new(),
            endpoint: String::new(),
            languages: vec!["es".to_string(), "en".to_string()],
            timeout_secs: 30,
        }
    }
}

/// Input limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Maximum input size in bytes
    pub max_file_size: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

/// Preprocessing transforms, each individually switchable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub enabled: bool,
    pub scale: bool,
    /// Resample factor used when `scale` is on
    pub scale_factor: f32,
    pub enhance_contrast: bool,
    /// Contrast adjustment passed to the filter (percent)
    pub contrast_strength: f32,
    pub denoise: bool,
    pub binarize: bool,
    pub deskew: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scale: true,
            scale_factor: 1.5,
            enhance_contrast: true,
            contrast_strength: 20.0,
            denoise: true,
            binarize: true,
            deskew: false,
        }
    }
}

/// Text cleanup switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessingConfig {
    pub enabled: bool,
    pub normalize_whitespace: bool,
    pub spell_check: bool,
}

impl Default for PostprocessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normalize_whitespace: true,
            spell_check: false,
        }
    }
}

/// Metadata extraction switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    pub detect_language: bool,
    pub extract_dpi: bool,
    pub detect_orientation: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detect_language: true,
            extract_dpi: true,
            detect_orientation: true,
        }
    }
}

/// Barcode pass settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeConfig {
    pub enabled: bool,
    /// Symbologies to look for; only `QR_CODE` is decoded
    pub types: Vec<String>,
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            types: ["QR_CODE", "CODE_128", "CODE_39", "EAN_13"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Artifact storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the storage disk (application data dir when unset)
    pub root: Option<PathBuf>,
    /// Prefix under the root where artifacts are written
    pub path: String,
    pub save_processed_image: bool,
    pub save_ocr_text: bool,
    pub save_confidence: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            path: "ocr".to_string(),
            save_processed_image: false,
            save_ocr_text: true,
            save_confidence: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit per-file result records
    pub enabled: bool,
    /// Channel name attached to per-file records
    pub channel: String,
    /// Fallback filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "ocr".to_string(),
            level: "info".to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<OcrConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: OcrConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &OcrConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_ocr_config() {
        let config = OcrConfig::default();

        assert_eq!(config.default_engine, "tesseract");
        assert_eq!(config.processing.max_file_size, 50 * 1024 * 1024);
        assert!(config.is_supported_format("png"));
        assert!(config.is_supported_format("TIFF"));
        assert!(!config.is_supported_format("pdf"));

        assert!(config.preprocessing.enabled);
        assert!(!config.preprocessing.deskew);
        assert!((config.preprocessing.scale_factor - 1.5).abs() < 0.01);

        assert!(!config.barcode_detection.enabled);
        assert!(config.barcode_detection.types.contains(&"QR_CODE".to_string()));

        assert_eq!(config.engines.tesseract.languages, vec!["spa", "eng"]);
        assert!(!config.engines.cloud_vision.enabled);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let config = OcrConfig::default();
        assert_eq!(config.validate().unwrap(), EngineKind::Tesseract);
    }

    #[test]
    fn test_validate_rejects_unknown_engine() {
        let config = OcrConfig {
            default_engine: "abbyy".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OcrError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let mut config = OcrConfig::default();
        config.preprocessing.scale_factor = 0.0;
        assert!(config.validate().is_err());

        config.preprocessing.scale_factor = f32::NAN;
        assert!(config.validate().is_err());

        config.preprocessing.scale_factor = 1000.0;
        assert!(matches!(config.validate(), Err(OcrError::Configuration(_))));

        config.preprocessing.scale_factor = MAX_SCALE_FACTOR;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_disabled_engine() {
        let mut config = OcrConfig::default();
        config.engines.tesseract.enabled = false;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, OcrError::Configuration(_)));
        assert!(err.to_string().contains("tesseract is disabled"));
    }

    #[test]
    fn test_validate_requires_cloud_engine_enabled() {
        let mut config = OcrConfig {
            default_engine: "cloud_vision".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.engines.cloud_vision.enabled = true;
        assert_eq!(config.validate().unwrap(), EngineKind::CloudVision);
    }

    #[test]
    fn test_validate_rejects_zero_max_size() {
        let mut config = OcrConfig::default();
        config.processing.max_file_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            default_engine = "azure_vision"

            [engines.azure_vision]
            enabled = true
            subscription_key = "secret"
            endpoint = "https://example.cognitiveservices.azure.com"

            [barcode_detection]
            enabled = true
        "#;

        let config: OcrConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_engine, "azure_vision");
        assert!(config.engines.azure_vision.enabled);
        assert_eq!(config.engines.azure_vision.timeout_secs, 30);
        assert!(config.barcode_detection.enabled);
        assert_eq!(config.barcode_detection.types.len(), 4);
        assert!(config.engines.tesseract.enabled);
        assert_eq!(config.storage.path, "ocr");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = OcrConfig::default();
        config.storage.root = Some(PathBuf::from("/var/lib/archivey"));
        config.preprocessing.binarize = false;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: OcrConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.storage.root, Some(PathBuf::from("/var/lib/archivey")));
        assert!(!parsed.preprocessing.binarize);
        assert_eq!(parsed.supported_formats, config.supported_formats);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = OcrConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.default_engine, loaded.default_engine);
        assert_eq!(config.processing.max_file_size, loaded.processing.max_file_size);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
