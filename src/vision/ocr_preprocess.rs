//! Image preprocessing filters for OCR
//!
//! Best-effort transforms applied before recognition. Any failure hands the
//! original file back to the pipeline instead of aborting it.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba};
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

use crate::config::PreprocessingConfig;
use crate::error::OcrError;

/// Luminance at or below this value becomes black
pub const BINARIZE_THRESHOLD: u8 = 128;

/// Which image the engine should read after preprocessing
#[derive(Debug)]
pub enum PreprocessOutcome {
    /// A transformed PNG in a temporary file, removed on drop
    Transformed(TempPath),
    /// The original input, with the failure that caused the fallback if any
    Unchanged { path: PathBuf, reason: Option<String> },
}

impl PreprocessOutcome {
    /// Path the engine should read
    pub fn path(&self) -> &Path {
        match self {
            PreprocessOutcome::Transformed(temp) => &**temp,
            PreprocessOutcome::Unchanged { path, .. } => path.as_path(),
        }
    }

    pub fn is_transformed(&self) -> bool {
        matches!(self, PreprocessOutcome::Transformed(_))
    }

    /// Why preprocessing fell back to the original, if it did
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            PreprocessOutcome::Unchanged { reason, .. } => reason.as_deref(),
            PreprocessOutcome::Transformed(_) => None,
        }
    }
}

/// Applies the configured transforms to an image file
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    settings: PreprocessingConfig,
}

impl ImagePreprocessor {
    pub fn new(settings: PreprocessingConfig) -> Self {
        Self { settings }
    }

    /// Preprocess `path`, falling back to it untouched on any failure
    pub fn process(&self, path: &Path) -> PreprocessOutcome {
        if !self.settings.enabled {
            debug!("OCR preprocessing disabled");
            return PreprocessOutcome::Unchanged {
                path: path.to_path_buf(),
                reason: None,
            };
        }

        match self.try_process(path) {
            Ok(temp) => {
                debug!(input = %path.display(), output = %temp.display(), "Preprocessed image");
                PreprocessOutcome::Transformed(temp)
            }
            Err(e) => {
                debug!("Preprocessing failed for {}, using original: {}", path.display(), e);
                PreprocessOutcome::Unchanged {
                    path: path.to_path_buf(),
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    fn try_process(&self, path: &Path) -> Result<TempPath, OcrError> {
        let img = image::open(path)?;
        let processed = self.transform(img);

        let file = tempfile::Builder::new()
            .prefix("archivey-ocr-")
            .suffix(".png")
            .tempfile()?;
        processed
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| OcrError::Preprocessing(format!("failed to encode PNG: {}", e)))?;

        Ok(file.into_temp_path())
    }

    /// Run the enabled transforms in order: scale, contrast, denoise,
    /// binarize, deskew
    pub fn transform(&self, img: DynamicImage) -> DynamicImage {
        let s = &self.settings;
        debug!(
            "Preprocessing: scale={} ({}), contrast={}, denoise={}, binarize={}, deskew={}",
            s.scale, s.scale_factor, s.enhance_contrast, s.denoise, s.binarize, s.deskew
        );

        let mut img = img;

        if s.scale && (s.scale_factor - 1.0).abs() > 0.01 {
            img = apply_scale(&img, s.scale_factor);
        }

        if s.enhance_contrast {
            img = img.adjust_contrast(s.contrast_strength);
        }

        if s.denoise {
            img = apply_denoise(img);
        }

        if s.binarize {
            img = DynamicImage::ImageLuma8(binarize(&img.to_luma8()));
        }

        if s.deskew {
            img = apply_deskew(img);
        }

        img
    }
}

/// Resample by `factor`, never producing an empty image
fn apply_scale(img: &DynamicImage, factor: f32) -> DynamicImage {
    let width = ((img.width() as f32 * factor).round() as u32).max(1);
    let height = ((img.height() as f32 * factor).round() as u32).max(1);
    img.resize_exact(width, height, FilterType::CatmullRom)
}

/// 3x3 median smoothing
fn apply_denoise(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(median_filter(&gray, 1, 1)),
        other => DynamicImage::ImageRgba8(median_filter(&other.to_rgba8(), 1, 1)),
    }
}

/// Fixed-threshold binarization: `<= 128` black, `> 128` white
pub fn binarize(gray: &GrayImage) -> GrayImage {
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = if pixel.0[0] <= BINARIZE_THRESHOLD { 0 } else { 255 };
    }
    out
}

/// Skew angle in degrees. Detection is not implemented and always reports
/// a straight page, so deskew never rotates.
pub fn detect_skew_angle(_gray: &GrayImage) -> f32 {
    0.0
}

fn apply_deskew(img: DynamicImage) -> DynamicImage {
    let angle = detect_skew_angle(&img.to_luma8());
    if angle.abs() < 0.01 {
        debug!("Deskew: no skew detected");
        return img;
    }

    let theta = -angle.to_radians();
    match img {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(rotate_about_center(
            &gray,
            theta,
            Interpolation::Bilinear,
            Luma([255u8]),
        )),
        other => DynamicImage::ImageRgba8(rotate_about_center(
            &other.to_rgba8(),
            theta,
            Interpolation::Bilinear,
            Rgba([255u8, 255, 255, 255]),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::tempdir;

    fn all_off() -> PreprocessingConfig {
        PreprocessingConfig {
            enabled: true,
            scale: false,
            scale_factor: 1.0,
            enhance_contrast: false,
            contrast_strength: 0.0,
            denoise: false,
            binarize: false,
            deskew: false,
        }
    }

    fn write_gradient_png(dir: &Path, name: &str) -> PathBuf {
        let img = RgbImage::from_fn(8, 4, |x, _| {
            let v = (x * 32) as u8;
            image::Rgb([v, v, v])
        });
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_binarize_midpoint_is_black() {
        let gray = GrayImage::from_raw(4, 1, vec![0, 128, 129, 255]).unwrap();
        let out = binarize(&gray);
        assert_eq!(out.into_raw(), vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_preprocessing_disabled_returns_original() {
        let settings = PreprocessingConfig {
            enabled: false,
            ..Default::default()
        };
        let outcome = ImagePreprocessor::new(settings).process(Path::new("/scans/a.png"));

        assert!(!outcome.is_transformed());
        assert_eq!(outcome.path(), Path::new("/scans/a.png"));
        assert!(outcome.fallback_reason().is_none());
    }

    #[test]
    fn test_unreadable_image_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let outcome = ImagePreprocessor::new(PreprocessingConfig::default()).process(&path);

        assert!(!outcome.is_transformed());
        assert_eq!(outcome.path(), path.as_path());
        assert!(outcome.fallback_reason().is_some());
    }

    #[test]
    fn test_full_pipeline_writes_black_and_white_png() {
        let dir = tempdir().unwrap();
        let path = write_gradient_png(dir.path(), "scan.png");

        let outcome = ImagePreprocessor::new(PreprocessingConfig::default()).process(&path);
        assert!(outcome.is_transformed());
        assert_ne!(outcome.path(), path.as_path());

        let out = image::open(outcome.path()).unwrap();
        assert_eq!(out.width(), 12);
        assert_eq!(out.height(), 6);
        assert!(out.to_luma8().pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_temp_output_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = write_gradient_png(dir.path(), "scan.png");

        let outcome = ImagePreprocessor::new(all_off()).process(&path);
        let temp = outcome.path().to_path_buf();
        assert!(temp.exists());

        drop(outcome);
        assert!(!temp.exists());
    }

    #[test]
    fn test_scale_factor() {
        let mut settings = all_off();
        settings.scale = true;
        settings.scale_factor = 2.0;

        let img = DynamicImage::ImageRgb8(RgbImage::new(5, 3));
        let out = ImagePreprocessor::new(settings).transform(img);
        assert_eq!((out.width(), out.height()), (10, 6));
    }

    #[test]
    fn test_scale_never_collapses_to_zero() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let out = apply_scale(&img, 0.1);
        assert_eq!((out.width(), out.height()), (1, 1));
    }

    #[test]
    fn test_deskew_is_noop() {
        let mut settings = all_off();
        settings.deskew = true;

        let gray = GrayImage::from_fn(6, 6, |x, y| Luma([((x + y) * 20) as u8]));
        let img = DynamicImage::ImageLuma8(gray.clone());
        let out = ImagePreprocessor::new(settings).transform(img);

        assert_eq!(detect_skew_angle(&gray), 0.0);
        assert_eq!(out.to_luma8(), gray);
    }

    #[test]
    fn test_denoise_removes_single_speck() {
        let mut gray = GrayImage::from_pixel(5, 5, Luma([255]));
        gray.put_pixel(2, 2, Luma([0]));

        let out = apply_denoise(DynamicImage::ImageLuma8(gray));
        assert_eq!(out.to_luma8().get_pixel(2, 2).0[0], 255);
    }
}
