//! Barcode/QR detection
//!
//! Optional secondary pass over the (preprocessed) image. Only QR codes have
//! a decoder, and only when the crate is built with the `qr` feature. Other
//! configured symbologies are accepted but never decoded.

use image::GrayImage;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::config::BarcodeConfig;
use crate::error::OcrError;

/// Symbology key for QR codes in configuration and results
pub const QR_CODE: &str = "QR_CODE";

/// A decoded barcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Barcode {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// A decoding capability for one symbology
pub trait BarcodeDecoder: Send + Sync {
    /// Symbology key this decoder handles
    fn symbology(&self) -> &'static str;

    fn decode(&self, image: &GrayImage) -> Result<Vec<Barcode>, OcrError>;
}

/// What the barcode pass produced
#[derive(Debug, Clone, PartialEq)]
pub enum BarcodeOutcome {
    Decoded(Vec<Barcode>),
    /// No decoder for any configured symbology
    Unavailable,
    /// Decoding failed; the pipeline carries on without barcodes
    Failed(String),
}

impl BarcodeOutcome {
    /// Barcodes found, empty for every non-decoded outcome
    pub fn into_barcodes(self) -> Vec<Barcode> {
        match self {
            BarcodeOutcome::Decoded(codes) => codes,
            BarcodeOutcome::Unavailable | BarcodeOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Runs every available decoder over an image file
pub struct BarcodeDetector {
    decoders: Vec<Box<dyn BarcodeDecoder>>,
}

impl BarcodeDetector {
    /// Detector with the decoders this build provides for the configured types
    pub fn from_config(config: &BarcodeConfig) -> Self {
        let mut decoders: Vec<Box<dyn BarcodeDecoder>> = Vec::new();

        for kind in &config.types {
            if kind.eq_ignore_ascii_case(QR_CODE) {
                if let Some(decoder) = qr_decoder() {
                    decoders.push(decoder);
                }
            } else {
                debug!("Barcode type {} has no decoder and will be skipped", kind);
            }
        }

        Self { decoders }
    }

    /// Detector with an explicit set of decoders
    #[cfg(test)]
    pub fn with_decoders(decoders: Vec<Box<dyn BarcodeDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn is_available(&self) -> bool {
        !self.decoders.is_empty()
    }

    /// Scan the image at `path`
    pub fn detect(&self, path: &Path) -> BarcodeOutcome {
        if self.decoders.is_empty() {
            debug!("No barcode decoder available");
            return BarcodeOutcome::Unavailable;
        }

        match self.try_detect(path) {
            Ok(codes) => {
                debug!("Found {} barcode(s) in {}", codes.len(), path.display());
                BarcodeOutcome::Decoded(codes)
            }
            Err(e) => {
                debug!("Barcode detection failed for {}: {}", path.display(), e);
                BarcodeOutcome::Failed(e.to_string())
            }
        }
    }

    fn try_detect(&self, path: &Path) -> Result<Vec<Barcode>, OcrError> {
        let gray = image::open(path)
            .map_err(|e| OcrError::Barcode(format!("failed to open image: {}", e)))?
            .to_luma8();

        let mut codes = Vec::new();
        for decoder in &self.decoders {
            debug!("Running {} decoder on {}", decoder.symbology(), path.display());
            codes.extend(decoder.decode(&gray)?);
        }
        Ok(codes)
    }
}

#[cfg(feature = "qr")]
fn qr_decoder() -> Option<Box<dyn BarcodeDecoder>> {
    Some(Box::new(QrDecoder))
}

#[cfg(not(feature = "qr"))]
fn qr_decoder() -> Option<Box<dyn BarcodeDecoder>> {
    None
}

/// QR decoder backed by `rqrr`
#[cfg(feature = "qr")]
pub struct QrDecoder;

#[cfg(feature = "qr")]
impl BarcodeDecoder for QrDecoder {
    fn symbology(&self) -> &'static str {
        QR_CODE
    }

    fn decode(&self, image: &GrayImage) -> Result<Vec<Barcode>, OcrError> {
        let (width, height) = image.dimensions();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| image.get_pixel(x as u32, y as u32).0[0],
        );

        let mut codes = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => codes.push(Barcode {
                    kind: QR_CODE.to_string(),
                    value: content,
                }),
                // A damaged grid does not invalidate the others
                Err(e) => debug!("Skipping undecodable QR grid: {}", e),
            }
        }
        Ok(codes)
    }
}
