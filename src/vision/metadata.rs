//! Document metadata derived from recognized text and image headers

use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header bytes scanned for resolution information
const HEADER_SCAN_LIMIT: u64 = 64 * 1024;

const SPANISH_STOP_WORDS: &[&str] = &[
    "el", "la", "de", "que", "y", "en", "un", "una", "es", "se", "no", "los", "las", "del", "por",
    "con", "para", "su", "al", "lo", "como", "más", "pero", "sus", "le", "ya", "o", "este", "sí",
];

const ENGLISH_STOP_WORDS: &[&str] = &[
    "the", "and", "of", "to", "a", "in", "is", "it", "you", "that", "he", "was", "for", "on",
    "are", "with", "as", "his", "they", "be", "at", "one", "have", "this", "from", "or", "by",
];

/// Metadata attached to every recognition result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMetadata {
    /// Engine-reported language when available, otherwise the stop-word guess
    pub language: Option<String>,
    pub dpi: Option<u32>,
    pub orientation: Option<String>,
    /// Text rotation in degrees, as reported by the engine
    pub text_angle: Option<f32>,
    pub text_regions: usize,
    pub word_count: usize,
    pub character_count: usize,
}

/// Guess Spanish or English from stop-word frequency. Ties go to Spanish.
pub fn detect_language(text: &str) -> &'static str {
    let mut spanish = 0usize;
    let mut english = 0usize;

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
    {
        if SPANISH_STOP_WORDS.contains(&word.as_str()) {
            spanish += 1;
        }
        if ENGLISH_STOP_WORDS.contains(&word.as_str()) {
            english += 1;
        }
    }

    if english > spanish {
        "en"
    } else {
        "es"
    }
}

/// Read horizontal resolution from PNG `pHYs` or JPEG JFIF headers
pub fn read_dpi(path: &Path) -> Option<u32> {
    let mut header = Vec::new();
    File::open(path)
        .ok()?
        .take(HEADER_SCAN_LIMIT)
        .read_to_end(&mut header)
        .ok()?;
    dpi_from_header(&header)
}

fn dpi_from_header(bytes: &[u8]) -> Option<u32> {
    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

    if bytes.starts_with(PNG_SIGNATURE) {
        png_dpi(&bytes[PNG_SIGNATURE.len()..])
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        jfif_dpi(&bytes[2..])
    } else {
        None
    }
}

fn be_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(..4)?.try_into().ok()?))
}

fn be_u16(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(..2)?.try_into().ok()?))
}

/// Walk PNG chunks until `pHYs` or image data
fn png_dpi(mut chunks: &[u8]) -> Option<u32> {
    loop {
        let length = be_u32(chunks)? as usize;
        let kind = chunks.get(4..8)?;
        let data = chunks.get(8..8 + length)?;

        match kind {
            b"pHYs" => {
                let pixels_per_unit = be_u32(data)?;
                // Unit 1 is meters; 0 means aspect ratio only
                if *data.get(8)? != 1 || pixels_per_unit == 0 {
                    return None;
                }
                return Some((pixels_per_unit as f64 * 0.0254).round() as u32);
            }
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }

        // length + type + data + crc
        chunks = chunks.get(12 + length..)?;
    }
}

/// Walk JPEG segments until APP0/JFIF or start of scan
fn jfif_dpi(mut segments: &[u8]) -> Option<u32> {
    loop {
        if *segments.first()? != 0xFF {
            return None;
        }
        let marker = *segments.get(1)?;
        // Start of scan: no more header segments
        if marker == 0xDA {
            return None;
        }
        let length = be_u16(segments.get(2..)?)? as usize;
        let body = segments.get(4..2 + length)?;

        if marker == 0xE0 && body.starts_with(b"JFIF\0") {
            let units = *body.get(7)?;
            let x_density = be_u16(body.get(8..)?)? as f64;
            if x_density == 0.0 {
                return None;
            }
            return match units {
                1 => Some(x_density as u32),
                2 => Some((x_density * 2.54).round() as u32),
                _ => None,
            };
        }

        segments = segments.get(2 + length..)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn png_with_phys(ppm: u32, unit: u8) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        // IHDR
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&[0u8; 13]);
        bytes.extend_from_slice(&[0u8; 4]);
        // pHYs
        bytes.extend_from_slice(&9u32.to_be_bytes());
        bytes.extend_from_slice(b"pHYs");
        bytes.extend_from_slice(&ppm.to_be_bytes());
        bytes.extend_from_slice(&ppm.to_be_bytes());
        bytes.push(unit);
        bytes.extend_from_slice(&[0u8; 4]);
        bytes
    }

    fn jpeg_with_jfif(units: u8, density: u16) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        bytes.extend_from_slice(b"JFIF\0");
        bytes.extend_from_slice(&[1, 1, units]);
        bytes.extend_from_slice(&density.to_be_bytes());
        bytes.extend_from_slice(&density.to_be_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&[0xFF, 0xDA]);
        bytes
    }

    #[test]
    fn test_detect_spanish() {
        assert_eq!(detect_language("El expediente de la serie documental que se archivó"), "es");
    }

    #[test]
    fn test_detect_english() {
        assert_eq!(detect_language("The record of the file is in the archive"), "en");
    }

    #[test]
    fn test_tie_defaults_to_spanish() {
        assert_eq!(detect_language(""), "es");
        assert_eq!(detect_language("12345 XYZ"), "es");
        assert_eq!(detect_language("la the"), "es");
    }

    #[test]
    fn test_png_phys_300_dpi() {
        // 300 dpi = 11811 pixels per meter
        assert_eq!(dpi_from_header(&png_with_phys(11811, 1)), Some(300));
    }

    #[test]
    fn test_png_phys_without_unit() {
        assert_eq!(dpi_from_header(&png_with_phys(11811, 0)), None);
    }

    #[test]
    fn test_jfif_dots_per_inch() {
        assert_eq!(dpi_from_header(&jpeg_with_jfif(1, 200)), Some(200));
    }

    #[test]
    fn test_jfif_dots_per_cm() {
        assert_eq!(dpi_from_header(&jpeg_with_jfif(2, 118)), Some(300));
    }

    #[test]
    fn test_jfif_aspect_only() {
        assert_eq!(dpi_from_header(&jpeg_with_jfif(0, 1)), None);
    }

    #[test]
    fn test_unknown_or_truncated_headers() {
        assert_eq!(dpi_from_header(b"GIF89a"), None);
        assert_eq!(dpi_from_header(b"\x89PNG\r\n\x1a\n\x00\x00"), None);
        assert_eq!(dpi_from_header(&[0xFF, 0xD8, 0xFF]), None);
    }

    #[test]
    fn test_read_dpi_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, png_with_phys(7874, 1)).unwrap();
        assert_eq!(read_dpi(&path), Some(200));
        assert_eq!(read_dpi(&dir.path().join("missing.png")), None);
    }
}
