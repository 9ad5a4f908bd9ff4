//! Tesseract backend
//!
//! Runs the local `tesseract` binary with TSV output and derives text and
//! confidence from the word rows.

use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::engine::{mean_positive, EngineKind, EngineOutput, OcrEngine, RecognizeOptions, WordConfidence};
use crate::config::TesseractConfig;
use crate::error::OcrError;

/// TSV row level for individual words
const WORD_LEVEL: i32 = 5;

/// Tesseract binary wrapper
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary_path);
        if let Some(tessdata) = &self.config.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(tessdata);
        }
        cmd
    }

    fn language_arg(&self, options: &RecognizeOptions) -> String {
        if options.languages.is_empty() {
            self.config.languages.join("+")
        } else {
            options.languages.join("+")
        }
    }

    fn try_recognize(&self, path: &Path, options: &RecognizeOptions) -> Result<EngineOutput, OcrError> {
        let languages = self.language_arg(options);
        let psm = options.psm.unwrap_or(self.config.psm);

        debug!(file = %path.display(), languages = %languages, psm, "Running tesseract");

        let output = self
            .command()
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&languages)
            .arg("--psm")
            .arg(psm.to_string())
            .arg("--oem")
            .arg(self.config.oem.to_string())
            .arg("tsv")
            .output()
            .map_err(|e| {
                OcrError::engine(
                    EngineKind::Tesseract.as_str(),
                    format!("failed to launch {}: {}", self.config.binary_path.display(), e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::engine(
                EngineKind::Tesseract.as_str(),
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let page = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        let mut result = EngineOutput::success(EngineKind::Tesseract, page.text, page.confidence);
        result.text_regions = page.blocks;
        result.words = page.words;
        Ok(result)
    }
}

impl OcrEngine for TesseractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Tesseract
    }

    fn recognize(&self, path: &Path, options: &RecognizeOptions) -> EngineOutput {
        match self.try_recognize(path, options) {
            Ok(output) => output,
            Err(e) => {
                warn!("Tesseract recognition failed: {}", e);
                EngineOutput::failure(EngineKind::Tesseract, e.to_string())
            }
        }
    }

    fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.command()
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn supported_languages(&self) -> Vec<String> {
        let listed = self
            .command()
            .arg("--list-langs")
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| {
                // Newer builds print the list on stdout, older ones on stderr
                let mut text = String::from_utf8_lossy(&o.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&o.stderr));
                parse_language_list(&text)
            })
            .unwrap_or_default();

        if listed.is_empty() {
            self.config.languages.clone()
        } else {
            listed
        }
    }
}

/// Text and confidence recovered from TSV output
#[derive(Debug, Clone, PartialEq)]
pub struct TsvPage {
    pub text: String,
    /// Mean of the positive row confidences (0 when none)
    pub confidence: f32,
    /// Blocks that contained at least one word
    pub blocks: usize,
    pub words: Vec<WordConfidence>,
}

/// Parse Tesseract TSV output.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text
pub fn parse_tsv(tsv: &str) -> TsvPage {
    let mut confidences = Vec::new();
    let mut words = Vec::new();
    let mut text = String::new();
    let mut blocks = 0usize;
    let mut current_line: Option<(i32, i32, i32)> = None;

    for row in tsv.lines() {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // Header row fails to parse and is skipped here
        let Ok(level) = fields[0].trim().parse::<i32>() else {
            continue;
        };
        let block: i32 = fields[2].trim().parse().unwrap_or(-1);
        let par: i32 = fields[3].trim().parse().unwrap_or(-1);
        let line: i32 = fields[4].trim().parse().unwrap_or(-1);
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let word = fields[11].trim();

        confidences.push(conf);

        if level != WORD_LEVEL || word.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (block, par, line);
        match current_line {
            None => blocks += 1,
            Some(prev) if prev == key => text.push(' '),
            Some((prev_block, _, _)) if prev_block != block => {
                blocks += 1;
                text.push_str("\n\n");
            }
            Some(_) => text.push('\n'),
        }
        current_line = Some(key);

        text.push_str(word);
        words.push(WordConfidence {
            text: word.to_string(),
            confidence: conf,
        });
    }

    TsvPage {
        text,
        confidence: mean_positive(confidences),
        blocks,
        words,
    }
}

/// Parse `tesseract --list-langs` output, skipping the banner line
fn parse_language_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains(' ') && !l.ends_with(':'))
        .map(str::to_string)
        .collect()
}
