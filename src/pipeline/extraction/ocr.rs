//! Tesseract OCR wrapper.
//!
//! Shells out to the `tesseract` binary with TSV output so we get per-word
//! confidence scores, not just text.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::types::{OcrEngine, OcrPageResult, OcrWordResult};
use super::ExtractionError;

pub struct TesseractCli {
    languages: String,
    timeout_secs: u64,
}

impl TesseractCli {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            languages: "eng".to_string(),
            timeout_secs,
        }
    }

    /// Set OCR language(s), e.g. "eng" or "eng+fra".
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.languages = langs.to_string();
        self
    }
}

impl OcrEngine for TesseractCli {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let input = tempfile::Builder::new()
            .prefix("docmind-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ExtractionError::OcrProcessing(format!("Temp file failed: {e}")))?;
        std::fs::write(input.path(), image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("Temp write failed: {e}")))?;

        let mut child = Command::new("tesseract")
            .arg(input.path())
            .arg("stdout")
            .args(["-l", &self.languages])
            .arg("tsv")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractionError::OcrUnavailable("tesseract binary not on PATH".into())
                } else {
                    ExtractionError::OcrProcessing(format!("Failed to start tesseract: {e}"))
                }
            })?;

        // Drain stdout on a separate thread so a chatty tesseract never
        // blocks on a full pipe while we poll for exit.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::OcrProcessing("No stdout handle".into()))?;
        let reader = std::thread::spawn(move || {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + Duration::from_secs(self.timeout_secs);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() > deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExtractionError::OcrTimeout(self.timeout_secs));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(ExtractionError::OcrProcessing(format!(
                        "Waiting on tesseract failed: {e}"
                    )));
                }
            }
        };

        let tsv = reader
            .join()
            .map_err(|_| ExtractionError::OcrProcessing("Output reader panicked".into()))?
            .map_err(|e| ExtractionError::OcrProcessing(format!("Reading output failed: {e}")))?;

        if !status.success() {
            return Err(ExtractionError::OcrProcessing(format!(
                "tesseract exited with {status}"
            )));
        }

        let result = parse_tsv_output(&tsv);
        if result.text.is_empty() {
            warn!("OCR produced no text for page image");
        } else {
            debug!(
                words = result.word_confidences.len(),
                confidence = result.confidence,
                "OCR page complete"
            );
        }
        Ok(result)
    }
}

/// Parse Tesseract TSV output into text plus per-word confidences.
///
/// TSV columns: level page_num block_num par_num line_num word_num left top
/// width height conf text. Level 5 rows are words; text is rebuilt by
/// joining words within a line and lines with newlines. Confidence -1 marks
/// words Tesseract could not score; they are excluded from the page mean.
fn parse_tsv_output(tsv: &str) -> OcrPageResult {
    let mut words: Vec<OcrWordResult> = Vec::new();
    let mut text = String::new();
    let mut current_line: Option<(i32, i32, i32)> = None;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let conf: i32 = fields[10].parse().unwrap_or(-1);

        let line_key = (
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        match current_line {
            Some(prev) if prev == line_key => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        current_line = Some(line_key);
        text.push_str(word);

        words.push(OcrWordResult {
            text: word.to_string(),
            confidence: if conf < 0 { -1.0 } else { conf as f32 / 100.0 },
        });
    }

    let scored: Vec<f32> = words
        .iter()
        .map(|w| w.confidence)
        .filter(|c| *c >= 0.0)
        .collect();
    let confidence = if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f32>() / scored.len() as f32
    };

    OcrPageResult {
        text,
        confidence,
        word_confidences: words,
    }
}

/// Mock OCR engine for unit testing without Tesseract installed.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let word_confidences = self
            .text
            .split_whitespace()
            .map(|w| OcrWordResult {
                text: w.to_string(),
                confidence: self.confidence,
            })
            .collect();

        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
            word_confidences,
        })
    }
}
