//! Text extraction for the content index: plain text in any detected charset,
//! PDF pages and the body of DOCX documents.

use chardetng::EncodingDetector;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Extensions whose bytes are indexed as text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "md", "java", "html", "xml", "json", "csv", "rs", "py", "js", "ts", "c", "h",
    "cpp", "go", "toml", "yaml", "yml", "ini", "cfg", "sh",
];

/// Main body part of a DOCX package
const DOCX_BODY: &str = "word/document.xml";

/// Why a file's text could not be extracted
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported file type: {0}")]
    Unsupported(PathBuf),

    #[error("{path} is {size} bytes, over the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("{0} looks binary")]
    Binary(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to extract text from {path}: {reason}")]
    Document { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Pdf,
    Docx,
}

fn text_globs() -> &'static GlobSet {
    static GLOBS: OnceLock<GlobSet> = OnceLock::new();
    GLOBS.get_or_init(|| {
        let mut builder = GlobSetBuilder::new();
        for ext in TEXT_EXTENSIONS {
            if let Ok(glob) = Glob::new(&format!("*.{}", ext)) {
                builder.add(glob);
            }
        }
        builder.build().unwrap_or_else(|_| GlobSet::empty())
    })
}

fn format_of(path: &Path) -> Option<Format> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".pdf") {
        Some(Format::Pdf)
    } else if name.ends_with(".docx") {
        Some(Format::Docx)
    } else if text_globs().is_match(&name) {
        Some(Format::Text)
    } else {
        None
    }
}

/// Whether the content index should try to extract this file
pub fn is_supported_file(path: &Path) -> bool {
    format_of(path).is_some()
}

/// Read a supported file as text
pub fn extract_text(path: &Path, max_size: u64) -> Result<String, ExtractionError> {
    let format = format_of(path).ok_or_else(|| ExtractionError::Unsupported(path.to_path_buf()))?;

    let io_err = |source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(io_err)?.len();
    if size > max_size {
        return Err(ExtractionError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_size,
        });
    }

    let content = fs::read(path).map_err(io_err)?;
    let doc_err = |reason: String| ExtractionError::Document {
        path: path.to_path_buf(),
        reason,
    };
    match format {
        Format::Text => {
            if is_binary(&content) {
                return Err(ExtractionError::Binary(path.to_path_buf()));
            }
            Ok(decode_text(&content))
        }
        Format::Pdf => pdf_text(&content).map_err(doc_err),
        Format::Docx => docx_text(&content).map_err(doc_err),
    }
}

/// Decode text bytes, guessing the charset when they are not UTF-8
fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.strip_prefix('\u{FEFF}').unwrap_or(text).to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    // decode() honours a BOM over the guess
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!("Malformed {} sequences replaced", used.name());
    } else {
        debug!("Decoded as {}", used.name());
    }
    text.into_owned()
}

fn pdf_text(content: &[u8]) -> Result<String, String> {
    let doc = lopdf::Document::load_mem(content).map_err(|e| e.to_string())?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Ok(String::new());
    }
    doc.extract_text(&pages).map_err(|e| e.to_string())
}

fn docx_text(content: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| format!("{}: {}", DOCX_BODY, e))?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(|e| e.to_string())?),
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"w:p" => text.push('\n'),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Check if content appears to be binary
fn is_binary(content: &[u8]) -> bool {
    let sample_size = content.len().min(8192);
    let sample = &content[..sample_size];

    // Check for null bytes
    let null_count = sample.iter().filter(|&&b| b == 0).count();
    if null_count > sample_size / 10 {
        return true;
    }

    let non_text_count = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t' && b != 0x0C)
        .count();

    non_text_count > sample_size / 8
}
