//! Text and metadata extraction for arbitrary files.
//!
//! Extraction dispatches on the detected [`FileKind`] and walks an ordered
//! chain of [`Extractor`]s; the first one that yields non-empty text wins.
//! The chain is always closed by [`PlaceholderExtractor`], so extraction
//! never fails and indexing never blocks on unreadable content.
//!
//! # Default Chains
//!
//! | Kind | Chain |
//! |------|-------|
//! | text, markdown, HTML, structured text | verbatim |
//! | PDF | `pdftotext -layout` → `pdf-extract` → remote OCR |
//! | legacy Word / RTF | `antiword` → `catdoc` → remote OCR |
//! | OOXML (docx, pptx, xlsx) | in-process ZIP/XML → remote OCR |
//! | image | remote vision (objects + description + OCR) → remote OCR |
//! | audio | remote transcription |
//! | anything else | `Binary file: <name>` |

pub mod documents;
pub mod metadata;
pub mod remote;
pub mod text;
pub mod tools;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::inference::InferenceClient;
use crate::models::{ContentAddress, Metadata};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_RTF: &str = "application/rtf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_OCTET: &str = "application/octet-stream";

/// Broad category used to pick an extractor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Html,
    Pdf,
    LegacyWord,
    Ooxml,
    Image,
    Audio,
    Binary,
}

impl FileKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            MIME_PDF => FileKind::Pdf,
            MIME_DOC | MIME_RTF | "text/rtf" => FileKind::LegacyWord,
            MIME_DOCX | MIME_PPTX | MIME_XLSX => FileKind::Ooxml,
            "text/html" | "application/xhtml+xml" => FileKind::Html,
            "application/json" | "application/xml" | "application/toml" | "application/yaml"
            | "application/x-yaml" | "application/javascript" | "application/x-sh" => {
                FileKind::Text
            }
            m if m.starts_with("text/") => FileKind::Text,
            m if m.starts_with("image/") => FileKind::Image,
            m if m.starts_with("audio/") => FileKind::Audio,
            _ => FileKind::Binary,
        }
    }

    /// Whether the extracted text is the document's own words (and so worth
    /// a word count), as opposed to a description or placeholder.
    pub fn is_document(self) -> bool {
        matches!(
            self,
            FileKind::Text | FileKind::Html | FileKind::Pdf | FileKind::LegacyWord | FileKind::Ooxml
        )
    }
}

/// Detect the MIME type of a file: by extension first, then by sniffing the
/// content for extension-less objects fetched by address.
pub fn detect_mime(path: &Path, bytes: &[u8]) -> String {
    if path.extension().is_some() {
        if let Some(mime) = mime_guess::from_path(path).first() {
            return mime.essence_str().to_string();
        }
    }
    sniff_mime(bytes).to_string()
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"%PDF", MIME_PDF),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", MIME_DOC),
        (b"{\\rtf", MIME_RTF),
        (b"ID3", "audio/mpeg"),
        (b"fLaC", "audio/flac"),
        (b"OggS", "audio/ogg"),
    ];
    for (magic, mime) in SIGNATURES {
        if bytes.starts_with(magic) {
            return mime;
        }
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return "audio/wav";
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return documents::sniff_ooxml(bytes).unwrap_or("application/zip");
    }

    let head = &bytes[..bytes.len().min(8192)];
    if head.contains(&0) {
        return MIME_OCTET;
    }
    match std::str::from_utf8(head) {
        Ok(text) => sniff_text(text),
        // A multi-byte character may straddle the cut.
        Err(e) if e.valid_up_to() + 4 >= head.len() => {
            sniff_text(std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default())
        }
        Err(_) => MIME_OCTET,
    }
}

fn sniff_text(text: &str) -> &'static str {
    let start = text.trim_start().to_ascii_lowercase();
    if start.starts_with("<!doctype html") || start.starts_with("<html") {
        "text/html"
    } else {
        "text/plain"
    }
}

/// Everything an extractor needs to know about one input.
#[derive(Debug, Clone)]
pub struct ExtractSource {
    pub path: PathBuf,
    /// File name shown in placeholders and used as the fallback title.
    pub name: String,
    pub mime: String,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
    pub address: Option<ContentAddress>,
    /// True for temp files fetched by address: no meaningful name, no sidecar.
    pub anonymous: bool,
}

impl ExtractSource {
    /// A file the user pointed at directly.
    pub fn from_path(path: &Path, address: Option<ContentAddress>) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime = detect_mime(path, &bytes);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            path: path.to_path_buf(),
            name,
            kind: FileKind::from_mime(&mime),
            mime,
            bytes,
            address,
            anonymous: false,
        })
    }

    /// An object fetched from the content store into a temp file.
    pub fn from_fetched(path: &Path, address: ContentAddress) -> std::io::Result<Self> {
        let mut source = Self::from_path(path, Some(address.clone()))?;
        source.name = address.to_string();
        source.anonymous = true;
        Ok(source)
    }
}

/// Text plus `metadata_*` fields for one item.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub metadata: Metadata,
}

/// One step of a fallback chain.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, kind: FileKind) -> bool;

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError>;
}

/// Closes every chain: `Binary file: <name>`.
pub struct PlaceholderExtractor;

#[async_trait]
impl Extractor for PlaceholderExtractor {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn handles(&self, _kind: FileKind) -> bool {
        true
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        Ok(placeholder_text(source))
    }
}

pub fn placeholder_text(source: &ExtractSource) -> String {
    format!("Binary file: {}", source.name)
}

/// Ordered extractor chain plus the metadata tools.
pub struct ExtractionPipeline {
    extractors: Vec<Box<dyn Extractor>>,
    pdfinfo_bin: String,
}

impl ExtractionPipeline {
    /// Build a pipeline from an explicit chain. The placeholder is appended.
    pub fn new(mut extractors: Vec<Box<dyn Extractor>>, pdfinfo_bin: &str) -> Self {
        extractors.push(Box::new(PlaceholderExtractor));
        Self {
            extractors,
            pdfinfo_bin: pdfinfo_bin.to_string(),
        }
    }

    /// The default chains. Remote steps are included only when a client is
    /// available and `extraction.remote` is on.
    pub fn standard(config: &ExtractionConfig, remote: Option<InferenceClient>) -> Self {
        let mut chain: Vec<Box<dyn Extractor>> = vec![
            Box::new(text::PlainTextExtractor),
            Box::new(tools::ToolExtractor::pdftotext(&config.pdftotext_bin)),
            Box::new(documents::PdfExtractor),
            Box::new(tools::ToolExtractor::antiword()),
            Box::new(tools::ToolExtractor::catdoc()),
            Box::new(documents::OoxmlExtractor),
        ];
        if let Some(client) = remote.filter(|_| config.remote) {
            chain.push(Box::new(remote::VisionExtractor::new(client.clone())));
            chain.push(Box::new(remote::OcrExtractor::new(client.clone())));
            chain.push(Box::new(remote::TranscriptionExtractor::new(client)));
        }
        Self::new(chain, &config.pdfinfo_bin)
    }

    /// Names of the extractors that would be tried for `kind`, in order.
    pub fn chain_for(&self, kind: FileKind) -> Vec<&str> {
        self.extractors
            .iter()
            .filter(|e| e.handles(kind))
            .map(|e| e.name())
            .collect()
    }

    /// Run the chain for this source. Always returns non-empty text.
    pub async fn extract_text(&self, source: &ExtractSource) -> String {
        for extractor in self.extractors.iter().filter(|e| e.handles(source.kind)) {
            match extractor.extract(source).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(extractor = extractor.name(), file = %source.name, "extracted text");
                    return text;
                }
                Ok(_) => {
                    debug!(extractor = extractor.name(), file = %source.name, "extraction incomplete: {}", ExtractError::Empty);
                }
                Err(e) => {
                    debug!(extractor = extractor.name(), file = %source.name, "extraction incomplete: {}", e);
                }
            }
        }
        placeholder_text(source)
    }

    /// Text and metadata for one item.
    pub async fn extract(&self, source: &ExtractSource) -> Extracted {
        let text = self.extract_text(source).await;
        let metadata = metadata::extract_metadata(source, &text, &self.pdfinfo_bin);
        Extracted { text, metadata }
    }
}
