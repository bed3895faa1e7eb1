//! Verbatim extraction for text-like files.

use async_trait::async_trait;

use super::{ExtractSource, Extractor, FileKind};
use crate::error::ExtractError;

/// Reads the bytes as UTF-8, replacing invalid sequences.
pub struct PlainTextExtractor;

#[async_trait]
impl Extractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    fn handles(&self, kind: FileKind) -> bool {
        matches!(kind, FileKind::Text | FileKind::Html)
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        let text = String::from_utf8_lossy(&source.bytes);
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source(bytes: &[u8]) -> ExtractSource {
        ExtractSource {
            path: PathBuf::from("notes.md"),
            name: "notes.md".into(),
            mime: "text/markdown".into(),
            kind: FileKind::Text,
            bytes: bytes.to_vec(),
            address: None,
            anonymous: false,
        }
    }

    #[tokio::test]
    async fn strips_bom() {
        let text = PlainTextExtractor
            .extract(&source(b"\xef\xbb\xbf# Title\nbody"))
            .await
            .unwrap();
        assert_eq!(text, "# Title\nbody");
    }

    #[tokio::test]
    async fn tolerates_invalid_utf8() {
        let text = PlainTextExtractor.extract(&source(b"ok \xff ok")).await.unwrap();
        assert!(text.starts_with("ok "));
    }
}
