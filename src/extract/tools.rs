//! External command-line converters (`pdftotext`, `antiword`, `catdoc`,
//! `pdfinfo`).
//!
//! A tool that is not installed is reported as [`ExtractError::ToolMissing`]
//! and the chain moves on.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};

use async_trait::async_trait;

use super::{ExtractSource, Extractor, FileKind};
use crate::error::ExtractError;

/// Run `bin <before...> <path> <after...>` and return its stdout as text.
pub fn run_tool(
    bin: &str,
    before: &[&str],
    path: &Path,
    after: &[&str],
) -> Result<String, ExtractError> {
    let output = Command::new(bin)
        .args(before)
        .arg(path)
        .args(after)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ExtractError::ToolMissing {
                tool: bin.to_string(),
            },
            _ => ExtractError::ToolFailed {
                tool: bin.to_string(),
                reason: e.to_string(),
            },
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::ToolFailed {
            tool: bin.to_string(),
            reason: format!("{}: {}", output.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// A converter that writes plain text to stdout.
pub struct ToolExtractor {
    label: &'static str,
    bin: String,
    before: &'static [&'static str],
    after: &'static [&'static str],
    kind: FileKind,
}

impl ToolExtractor {
    /// `pdftotext -layout <file> -`
    pub fn pdftotext(bin: &str) -> Self {
        Self {
            label: "pdftotext",
            bin: bin.to_string(),
            before: &["-layout"],
            after: &["-"],
            kind: FileKind::Pdf,
        }
    }

    pub fn antiword() -> Self {
        Self {
            label: "antiword",
            bin: "antiword".into(),
            before: &[],
            after: &[],
            kind: FileKind::LegacyWord,
        }
    }

    pub fn catdoc() -> Self {
        Self {
            label: "catdoc",
            bin: "catdoc".into(),
            before: &[],
            after: &[],
            kind: FileKind::LegacyWord,
        }
    }
}

#[async_trait]
impl Extractor for ToolExtractor {
    fn name(&self) -> &str {
        self.label
    }

    fn handles(&self, kind: FileKind) -> bool {
        kind == self.kind
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        let bin = self.bin.clone();
        let path = source.path.clone();
        let (before, after) = (self.before, self.after);
        tokio::task::spawn_blocking(move || run_tool(&bin, before, &path, after))
            .await
            .map_err(|e| ExtractError::ToolFailed {
                tool: self.bin.clone(),
                reason: e.to_string(),
            })?
    }
}
