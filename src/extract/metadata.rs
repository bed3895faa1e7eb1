//! Metadata extraction: format-specific sources, sidecar files and the
//! fallbacks that guarantee `title`, `author` and `creation_date`.
//!
//! Later sources override earlier ones:
//!
//! 1. format-specific (pdfinfo, OOXML properties, HTML head, first line)
//! 2. sidecar `<path>.metadata.txt`
//! 3. fallbacks for whatever is still missing

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::documents::ooxml_properties;
use super::tools::run_tool;
use super::{ExtractSource, FileKind};
use crate::models::Metadata;

pub const TITLE: &str = "metadata_title";
pub const AUTHOR: &str = "metadata_author";
pub const CREATION_DATE: &str = "metadata_creation_date";
pub const TAGS: &str = "metadata_tags";
pub const SOURCE_URL: &str = "metadata_source_url";
pub const DESCRIPTION: &str = "metadata_description";
pub const PAGE_COUNT: &str = "metadata_page_count";
pub const WORD_COUNT: &str = "metadata_word_count";
pub const SLIDE_COUNT: &str = "metadata_slide_count";
pub const MIME_TYPE: &str = "metadata_mime_type";
pub const CUSTOM_PREFIX: &str = "metadata_custom_";

/// Longest first line still treated as a title.
const MAX_TITLE_CHARS: usize = 100;

pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".metadata.txt");
    PathBuf::from(name)
}

pub fn is_sidecar(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".metadata.txt")
}

/// Collect every `metadata_*` field for one item. Never fails.
pub fn extract_metadata(source: &ExtractSource, text: &str, pdfinfo_bin: &str) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert(MIME_TYPE.into(), source.mime.clone());

    match source.kind {
        FileKind::Pdf => match run_tool(pdfinfo_bin, &[], &source.path, &[]) {
            Ok(out) => meta.extend(parse_pdfinfo(&out)),
            Err(e) => debug!(file = %source.name, "pdfinfo unavailable: {}", e),
        },
        FileKind::Ooxml => match ooxml_properties(&source.bytes) {
            Ok(props) => {
                let fields = [
                    (TITLE, props.title),
                    (AUTHOR, props.creator),
                    (CREATION_DATE, props.created),
                    (TAGS, props.keywords),
                    (PAGE_COUNT, props.pages),
                    (SLIDE_COUNT, props.slides),
                ];
                for (key, value) in fields {
                    set_nonempty(&mut meta, key, value);
                }
            }
            Err(e) => debug!(file = %source.name, "no OOXML properties: {}", e),
        },
        FileKind::Html => meta.extend(html_metadata(text)),
        FileKind::Text => set_nonempty(&mut meta, TITLE, first_line_title(text)),
        _ => {}
    }

    if source.kind.is_document() {
        meta.insert(WORD_COUNT.into(), text.split_whitespace().count().to_string());
    }

    if !source.anonymous {
        let sidecar = sidecar_path(&source.path);
        if let Ok(content) = std::fs::read_to_string(&sidecar) {
            debug!(sidecar = %sidecar.display(), "merging sidecar metadata");
            meta.extend(parse_sidecar(&content));
        }
    }

    apply_fallbacks(&mut meta, source);
    meta
}

fn set_nonempty(meta: &mut Metadata, key: &str, value: Option<String>) {
    if let Some(v) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        meta.insert(key.to_string(), v);
    }
}

/// `pdfinfo` prints `Key:   value` lines.
pub fn parse_pdfinfo(output: &str) -> Metadata {
    let mut meta = Metadata::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let field = match key.trim() {
            "Title" => TITLE,
            "Author" => AUTHOR,
            "CreationDate" => CREATION_DATE,
            "Pages" => PAGE_COUNT,
            "Keywords" => TAGS,
            _ => continue,
        };
        set_nonempty(&mut meta, field, Some(value.to_string()));
    }
    meta
}

/// `<title>` and `<meta name="author|keywords|description" content="...">`.
pub fn html_metadata(html: &str) -> Metadata {
    let mut meta = Metadata::new();
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();

    if let Some(open) = lower.find("<title") {
        if let Some(gt) = lower[open..].find('>') {
            let start = open + gt + 1;
            if let Some(len) = lower[start..].find("</title") {
                set_nonempty(&mut meta, TITLE, Some(collapse(&html[start..start + len])));
            }
        }
    }

    let mut cursor = 0;
    while let Some(pos) = lower[cursor..].find("<meta") {
        let start = cursor + pos;
        let end = lower[start..].find('>').map_or(lower.len(), |e| start + e);
        let tag = &html[start..end];
        cursor = end;

        let Some(name) = attr(tag, "name") else {
            continue;
        };
        let field = match name.to_ascii_lowercase().as_str() {
            "author" => AUTHOR,
            "keywords" => TAGS,
            "description" => DESCRIPTION,
            _ => continue,
        };
        set_nonempty(&mut meta, field, attr(tag, "content"));
    }
    meta
}

/// Value of `name="..."` (or single-quoted) inside one tag.
fn attr(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find(name) {
        let at = from + pos;
        from = at + name.len();
        let boundary = at == 0 || !lower.as_bytes()[at - 1].is_ascii_alphanumeric();
        let rest = lower[from..].trim_start();
        if !boundary || !rest.starts_with('=') {
            continue;
        }
        let value_start = tag.len() - rest.len() + 1;
        let value = tag[value_start..].trim_start();
        let quote = value.chars().next()?;
        return if quote == '"' || quote == '\'' {
            value[1..].find(quote).map(|end| value[1..1 + end].to_string())
        } else {
            value.split_whitespace().next().map(str::to_string)
        };
    }
    None
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first non-empty line, if it reads like a heading.
pub fn first_line_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_start_matches('#').trim();
    if line.is_empty()
        || line.chars().count() > MAX_TITLE_CHARS
        || line.ends_with(['.', '!', '?'])
    {
        return None;
    }
    Some(line.to_string())
}

/// Line 1 is the source URL, line 2 the tags, and every later `key: value`
/// line becomes `metadata_custom_<key>`.
pub fn parse_sidecar(content: &str) -> Metadata {
    let mut meta = Metadata::new();
    let mut lines = content.lines();
    set_nonempty(&mut meta, SOURCE_URL, lines.next().map(str::to_string));
    set_nonempty(&mut meta, TAGS, lines.next().map(str::to_string));
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace(' ', "_");
        if key.is_empty() {
            continue;
        }
        set_nonempty(
            &mut meta,
            &format!("{}{}", CUSTOM_PREFIX, key),
            Some(value.to_string()),
        );
    }
    meta
}

fn apply_fallbacks(meta: &mut Metadata, source: &ExtractSource) {
    if !meta.contains_key(TITLE) {
        let title = match (&source.address, source.anonymous) {
            (Some(address), true) => format!("IPFS Content {}", address.short(12)),
            _ => source
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| source.name.clone()),
        };
        meta.insert(TITLE.into(), title);
    }

    if !meta.contains_key(AUTHOR) {
        meta.insert(AUTHOR.into(), current_user());
    }

    if !meta.contains_key(CREATION_DATE) {
        let created: DateTime<Utc> = std::fs::metadata(&source.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        meta.insert(CREATION_DATE.into(), created.to_rfc3339());
    }
}

fn current_user() -> String {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|u| u.trim().to_string())
        .find(|u| !u.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
