//! In-process extraction for PDF and Office Open XML documents.
//!
//! OOXML packages are ZIP archives of XML parts. Text runs live in `<w:t>`
//! (word), `<a:t>` (slides) and shared strings (sheets); document properties
//! live in `docProps/core.xml` and `docProps/app.xml`.

use std::io::{Cursor, Read};

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{ExtractSource, Extractor, FileKind, MIME_DOCX, MIME_PPTX, MIME_XLSX};
use crate::error::ExtractError;

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Decompressed size cap for a single ZIP part.
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

/// Identify which OOXML flavour a ZIP holds, from its part names.
pub fn sniff_ooxml(bytes: &[u8]) -> Option<&'static str> {
    let archive = open_archive(bytes).ok()?;
    let mut names = archive.file_names();
    names.find_map(|n| {
        if n.starts_with("word/") {
            Some(MIME_DOCX)
        } else if n.starts_with("ppt/") {
            Some(MIME_PPTX)
        } else if n.starts_with("xl/") {
            Some(MIME_XLSX)
        } else {
            None
        }
    })
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_PART_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_PART_BYTES {
        return Err(ExtractError::Ooxml(format!("{} exceeds size limit", name)));
    }
    Ok(out)
}

/// Part names under `prefix` ending in `.xml`, ordered by their numeric suffix.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|n| {
        n.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenate the text of every `<t>` element (any namespace). Paragraph
/// ends (`</p>`) become newlines.
fn text_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_run = true,
            Ok(Event::Text(t)) if in_run => {
                out.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_run = false,
                b"p" if !out.ends_with('\n') && !out.is_empty() => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    text_runs(&xml)
}

fn pptx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&archive, "ppt/slides/slide") {
        let text = text_runs(&read_part(&mut archive, &name)?)?;
        if !text.trim().is_empty() {
            slides.push(text.trim().to_string());
        }
    }
    Ok(slides.join("\n\n"))
}

fn xlsx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = match read_part(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(_) => Vec::new(),
    };
    let mut sheets = Vec::new();
    for name in numbered_parts(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let cells = sheet_cells(&read_part(&mut archive, &name)?, &shared)?;
        if !cells.is_empty() {
            sheets.push(cells);
        }
    }
    Ok(sheets.join("\n"))
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one worksheet, shared strings resolved, space-separated.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut is_shared = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    is_shared = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_value => {
                let raw = t.unescape().unwrap_or_default();
                let value = raw.trim();
                if is_shared {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => is_shared = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

/// Document properties from `docProps/core.xml` and `docProps/app.xml`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OoxmlProperties {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub created: Option<String>,
    pub keywords: Option<String>,
    pub pages: Option<String>,
    pub slides: Option<String>,
}

/// Read OOXML package properties. Missing parts yield empty fields.
pub fn ooxml_properties(bytes: &[u8]) -> Result<OoxmlProperties, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut props = OoxmlProperties::default();
    if let Ok(core) = read_part(&mut archive, "docProps/core.xml") {
        for (name, value) in leaf_elements(&core)? {
            let slot = match name.as_str() {
                "title" => &mut props.title,
                "creator" => &mut props.creator,
                "created" => &mut props.created,
                "keywords" => &mut props.keywords,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
    }
    if let Ok(app) = read_part(&mut archive, "docProps/app.xml") {
        for (name, value) in leaf_elements(&app)? {
            match name.as_str() {
                "Pages" => props.pages = Some(value),
                "Slides" => props.slides = Some(value),
                _ => {}
            }
        }
    }
    Ok(props)
}

/// `(local name, trimmed text)` for every element that directly holds text.
fn leaf_elements(xml: &[u8]) -> Result<Vec<(String, String)>, ExtractError> {
    let mut out = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut open: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                open = Some(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().trim().to_string();
                if let (Some(name), false) = (open.take(), text.is_empty()) {
                    out.push((name, text));
                }
            }
            Ok(Event::End(_)) => open = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// `pdf-extract`, used when `pdftotext` is unavailable or produced nothing.
pub struct PdfExtractor;

#[async_trait]
impl Extractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn handles(&self, kind: FileKind) -> bool {
        kind == FileKind::Pdf
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        let bytes = source.bytes.clone();
        // pdf-extract can panic on malformed input; keep that off the runtime.
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractError::Pdf(e.to_string()))?
            .map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

/// docx, pptx and xlsx via ZIP + XML.
pub struct OoxmlExtractor;

#[async_trait]
impl Extractor for OoxmlExtractor {
    fn name(&self) -> &str {
        "ooxml"
    }

    fn handles(&self, kind: FileKind) -> bool {
        kind == FileKind::Ooxml
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        match source.mime.as_str() {
            MIME_DOCX => docx_text(&source.bytes),
            MIME_PPTX => pptx_text(&source.bytes),
            MIME_XLSX => xlsx_text(&source.bytes),
            other => Err(ExtractError::Ooxml(format!("unsupported package {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a ZIP in memory from `(part name, contents)` pairs.
    fn zip_parts(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let opts = zip::write::SimpleFileOptions::default();
            for (name, body) in parts {
                zip.start_file(*name, opts).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    const DOCX_BODY: &str = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body><w:p><w:r><w:t>Quarterly Report</w:t></w:r></w:p>
<w:p><w:r><w:t>Revenue grew </w:t></w:r><w:r><w:t>12%.</w:t></w:r></w:p></w:body>
</w:document>"#;

    const CORE_XML: &str = r#"<?xml version="1.0"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
 xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/">
<dc:title>Q3 Results</dc:title><dc:creator>Jane Doe</dc:creator>
<cp:keywords>finance, quarterly</cp:keywords>
<dcterms:created>2023-10-01T09:00:00Z</dcterms:created>
</cp:coreProperties>"#;

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = zip_parts(&[("word/document.xml", DOCX_BODY)]);
        let text = docx_text(&bytes).unwrap();
        assert_eq!(text.trim(), "Quarterly Report\nRevenue grew 12%.");
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |s: &str| format!(r#"<p:sld xmlns:a="a" xmlns:p="p"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>"#, s);
        let (s1, s2, s10) = (slide("one"), slide("two"), slide("ten"));
        let bytes = zip_parts(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);
        assert_eq!(pptx_text(&bytes).unwrap(), "one\n\ntwo\n\nten");
    }

    #[test]
    fn xlsx_resolves_shared_strings() {
        let shared = r#"<sst><si><t>Region</t></si><si><t>North</t></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row>
            <c r="A1" t="s"><v>0</v></c><c r="B1"><v>42</v></c>
            <c r="A2" t="s"><v>1</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_parts(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(xlsx_text(&bytes).unwrap(), "Region 42 North");
    }

    #[test]
    fn properties_from_core_and_app() {
        let app = r#"<Properties><Pages>3</Pages></Properties>"#;
        let bytes = zip_parts(&[
            ("word/document.xml", DOCX_BODY),
            ("docProps/core.xml", CORE_XML),
            ("docProps/app.xml", app),
        ]);
        let props = ooxml_properties(&bytes).unwrap();
        assert_eq!(props.title.as_deref(), Some("Q3 Results"));
        assert_eq!(props.creator.as_deref(), Some("Jane Doe"));
        assert_eq!(props.keywords.as_deref(), Some("finance, quarterly"));
        assert_eq!(props.created.as_deref(), Some("2023-10-01T09:00:00Z"));
        assert_eq!(props.pages.as_deref(), Some("3"));
        assert_eq!(props.slides, None);
    }

    #[test]
    fn sniffs_package_flavour() {
        let docx = zip_parts(&[("word/document.xml", DOCX_BODY)]);
        assert_eq!(sniff_ooxml(&docx), Some(MIME_DOCX));
        let plain = zip_parts(&[("readme.txt", "hi")]);
        assert_eq!(sniff_ooxml(&plain), None);
        assert_eq!(sniff_ooxml(b"not a zip"), None);
    }

    #[test]
    fn invalid_zip_is_an_error() {
        assert!(matches!(docx_text(b"not a zip"), Err(ExtractError::Ooxml(_))));
    }
}
