//! Extractors backed by the inference service: OCR, vision and
//! transcription. Payloads are sent base64-encoded.
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | `ocr` | `{"file", "filename"}` | `{"text"}` |
//! | `vision/analyze` | `{"image", "filename"}` | `{"objects", "description", "ocr_text"}` |
//! | `transcribe` | `{"audio", "filename"}` | `{"text"}` |

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::{ExtractSource, Extractor, FileKind};
use crate::error::{ExtractError, InferenceError};
use crate::inference::InferenceClient;

#[derive(Debug, Deserialize)]
struct TextPayload {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct VisionPayload {
    #[serde(default)]
    objects: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    ocr_text: String,
}

impl VisionPayload {
    /// `Objects detected: a, b. <description> <ocr text>`, skipping empty parts.
    fn render(&self) -> String {
        let mut parts = Vec::new();
        if !self.objects.is_empty() {
            parts.push(format!("Objects detected: {}.", self.objects.join(", ")));
        }
        for part in [&self.description, &self.ocr_text] {
            if !part.trim().is_empty() {
                parts.push(part.trim().to_string());
            }
        }
        parts.join(" ")
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<T, ExtractError> {
    serde_json::from_value(value)
        .map_err(|e| ExtractError::Remote(InferenceError::InvalidResponse(e.to_string())))
}

/// Plain OCR. Last resort for scanned documents and images.
pub struct OcrExtractor {
    client: InferenceClient,
}

impl OcrExtractor {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Extractor for OcrExtractor {
    fn name(&self) -> &str {
        "ocr"
    }

    fn handles(&self, kind: FileKind) -> bool {
        matches!(
            kind,
            FileKind::Pdf | FileKind::LegacyWord | FileKind::Ooxml | FileKind::Image
        )
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        let body = json!({ "file": STANDARD.encode(&source.bytes), "filename": source.name });
        let payload: TextPayload = decode(self.client.post_json("ocr", &body).await?)?;
        Ok(payload.text)
    }
}

/// Object detection, captioning and OCR in one call.
pub struct VisionExtractor {
    client: InferenceClient,
}

impl VisionExtractor {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Extractor for VisionExtractor {
    fn name(&self) -> &str {
        "vision"
    }

    fn handles(&self, kind: FileKind) -> bool {
        kind == FileKind::Image
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        let body = json!({ "image": STANDARD.encode(&source.bytes), "filename": source.name });
        let payload: VisionPayload =
            decode(self.client.post_json("vision/analyze", &body).await?)?;
        Ok(payload.render())
    }
}

pub struct TranscriptionExtractor {
    client: InferenceClient,
}

impl TranscriptionExtractor {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Extractor for TranscriptionExtractor {
    fn name(&self) -> &str {
        "transcribe"
    }

    fn handles(&self, kind: FileKind) -> bool {
        kind == FileKind::Audio
    }

    async fn extract(&self, source: &ExtractSource) -> Result<String, ExtractError> {
        let body = json!({ "audio": STANDARD.encode(&source.bytes), "filename": source.name });
        let payload: TextPayload = decode(self.client.post_json("transcribe", &body).await?)?;
        Ok(payload.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_render_joins_parts() {
        let payload = VisionPayload {
            objects: vec!["cat".into(), "sofa".into()],
            description: "A cat asleep on a sofa".into(),
            ocr_text: String::new(),
        };
        assert_eq!(
            payload.render(),
            "Objects detected: cat, sofa. A cat asleep on a sofa"
        );
    }

    #[test]
    fn vision_render_empty_is_empty() {
        assert_eq!(VisionPayload::default().render(), "");
    }
}
