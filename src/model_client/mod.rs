//! Boundary to the external generative model.
//!
//! The rest of the crate only sees [`ModelClient`]: a list of parts goes in,
//! raw text (or a failure) comes out.

pub mod gemini;
pub mod prompt;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::attachments::FileAttachment;

pub use gemini::GeminiClient;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no API key configured (set GEMINI_API_KEY or the api_key setting)")]
    MissingApiKey,
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("the model returned no text")]
    EmptyResponse,
    #[error("{0}")]
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    // `data` is base64 without any data-URL prefix
    InlineData { mime_type: String, data: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub parts: Vec<ContentPart>,
    pub response_mime_type: Option<String>,
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Instruction, then every attachment in submission order, then the
/// synthesis directive.
pub fn build_analysis_request(attachments: &[FileAttachment], temperature: Option<f32>) -> ModelRequest {
    let mut parts = Vec::with_capacity(attachments.len() + 2);
    parts.push(ContentPart::Text(prompt::SYSTEM_INSTRUCTION.to_string()));
    for a in attachments {
        parts.push(ContentPart::InlineData {
            mime_type: a.mime_type.clone(),
            data: strip_data_url(&a.content).to_string(),
        });
    }
    parts.push(ContentPart::Text(prompt::SYNTHESIS_INSTRUCTION.to_string()));
    ModelRequest {
        parts,
        response_mime_type: Some("application/json".to_string()),
        temperature,
    }
}

// "data:application/pdf;base64,AAAA" -> "AAAA"
fn strip_data_url(content: &str) -> &str {
    if content.starts_with("data:") {
        if let Some((_, payload)) = content.split_once(',') {
            return payload;
        }
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, content: &str) -> FileAttachment {
        FileAttachment { name: name.into(), mime_type: "application/pdf".into(), content: content.into() }
    }

    #[test]
    fn request_keeps_attachment_order_between_instructions() {
        let req = build_analysis_request(&[attachment("a.pdf", "QQ=="), attachment("b.pdf", "Qg==")], Some(0.2));
        assert_eq!(req.parts.len(), 4);
        assert!(matches!(&req.parts[0], ContentPart::Text(t) if t.contains("Research-Buddy")));
        assert_eq!(req.parts[1], ContentPart::InlineData { mime_type: "application/pdf".into(), data: "QQ==".into() });
        assert_eq!(req.parts[2], ContentPart::InlineData { mime_type: "application/pdf".into(), data: "Qg==".into() });
        assert!(matches!(&req.parts[3], ContentPart::Text(_)));
        assert_eq!(req.response_mime_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url("data:application/pdf;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url("QUJD"), "QUJD");
    }
}
