//! Google Gemini `generateContent` over HTTPS.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ContentPart, ModelClient, ModelError, ModelRequest};
use crate::persistence::settings::AppSettings;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn from_settings(settings: &AppSettings) -> Result<Self, ModelError> {
        let mut builder = Client::builder();
        // No timeout unless the user configured one
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            model: settings.model_name.clone(),
            api_key: settings.resolved_api_key(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<WireContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Serialize)]
struct WireContent<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: WireBlob<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn to_wire(request: &ModelRequest) -> GenerateRequest<'_> {
    let parts = request
        .parts
        .iter()
        .map(|p| match p {
            ContentPart::Text(text) => WirePart::Text { text },
            ContentPart::InlineData { mime_type, data } => WirePart::Inline { inline_data: WireBlob { mime_type, data } },
        })
        .collect();
    let generation_config = if request.response_mime_type.is_some() || request.temperature.is_some() {
        Some(GenerationConfig { response_mime_type: request.response_mime_type.as_deref(), temperature: request.temperature })
    } else {
        None
    };
    GenerateRequest { contents: vec![WireContent { parts }], generation_config }
}

// Text of the first candidate, all parts joined
fn response_text(resp: GenerateResponse) -> Option<String> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        let body = to_wire(request);
        log::info!("sending analysis request to {} ({} parts)", self.model, request.parts.len());
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status { status: status.as_u16(), body });
        }
        let parsed: GenerateResponse = resp.json().await?;
        response_text(parsed).ok_or(ModelError::EmptyResponse)
    }
}
