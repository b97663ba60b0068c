use super::{setting_or, text_or_placeholder, upstream_error, ProviderAdapter};
use crate::config::ProviderSettings;
use crate::types::ProviderName;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini API 请求格式
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

/// Gemini API 响应格式（字段全部可缺省）
#[derive(Debug, Default, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiAdapter {
    client: Client,
    api_base: String,
    model: String,
}

impl GeminiAdapter {
    pub fn new(client: Client, settings: Option<&ProviderSettings>) -> Self {
        Self {
            client,
            api_base: setting_or(settings, |s| s.api_base.as_str(), DEFAULT_API_BASE),
            model: setting_or(settings, |s| s.model.as_str(), DEFAULT_MODEL),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }
}

fn build_request(prompt: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![GeminiPart {
                text: prompt.to_string(),
            }],
        }],
    }
}

/// 取 candidates[0].content.parts[0].text
fn extract_text(resp: GeminiResponse) -> Option<String> {
    resp.candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Gemini
    }

    async fn send(&self, prompt: &str, api_key: &str) -> Result<String> {
        // Gemini 通过查询参数传递密钥
        let response = self
            .client
            .post(self.url())
            .query(&[("key", api_key)])
            .header("Content-Type", "application/json")
            .json(&build_request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(ProviderName::Gemini, response).await);
        }

        let gemini_resp: GeminiResponse = response.json().await?;
        Ok(text_or_placeholder(extract_text(gemini_resp)))
    }
}
