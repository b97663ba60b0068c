use super::{setting_or, text_or_placeholder, upstream_error, ProviderAdapter};
use crate::config::ProviderSettings;
use crate::types::ProviderName;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Anthropic API 请求格式
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Anthropic API 响应格式
#[derive(Debug, Default, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct ClaudeAdapter {
    client: Client,
    api_base: String,
    model: String,
}

impl ClaudeAdapter {
    pub fn new(client: Client, settings: Option<&ProviderSettings>) -> Self {
        Self {
            client,
            api_base: setting_or(settings, |s| s.api_base.as_str(), DEFAULT_API_BASE),
            model: setting_or(settings, |s| s.model.as_str(), DEFAULT_MODEL),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.api_base)
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

/// 取第一个 text 块
fn extract_text(resp: AnthropicResponse) -> Option<String> {
    resp.content
        .into_iter()
        .find(|block| block.block_type == "text")?
        .text
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Claude
    }

    async fn send(&self, prompt: &str, api_key: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&self.build_request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(ProviderName::Claude, response).await);
        }

        let anthropic_resp: AnthropicResponse = response.json().await?;
        Ok(text_or_placeholder(extract_text(anthropic_resp)))
    }
}
