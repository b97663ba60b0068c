use super::{setting_or, text_or_placeholder, upstream_error, ProviderAdapter};
use crate::config::ProviderSettings;
use crate::types::ProviderName;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;

/// OpenAI 兼容的 chat/completions 请求
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 适用于 OpenAI、Groq、DeepSeek 的适配器（Bearer 认证 + messages 数组）
pub struct OpenAiCompatibleAdapter {
    provider: ProviderName,
    client: Client,
    api_base: String,
    model: String,
}

impl OpenAiCompatibleAdapter {
    fn new(
        provider: ProviderName,
        client: Client,
        settings: Option<&ProviderSettings>,
        default_base: &str,
        default_model: &str,
    ) -> Self {
        Self {
            provider,
            client,
            api_base: setting_or(settings, |s| s.api_base.as_str(), default_base),
            model: setting_or(settings, |s| s.model.as_str(), default_model),
        }
    }

    pub fn openai(client: Client, settings: Option<&ProviderSettings>) -> Self {
        Self::new(
            ProviderName::Openai,
            client,
            settings,
            "https://api.openai.com/v1",
            "gpt-4o-mini",
        )
    }

    pub fn groq(client: Client, settings: Option<&ProviderSettings>) -> Self {
        Self::new(
            ProviderName::Groq,
            client,
            settings,
            "https://api.groq.com/openai/v1",
            "llama-3.1-8b-instant",
        )
    }

    pub fn deepseek(client: Client, settings: Option<&ProviderSettings>) -> Self {
        Self::new(
            ProviderName::Deepseek,
            client,
            settings,
            "https://api.deepseek.com/v1",
            "deepseek-chat",
        )
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

/// 取 choices[0].message.content
fn extract_text(resp: ChatResponse) -> Option<String> {
    resp.choices.into_iter().next()?.message?.content
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider(&self) -> ProviderName {
        self.provider
    }

    async fn send(&self, prompt: &str, api_key: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&self.build_request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(self.provider, response).await);
        }

        let chat_resp: ChatResponse = response.json().await?;
        Ok(text_or_placeholder(extract_text(chat_resp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayGateError;
    use crate::providers::EMPTY_COMPLETION_PLACEHOLDER;
    use mockito::{Matcher, Server};

    fn settings(api_base: &str) -> ProviderSettings {
        ProviderSettings {
            api_base: api_base.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_endpoints() {
        let openai = OpenAiCompatibleAdapter::openai(Client::new(), None);
        assert_eq!(openai.url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(openai.provider(), ProviderName::Openai);

        let groq = OpenAiCompatibleAdapter::groq(Client::new(), None);
        assert_eq!(groq.url(), "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(groq.provider(), ProviderName::Groq);

        let deepseek = OpenAiCompatibleAdapter::deepseek(Client::new(), None);
        assert_eq!(deepseek.url(), "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(deepseek.model, "deepseek-chat");
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test-key")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hello"}],
                "max_tokens": 1024,
                "temperature": 0.7
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "id": "chatcmpl-123",
                "object": "chat.completion",
                "created": 1677652288,
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "Hello! How can I help?"
                    },
                    "finish_reason": "stop"
                }]
            }"#,
            )
            .create_async()
            .await;

        let adapter =
            OpenAiCompatibleAdapter::openai(Client::new(), Some(&settings(&server.url())));
        let text = adapter.send("Hello", "sk-test-key").await.unwrap();
        assert_eq!(text, "Hello! How can I help?");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_null_content_returns_placeholder() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#)
            .create_async()
            .await;

        let adapter = OpenAiCompatibleAdapter::groq(Client::new(), Some(&settings(&server.url())));
        let text = adapter.send("Hello", "gsk-test").await.unwrap();
        assert_eq!(text, EMPTY_COMPLETION_PLACEHOLDER);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_api_error() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(
                r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#,
            )
            .create_async()
            .await;

        let adapter =
            OpenAiCompatibleAdapter::deepseek(Client::new(), Some(&settings(&server.url())));
        let err = adapter.send("Hello", "sk-bad").await.unwrap_err();

        match err {
            RelayGateError::UpstreamError {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, ProviderName::Deepseek);
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("Expected UpstreamError, got {:?}", other),
        }

        mock.assert_async().await;
    }
}
