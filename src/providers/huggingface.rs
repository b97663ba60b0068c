use super::{setting_or, text_or_placeholder, upstream_error, ProviderAdapter};
use crate::config::ProviderSettings;
use crate::types::ProviderName;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";
const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";
const MAX_NEW_TOKENS: u32 = 512;

/// Inference API 请求格式（单一 inputs 字段）
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    return_full_text: bool,
}

/// 文本生成接口可能返回数组或单个对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Batch(Vec<Generated>),
    Single(Generated),
}

#[derive(Debug, Default, Deserialize)]
struct Generated {
    #[serde(default)]
    generated_text: Option<String>,
}

pub struct HuggingFaceAdapter {
    client: Client,
    api_base: String,
    model: String,
}

impl HuggingFaceAdapter {
    pub fn new(client: Client, settings: Option<&ProviderSettings>) -> Self {
        Self {
            client,
            api_base: setting_or(settings, |s| s.api_base.as_str(), DEFAULT_API_BASE),
            model: setting_or(settings, |s| s.model.as_str(), DEFAULT_MODEL),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}", self.api_base, self.model)
    }
}

fn build_request(prompt: &str) -> InferenceRequest<'_> {
    InferenceRequest {
        inputs: prompt,
        parameters: InferenceParameters {
            max_new_tokens: MAX_NEW_TOKENS,
            return_full_text: false,
        },
    }
}

/// 取 [0].generated_text
fn extract_text(resp: InferenceResponse) -> Option<String> {
    match resp {
        InferenceResponse::Batch(items) => items.into_iter().next()?.generated_text,
        InferenceResponse::Single(item) => item.generated_text,
    }
}

#[async_trait]
impl ProviderAdapter for HuggingFaceAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Huggingface
    }

    async fn send(&self, prompt: &str, api_key: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&build_request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(ProviderName::Huggingface, response).await);
        }

        let inference_resp: InferenceResponse = response.json().await?;
        Ok(text_or_placeholder(extract_text(inference_resp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayGateError;
    use crate::providers::EMPTY_COMPLETION_PLACEHOLDER;
    use mockito::{Matcher, Server};

    const PATH: &str = "/models/mistralai/Mistral-7B-Instruct-v0.2";

    fn create_adapter(api_base: &str) -> HuggingFaceAdapter {
        let settings = ProviderSettings {
            api_base: api_base.to_string(),
            ..Default::default()
        };
        HuggingFaceAdapter::new(Client::new(), Some(&settings))
    }

    #[test]
    fn test_extract_text_shapes() {
        let batch: InferenceResponse =
            serde_json::from_str(r#"[{"generated_text": "from batch"}]"#).unwrap();
        assert_eq!(extract_text(batch), Some("from batch".to_string()));

        let single: InferenceResponse =
            serde_json::from_str(r#"{"generated_text": "from object"}"#).unwrap();
        assert_eq!(extract_text(single), Some("from object".to_string()));

        let empty: InferenceResponse = serde_json::from_str("[]").unwrap();
        assert_eq!(extract_text(empty), None);
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", PATH)
            .match_header("authorization", "Bearer hf_test")
            .match_body(Matcher::Json(serde_json::json!({
                "inputs": "Hello",
                "parameters": {"max_new_tokens": 512, "return_full_text": false}
            })))
            .with_status(200)
            .with_body(r#"[{"generated_text": "Hi there"}]"#)
            .create_async()
            .await;

        let adapter = create_adapter(&server.url());
        let text = adapter.send("Hello", "hf_test").await.unwrap();
        assert_eq!(text, "Hi there");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_blank_generation_returns_placeholder() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(r#"[{"generated_text": ""}]"#)
            .create_async()
            .await;

        let adapter = create_adapter(&server.url());
        let text = adapter.send("Hello", "hf_test").await.unwrap();
        assert_eq!(text, EMPTY_COMPLETION_PLACEHOLDER);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_model_loading_error() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", PATH)
            .with_status(503)
            .with_body(r#"{"error": "Model is currently loading", "estimated_time": 20.0}"#)
            .create_async()
            .await;

        let adapter = create_adapter(&server.url());
        let err = adapter.send("Hello", "hf_test").await.unwrap_err();

        match err {
            RelayGateError::UpstreamError { status, message, .. } => {
                assert_eq!(status, 503);
                assert_eq!(message, "Model is currently loading");
            }
            other => panic!("Expected UpstreamError, got {:?}", other),
        }

        mock.assert_async().await;
    }
}
