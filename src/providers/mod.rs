pub mod anthropic;
pub mod classifier;
pub mod gemini;
pub mod huggingface;
pub mod openai;
pub mod routing;

use crate::config::{Config, ProviderSettings};
use crate::error::RelayGateError;
use crate::types::ProviderName;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 后端返回成功但没有文本时使用的占位内容
pub const EMPTY_COMPLETION_PLACEHOLDER: &str = "No response generated";

/// 错误响应体的最大保留长度
const MAX_ERROR_BODY_CHARS: usize = 4096;

/// Provider 适配器 - 每个后端一个实现
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderName;

    /// 用给定密钥发送一次请求，返回补全文本
    async fn send(&self, prompt: &str, api_key: &str) -> Result<String>;
}

/// 按 ProviderName 索引的适配器表
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderName, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据配置注册全部六个内置适配器
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(config.timeouts.attempt())?;
        let mut registry = Self::new();

        for provider in ProviderName::PRIORITY {
            let settings = config.settings(provider);
            let adapter: Arc<dyn ProviderAdapter> = match provider {
                ProviderName::Gemini => {
                    Arc::new(gemini::GeminiAdapter::new(client.clone(), settings))
                }
                ProviderName::Openai => Arc::new(openai::OpenAiCompatibleAdapter::openai(
                    client.clone(),
                    settings,
                )),
                ProviderName::Claude => {
                    Arc::new(anthropic::ClaudeAdapter::new(client.clone(), settings))
                }
                ProviderName::Groq => Arc::new(openai::OpenAiCompatibleAdapter::groq(
                    client.clone(),
                    settings,
                )),
                ProviderName::Deepseek => Arc::new(openai::OpenAiCompatibleAdapter::deepseek(
                    client.clone(),
                    settings,
                )),
                ProviderName::Huggingface => Arc::new(huggingface::HuggingFaceAdapter::new(
                    client.clone(),
                    settings,
                )),
            };
            registry.register(adapter);
        }

        Ok(registry)
    }

    /// 注册（或替换）一个适配器
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: ProviderName) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider)
    }
}

/// 创建共享 HTTP 客户端（连接池复用）
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()?;
    Ok(client)
}

/// 配置覆盖优先，否则使用默认值
pub(crate) fn setting_or(
    settings: Option<&ProviderSettings>,
    pick: impl Fn(&ProviderSettings) -> &str,
    default: &str,
) -> String {
    match settings.map(pick) {
        Some(value) if !value.is_empty() => value.trim_end_matches('/').to_string(),
        _ => default.to_string(),
    }
}

/// 读取非 2xx 响应并转换为上游错误
pub(crate) async fn upstream_error(
    provider: ProviderName,
    response: reqwest::Response,
) -> RelayGateError {
    let status = response.status().as_u16();
    // 限制错误响应体大小，防止 DoS 攻击
    let body = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect::<String>();
    RelayGateError::upstream(provider, status, extract_error_message(&body))
}

/// 从常见的错误结构中提取消息，失败时返回原始内容
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    value
        .pointer("/error/message")
        .or_else(|| value.get("error").filter(|e| e.is_string()))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// 空文本替换为占位内容
pub(crate) fn text_or_placeholder(text: Option<String>) -> String {
    match text {
        Some(t) if !t.is_empty() => t,
        _ => EMPTY_COMPLETION_PLACEHOLDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error": {"message": "Rate limit reached"}}"#),
            "Rate limit reached"
        );
        assert_eq!(
            extract_error_message(r#"{"error": "Model is currently loading"}"#),
            "Model is currently loading"
        );
        assert_eq!(
            extract_error_message(r#"{"message": "Unauthorized"}"#),
            "Unauthorized"
        );
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(
            extract_error_message(r#"{"error": {"code": 500}}"#),
            r#"{"error": {"code": 500}}"#
        );
    }

    #[test]
    fn test_text_or_placeholder() {
        assert_eq!(text_or_placeholder(Some("hi".to_string())), "hi");
        assert_eq!(text_or_placeholder(Some(String::new())), EMPTY_COMPLETION_PLACEHOLDER);
        // 只有空白的文本原样返回
        assert_eq!(text_or_placeholder(Some("\n".to_string())), "\n");
        assert_eq!(text_or_placeholder(None), EMPTY_COMPLETION_PLACEHOLDER);
    }

    #[test]
    fn test_setting_or() {
        let settings = ProviderSettings {
            api_keys: String::new(),
            api_base: "http://127.0.0.1:9000/".to_string(),
            model: String::new(),
        };
        assert_eq!(
            setting_or(Some(&settings), |s| s.api_base.as_str(), "https://example.com"),
            "http://127.0.0.1:9000"
        );
        assert_eq!(setting_or(Some(&settings), |s| s.model.as_str(), "m1"), "m1");
        assert_eq!(setting_or(None, |s| s.model.as_str(), "m1"), "m1");
    }

    #[test]
    fn test_registry_from_config_registers_all_providers() {
        let registry = ProviderRegistry::from_config(&Config::default()).unwrap();
        for provider in ProviderName::PRIORITY {
            let adapter = registry.get(provider).unwrap();
            assert_eq!(adapter.provider(), provider);
        }
    }
}
