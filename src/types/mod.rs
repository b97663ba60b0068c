use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 已接入的后端提供商（封闭集合，顺序即默认尝试顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    #[default]
    Gemini,
    Openai,
    Claude,
    Groq,
    Deepseek,
    Huggingface,
}

impl ProviderName {
    /// 固定优先级列表
    pub const PRIORITY: [ProviderName; 6] = [
        ProviderName::Gemini,
        ProviderName::Openai,
        ProviderName::Claude,
        ProviderName::Groq,
        ProviderName::Deepseek,
        ProviderName::Huggingface,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Gemini => "gemini",
            ProviderName::Openai => "openai",
            ProviderName::Claude => "claude",
            ProviderName::Groq => "groq",
            ProviderName::Deepseek => "deepseek",
            ProviderName::Huggingface => "huggingface",
        }
    }

    /// 存放密钥列表的环境变量名，例如 `GEMINI_API_KEYS`
    pub fn env_var(&self) -> String {
        format!("{}_API_KEYS", self.as_str().to_uppercase())
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderName::PRIORITY
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unsupported model: {}", s))
    }
}

/// 单次失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimited,
    Unauthorized,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// 网关入站请求体（未校验）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionPayload {
    /// 校验请求体并转换为路由请求
    pub fn validate(self) -> Result<CompletionRequest, String> {
        let prompt = match self.prompt {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err("Prompt is required".to_string()),
        };

        let provider = match self.model {
            Some(model) => model.parse::<ProviderName>()?,
            None => ProviderName::default(),
        };

        Ok(CompletionRequest { prompt, provider })
    }
}

/// 校验后的补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub provider: ProviderName,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, provider: ProviderName) -> Self {
        Self {
            prompt: prompt.into(),
            provider,
        }
    }
}

/// 补全结果，`model` 与实际使用的 provider 一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    #[serde(rename = "response")]
    pub message: String,
    pub provider: ProviderName,
    pub model: ProviderName,
}

impl CompletionResult {
    pub fn new(message: impl Into<String>, provider: ProviderName) -> Self {
        Self {
            message: message.into(),
            provider,
            model: provider,
        }
    }
}

/// 错误响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
