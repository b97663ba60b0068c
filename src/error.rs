use crate::types::{ErrorCategory, ProviderName};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayGateError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML 解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP 请求错误: {0}")]
    HttpError(reqwest::Error),

    #[error("上游 API 错误 ({provider}): {status} - {message}")]
    UpstreamError {
        provider: ProviderName,
        status: u16,
        message: String,
    },

    #[error("请求超时 ({provider}): {secs} 秒内未响应")]
    AttemptTimeout { provider: ProviderName, secs: u64 },

    #[error("请求总时限已到: {secs} 秒")]
    DeadlineExceeded {
        secs: u64,
        last_error: Option<String>,
    },

    #[error("所有提供商均失败 (最后分类: {category})")]
    Exhausted {
        category: ErrorCategory,
        last_error: Option<String>,
    },

    #[error("内部错误: {0}")]
    InternalError(String),
}

// Gemini 的密钥在查询串里，reqwest 错误的 Display 会带上完整 URL
impl From<reqwest::Error> for RelayGateError {
    fn from(err: reqwest::Error) -> Self {
        RelayGateError::HttpError(err.without_url())
    }
}

impl RelayGateError {
    pub fn config(msg: impl Into<String>) -> Self {
        RelayGateError::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RelayGateError::InternalError(msg.into())
    }

    pub fn upstream(provider: ProviderName, status: u16, message: impl Into<String>) -> Self {
        RelayGateError::UpstreamError {
            provider,
            status,
            message: message.into(),
        }
    }

    /// 上游返回的 HTTP 状态码（仅对上游错误有意义）
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayGateError::UpstreamError { status, .. } => Some(*status),
            RelayGateError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// 用于分类的原始消息文本
    pub fn backend_message(&self) -> String {
        match self {
            RelayGateError::UpstreamError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = RelayGateError::ConfigError("测试错误".to_string());
        assert_eq!(err.to_string(), "配置错误: 测试错误");

        let err = RelayGateError::upstream(ProviderName::Claude, 429, "rate limit exceeded");
        assert_eq!(
            err.to_string(),
            "上游 API 错误 (claude): 429 - rate limit exceeded"
        );

        let err = RelayGateError::Exhausted {
            category: ErrorCategory::Unauthorized,
            last_error: None,
        };
        assert_eq!(err.to_string(), "所有提供商均失败 (最后分类: unauthorized)");
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "文件未找到");
        let err: RelayGateError = io_err.into();
        assert!(matches!(err, RelayGateError::IoError(_)));
    }

    #[test]
    fn test_error_conversion_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: RelayGateError = json_err.into();
        assert!(matches!(err, RelayGateError::JsonError(_)));
    }

    #[test]
    fn test_status_and_backend_message() {
        let err = RelayGateError::upstream(ProviderName::Openai, 401, "Invalid key");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.backend_message(), "Invalid key");

        let err = RelayGateError::AttemptTimeout {
            provider: ProviderName::Groq,
            secs: 30,
        };
        assert_eq!(err.status(), None);
        assert!(err.backend_message().contains("groq"));
    }

    #[test]
    fn test_convenience_constructors() {
        let err = RelayGateError::config("配置无效");
        assert!(matches!(err, RelayGateError::ConfigError(_)));
        assert_eq!(err.to_string(), "配置错误: 配置无效");

        let err = RelayGateError::internal("内部错误");
        assert!(matches!(err, RelayGateError::InternalError(_)));
    }
}
