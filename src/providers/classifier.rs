use crate::error::RelayGateError;
use crate::types::ErrorCategory;

/// 失败分类器
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, err: &RelayGateError) -> ErrorCategory;
}

/// 按消息内容分类（不区分大小写的子串匹配）
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageClassifier;

impl MessageClassifier {
    pub fn classify_message(message: &str) -> ErrorCategory {
        let msg = message.to_lowercase();

        if msg.contains("rate limit") {
            return ErrorCategory::RateLimited;
        }
        if msg.contains("unauthorized") || msg.contains("invalid key") {
            return ErrorCategory::Unauthorized;
        }
        ErrorCategory::Unknown
    }
}

impl ErrorClassifier for MessageClassifier {
    fn classify(&self, err: &RelayGateError) -> ErrorCategory {
        Self::classify_message(&err.backend_message())
    }
}

/// 先看状态码（429 / 401 / 403），没有结论时退回消息匹配
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFirstClassifier;

impl ErrorClassifier for StatusFirstClassifier {
    fn classify(&self, err: &RelayGateError) -> ErrorCategory {
        match err.status() {
            Some(429) => ErrorCategory::RateLimited,
            Some(401) | Some(403) => ErrorCategory::Unauthorized,
            _ => MessageClassifier.classify(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderName;

    #[test]
    fn test_message_classifier() {
        assert_eq!(
            MessageClassifier::classify_message("Rate limit reached for gpt-4o-mini"),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            MessageClassifier::classify_message("401 Unauthorized"),
            ErrorCategory::Unauthorized
        );
        assert_eq!(
            MessageClassifier::classify_message("Invalid key supplied"),
            ErrorCategory::Unauthorized
        );
        assert_eq!(
            MessageClassifier::classify_message("Service Unavailable"),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_message_classifier_ignores_status() {
        let err = RelayGateError::upstream(ProviderName::Openai, 429, "Too Many Requests");
        assert_eq!(MessageClassifier.classify(&err), ErrorCategory::Unknown);
    }

    #[test]
    fn test_status_first_classifier() {
        let classifier = StatusFirstClassifier;

        let err = RelayGateError::upstream(ProviderName::Openai, 429, "Too Many Requests");
        assert_eq!(classifier.classify(&err), ErrorCategory::RateLimited);

        let err = RelayGateError::upstream(ProviderName::Claude, 401, "invalid x-api-key");
        assert_eq!(classifier.classify(&err), ErrorCategory::Unauthorized);

        let err = RelayGateError::upstream(ProviderName::Gemini, 403, "API key not valid");
        assert_eq!(classifier.classify(&err), ErrorCategory::Unauthorized);

        // 状态码无法判断时保留消息匹配行为
        let err = RelayGateError::upstream(ProviderName::Groq, 400, "rate limit exceeded");
        assert_eq!(classifier.classify(&err), ErrorCategory::RateLimited);

        let err = RelayGateError::upstream(ProviderName::Groq, 500, "internal error");
        assert_eq!(classifier.classify(&err), ErrorCategory::Unknown);
    }

    #[test]
    fn test_timeout_is_unknown() {
        let err = RelayGateError::AttemptTimeout {
            provider: ProviderName::Deepseek,
            secs: 30,
        };
        assert_eq!(StatusFirstClassifier.classify(&err), ErrorCategory::Unknown);
    }
}
