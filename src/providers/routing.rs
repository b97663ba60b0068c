use crate::config::{Config, KeyPool};
use crate::error::RelayGateError;
use crate::metrics;
use crate::providers::classifier::{ErrorClassifier, StatusFirstClassifier};
use crate::providers::{ProviderAdapter, ProviderRegistry};
use crate::types::{CompletionRequest, CompletionResult, ErrorCategory, ProviderName};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 一次尝试：某个提供商的第 key_index 个密钥
struct Attempt<'a> {
    provider: ProviderName,
    key_index: usize,
    api_key: &'a str,
    adapter: &'a Arc<dyn ProviderAdapter>,
}

/// 最近一次失败的分类与诊断信息
#[derive(Debug, Clone)]
struct LastFailure {
    category: ErrorCategory,
    message: String,
}

/// 回退路由：按 (提供商 × 密钥) 顺序依次尝试，第一个成功即返回
pub struct FallbackRouter {
    keys: Arc<KeyPool>,
    registry: Arc<ProviderRegistry>,
    classifier: Arc<dyn ErrorClassifier>,
    attempt_timeout: Duration,
    request_timeout: Duration,
}

impl FallbackRouter {
    pub fn new(
        keys: Arc<KeyPool>,
        registry: Arc<ProviderRegistry>,
        classifier: Arc<dyn ErrorClassifier>,
        attempt_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            keys,
            registry,
            classifier,
            attempt_timeout,
            request_timeout,
        }
    }

    /// 使用内置适配器和状态码优先的分类器
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        Ok(Self::new(
            Arc::new(KeyPool::from_config(config)),
            Arc::new(registry),
            Arc::new(StatusFirstClassifier),
            config.timeouts.attempt(),
            config.timeouts.request(),
        ))
    }

    pub fn key_pool(&self) -> &KeyPool {
        &self.keys
    }

    /// 请求的提供商排第一，其余按固定优先级
    pub fn attempt_order(requested: ProviderName) -> Vec<ProviderName> {
        std::iter::once(requested)
            .chain(
                ProviderName::PRIORITY
                    .into_iter()
                    .filter(move |p| *p != requested),
            )
            .collect()
    }

    /// 展开为惰性的尝试序列，没有密钥的提供商直接跳过
    fn attempts(&self, order: Vec<ProviderName>) -> impl Iterator<Item = Attempt<'_>> + '_ {
        order
            .into_iter()
            .filter_map(move |provider| {
                let keys = self.keys.keys_for(provider);
                if keys.is_empty() {
                    debug!(provider = %provider, "没有可用密钥，跳过该提供商");
                    return None;
                }
                match self.registry.get(provider) {
                    Some(adapter) => Some((provider, keys, adapter)),
                    None => {
                        warn!(provider = %provider, "未注册适配器，跳过该提供商");
                        None
                    }
                }
            })
            .flat_map(|(provider, keys, adapter)| {
                keys.iter()
                    .enumerate()
                    .map(move |(key_index, api_key)| Attempt {
                        provider,
                        key_index,
                        api_key: api_key.as_str(),
                        adapter,
                    })
            })
    }

    /// 路由一次补全请求
    pub async fn route(&self, req: &CompletionRequest) -> Result<CompletionResult> {
        let mut last_failure: Option<LastFailure> = None;

        let chain = self.run_chain(req, &mut last_failure);
        let outcome = tokio::time::timeout(self.request_timeout, chain).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    secs = self.request_timeout.as_secs(),
                    "回退链超过总时限，放弃请求"
                );
                Err(RelayGateError::DeadlineExceeded {
                    secs: self.request_timeout.as_secs(),
                    last_error: last_failure.map(|f| f.message),
                })
            }
        }
    }

    async fn run_chain(
        &self,
        req: &CompletionRequest,
        last_failure: &mut Option<LastFailure>,
    ) -> Result<CompletionResult> {
        let metrics = metrics::global_metrics();

        for attempt in self.attempts(Self::attempt_order(req.provider)) {
            metrics.record_attempt();

            match self.try_attempt(&attempt, &req.prompt).await {
                Ok(text) => {
                    info!(
                        provider = %attempt.provider,
                        key_index = attempt.key_index,
                        "补全成功"
                    );
                    return Ok(CompletionResult::new(text, attempt.provider));
                }
                Err(err) => {
                    metrics.record_failed_attempt();
                    let category = self.classifier.classify(&err);
                    warn!(
                        provider = %attempt.provider,
                        key_index = attempt.key_index,
                        category = %category,
                        error = %err,
                        "后端调用失败，尝试下一个"
                    );
                    *last_failure = Some(LastFailure {
                        category,
                        message: err.to_string(),
                    });
                }
            }
        }

        // 只反映最后一次失败的分类
        Err(RelayGateError::Exhausted {
            category: last_failure
                .as_ref()
                .map(|f| f.category)
                .unwrap_or(ErrorCategory::Unknown),
            last_error: last_failure.as_ref().map(|f| f.message.clone()),
        })
    }

    async fn try_attempt(&self, attempt: &Attempt<'_>, prompt: &str) -> Result<String> {
        tokio::time::timeout(
            self.attempt_timeout,
            attempt.adapter.send(prompt, attempt.api_key),
        )
        .await
        .map_err(|_| RelayGateError::AttemptTimeout {
            provider: attempt.provider,
            secs: self.attempt_timeout.as_secs(),
        })?
    }
}
