use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 简单的进程内指标收集器（不持久化）
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    backend_attempts: AtomicU64,
    failed_attempts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功请求
    pub fn record_success(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录失败请求
    pub fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次后端调用
    pub fn record_attempt(&self) {
        self.backend_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// 导出 Prometheus 格式
    pub fn export_prometheus(&self) -> String {
        format!(
            "# HELP relaygate_requests_total Total number of completion requests\n\
             # TYPE relaygate_requests_total counter\n\
             relaygate_requests_total {}\n\
             # HELP relaygate_requests_successful Successful completion requests\n\
             # TYPE relaygate_requests_successful counter\n\
             relaygate_requests_successful {}\n\
             # HELP relaygate_requests_failed Failed completion requests\n\
             # TYPE relaygate_requests_failed counter\n\
             relaygate_requests_failed {}\n\
             # HELP relaygate_backend_attempts_total Backend calls across all providers and keys\n\
             # TYPE relaygate_backend_attempts_total counter\n\
             relaygate_backend_attempts_total {}\n\
             # HELP relaygate_backend_attempts_failed Backend calls that failed or timed out\n\
             # TYPE relaygate_backend_attempts_failed counter\n\
             relaygate_backend_attempts_failed {}\n",
            self.total_requests.load(Ordering::Relaxed),
            self.successful_requests.load(Ordering::Relaxed),
            self.failed_requests.load(Ordering::Relaxed),
            self.backend_attempts.load(Ordering::Relaxed),
            self.failed_attempts.load(Ordering::Relaxed)
        )
    }
}

/// 获取全局指标实例
pub fn global_metrics() -> &'static Arc<Metrics> {
    use once_cell::sync::Lazy;
    static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));
    &METRICS
}
