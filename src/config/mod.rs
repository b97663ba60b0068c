pub mod key_pool;

pub use key_pool::{parse_key_list, KeyPool};

use crate::error::RelayGateError;
use crate::types::ProviderName;
use crate::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("环境变量正则无效"));

/// 主配置结构（启动时构建一次，之后只读）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub providers: HashMap<ProviderName, ProviderSettings>,
}

/// 单个提供商的配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// 逗号分隔的密钥列表
    #[serde(default, deserialize_with = "null_as_empty")]
    pub api_keys: String,
    /// 覆盖默认的 API 地址（为空时使用官方地址）
    #[serde(default, deserialize_with = "null_as_empty")]
    pub api_base: String,
    /// 覆盖默认模型
    #[serde(default, deserialize_with = "null_as_empty")]
    pub model: String,
}

// `api_keys:` 不写值时是 YAML null
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ProviderSettings {
    pub fn keys(&self) -> Vec<String> {
        parse_key_list(&self.api_keys)
    }
}

/// 超时配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// 单次后端调用上限
    #[serde(default = "default_attempt_secs")]
    pub attempt_secs: u64,
    /// 整条回退链的总时限
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
}

fn default_attempt_secs() -> u64 {
    30
}

fn default_request_secs() -> u64 {
    90
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_secs: default_attempt_secs(),
            request_secs: default_request_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn attempt(&self) -> Duration {
        Duration::from_secs(self.attempt_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Config {
    /// 从 YAML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut raw: Value = serde_yaml::from_str(&content)?;
        if raw.is_null() {
            raw = Value::Mapping(Mapping::new());
        }
        Self::expand_env_vars(&mut raw);
        let config: Config = serde_yaml::from_value(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 从环境变量 `<PROVIDER>_API_KEYS` 构建配置
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 使用自定义查找函数构建配置，便于测试注入
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let providers = ProviderName::PRIORITY
            .into_iter()
            .filter_map(|p| {
                lookup(&p.env_var()).map(|api_keys| {
                    (
                        p,
                        ProviderSettings {
                            api_keys,
                            ..Default::default()
                        },
                    )
                })
            })
            .collect();

        let config = Config {
            timeouts: TimeoutConfig::default(),
            providers,
        };
        config.validate()?;
        Ok(config)
    }

    /// 在解析后的字符串标量内替换 ${VAR}，替换结果不再经过 YAML 解析
    fn expand_env_vars(value: &mut Value) {
        match value {
            Value::String(s) => {
                if ENV_VAR_PATTERN.is_match(s.as_str()) {
                    *s = Self::replace_env_vars(s.as_str());
                }
            }
            Value::Sequence(items) => {
                for item in items.iter_mut() {
                    Self::expand_env_vars(item);
                }
            }
            Value::Mapping(map) => {
                for (_, item) in map.iter_mut() {
                    Self::expand_env_vars(item);
                }
            }
            Value::Tagged(tagged) => Self::expand_env_vars(&mut tagged.value),
            _ => {}
        }
    }

    /// 替换 ${VAR}，未设置的变量替换为空字符串
    fn replace_env_vars(content: &str) -> String {
        ENV_VAR_PATTERN
            .replace_all(content, |caps: &Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| {
                    warn!("环境变量未设置: {}，按空值处理", var_name);
                    String::new()
                })
            })
            .into_owned()
    }

    /// 验证配置
    fn validate(&self) -> Result<()> {
        if self.timeouts.attempt_secs == 0 {
            return Err(RelayGateError::config("timeouts.attempt_secs 必须大于 0"));
        }
        if self.timeouts.request_secs == 0 {
            return Err(RelayGateError::config("timeouts.request_secs 必须大于 0"));
        }
        if self.timeouts.attempt_secs > self.timeouts.request_secs {
            return Err(RelayGateError::config(
                "timeouts.attempt_secs 不能大于 timeouts.request_secs",
            ));
        }
        Ok(())
    }

    /// 查找提供商配置
    pub fn settings(&self, provider: ProviderName) -> Option<&ProviderSettings> {
        self.providers.get(&provider)
    }
}
