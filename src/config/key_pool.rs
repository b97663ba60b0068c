use super::Config;
use crate::types::ProviderName;
use std::collections::HashMap;

/// 每个提供商的有序密钥池，启动后不再修改
#[derive(Debug, Clone, Default)]
pub struct KeyPool {
    keys: HashMap<ProviderName, Vec<String>>,
}

impl KeyPool {
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (ProviderName, Vec<K>)>,
        K: Into<String>,
    {
        let keys = entries
            .into_iter()
            .map(|(provider, keys)| (provider, keys.into_iter().map(Into::into).collect()))
            .collect();
        Self { keys }
    }

    pub fn from_config(config: &Config) -> Self {
        let keys = config
            .providers
            .iter()
            .map(|(provider, settings)| (*provider, settings.keys()))
            .collect();
        Self { keys }
    }

    /// 返回某个提供商的密钥（可能为空，空表示跳过该提供商）
    pub fn keys_for(&self, provider: ProviderName) -> &[String] {
        self.keys.get(&provider).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 至少有一个密钥的提供商，按优先级排列
    pub fn configured(&self) -> Vec<ProviderName> {
        ProviderName::PRIORITY
            .into_iter()
            .filter(|p| !self.keys_for(*p).is_empty())
            .collect()
    }
}

/// 解析逗号分隔的密钥列表，去除空白和空项
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
