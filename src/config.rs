use crate::options::{DEFAULT_CACHE_SIZE, DEFAULT_LOCALE, OnMissing, Options};
use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// 引擎配置，通常来自 `stencil.toml`
///
/// ```toml
/// locale = "de-DE"
/// on_missing = "error"
/// cache_size = 50
///
/// [templates]
/// footer = "-- {author}"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub on_missing: MissingPolicy,
    #[serde(default)]
    pub strict_keys: bool,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// 引擎创建时注册的子模板
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
}

/// 配置文件里可写的缺失策略；回调只能在代码中设置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    #[default]
    Keep,
    Error,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            on_missing: MissingPolicy::Keep,
            strict_keys: false,
            cache_size: default_cache_size(),
            templates: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("读取 {} 失败：{}", path.display(), e))?;
        Self::from_toml_str(&content)
            .map_err(|e| anyhow::anyhow!("解析 {} 失败：{}", path.display(), e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// 转换为默认编译选项（不含过滤器）；缓存容量由引擎在创建时读取
    pub fn options(&self) -> Options {
        let on_missing = match self.on_missing {
            MissingPolicy::Keep => OnMissing::Keep,
            MissingPolicy::Error => OnMissing::Error,
        };
        Options::new()
            .locale(self.locale.clone())
            .on_missing(on_missing)
            .strict_keys(self.strict_keys)
    }
}

// 默认值函数
fn default_locale() -> String { DEFAULT_LOCALE.into() }
fn default_cache_size() -> usize { DEFAULT_CACHE_SIZE }
