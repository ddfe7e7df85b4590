use crate::filters::{Filter, FilterMap};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_CACHE_SIZE: usize = 200;

pub type MissingCallback = dyn Fn(&str) -> String + Send + Sync;

/// 占位符路径无法解析时的处理方式
#[derive(Clone, Default)]
pub enum OnMissing {
    /// 原样保留 `{path}`
    #[default]
    Keep,
    /// 渲染失败，返回 `Missing key "<path>"`
    Error,
    /// 用回调结果替换，回调参数为点路径
    Callback(Arc<MissingCallback>),
}

/// 参与缓存键计算的策略种类；回调本身不参与
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingKind {
    Keep,
    Error,
    Callback,
}

impl OnMissing {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        OnMissing::Callback(Arc::new(f))
    }

    pub fn kind(&self) -> MissingKind {
        match self {
            OnMissing::Keep => MissingKind::Keep,
            OnMissing::Error => MissingKind::Error,
            OnMissing::Callback(_) => MissingKind::Callback,
        }
    }
}

impl fmt::Debug for OnMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnMissing::Keep => f.write_str("Keep"),
            OnMissing::Error => f.write_str("Error"),
            OnMissing::Callback(_) => f.write_str("Callback(<function>)"),
        }
    }
}

/// 编译与诊断共用的选项
#[derive(Debug, Clone)]
pub struct Options {
    pub locale: String,
    pub on_missing: OnMissing,
    /// 为 true 时无论 on_missing 如何都按 Error 处理
    pub strict_keys: bool,
    /// 调用方过滤器，优先级最高；只有名称参与缓存键
    pub filters: FilterMap,
    /// 编译缓存容量，0 表示不缓存；None 时沿用引擎当前容量（默认 200）
    pub cache_size: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            on_missing: OnMissing::Keep,
            strict_keys: false,
            filters: FilterMap::new(),
            cache_size: None,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn on_missing(mut self, on_missing: OnMissing) -> Self {
        self.on_missing = on_missing;
        self
    }

    pub fn strict_keys(mut self, strict: bool) -> Self {
        self.strict_keys = strict;
        self
    }

    pub fn filter(mut self, name: impl Into<String>, filter: Filter) -> Self {
        self.filters.insert(name.into(), filter);
        self
    }

    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = Some(size);
        self
    }

    /// strict_keys 优先于 on_missing
    pub fn effective_on_missing(&self) -> OnMissing {
        if self.strict_keys {
            OnMissing::Error
        } else {
            self.on_missing.clone()
        }
    }

    pub(crate) fn reports_missing_keys(&self) -> bool {
        self.strict_keys || matches!(self.on_missing, OnMissing::Error)
    }
}
