pub mod builtin;
pub mod locale;

use crate::value::Value;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type SyncFilterFn = dyn Fn(Value, &[String]) -> anyhow::Result<Value> + Send + Sync;
pub type AsyncFilterFn =
    dyn Fn(Value, Vec<String>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// 命名过滤器：接收上一步的值与字符串参数，返回新值
#[derive(Clone)]
pub enum Filter {
    Sync(Arc<SyncFilterFn>),
    Async(Arc<AsyncFilterFn>),
}

impl Filter {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value, &[String]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Filter::Sync(Arc::new(f))
    }

    /// 异步过滤器只能在 `render_async` 中使用
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Filter::Async(Arc::new(move |value, args| Box::pin(f(value, args))))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Filter::Async(_))
    }

    /// 统一调用入口，同步过滤器直接求值
    pub(crate) async fn apply(&self, value: Value, args: &[String]) -> anyhow::Result<Value> {
        match self {
            Filter::Sync(f) => f(value, args),
            Filter::Async(f) => f(value, args.to_vec()).await,
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Sync(_) => f.write_str("Filter::Sync(<function>)"),
            Filter::Async(_) => f.write_str("Filter::Async(<function>)"),
        }
    }
}

/// 调用方或插件提供的过滤器表，按名称排序
pub type FilterMap = BTreeMap<String, Filter>;

/// 过滤器来源，后注册的覆盖先注册的
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterOrigin {
    Builtin,
    Locale,
    Plugin,
    Caller,
}

#[derive(Debug, Clone)]
pub struct RegisteredFilter {
    pub filter: Filter,
    pub origin: FilterOrigin,
}

/// 合并后的过滤器查找表：内置 < 区域化 < 插件 < 调用方
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    entries: HashMap<String, RegisteredFilter>,
}

impl FilterRegistry {
    pub fn build(locale: &str, plugin_filters: &FilterMap, caller_filters: &FilterMap) -> Self {
        let mut registry = Self::default();

        for (name, filter) in builtin::text_filters() {
            registry.insert(name.to_string(), filter, FilterOrigin::Builtin);
        }
        for (name, filter) in locale::locale_filters(locale) {
            registry.insert(name.to_string(), filter, FilterOrigin::Locale);
        }
        for (name, filter) in plugin_filters {
            registry.insert(name.clone(), filter.clone(), FilterOrigin::Plugin);
        }
        for (name, filter) in caller_filters {
            registry.insert(name.clone(), filter.clone(), FilterOrigin::Caller);
        }

        tracing::trace!(locale, filters = registry.entries.len(), "过滤器表已合并");
        registry
    }

    fn insert(&mut self, name: String, filter: Filter, origin: FilterOrigin) {
        if let Some(previous) = self.entries.get(&name) {
            if origin == FilterOrigin::Plugin && previous.origin <= FilterOrigin::Locale {
                tracing::warn!(filter = %name, "插件过滤器覆盖了内置过滤器");
            }
            tracing::trace!(
                filter = %name,
                from = ?previous.origin,
                to = ?origin,
                "过滤器被覆盖"
            );
        }
        self.entries.insert(name, RegisteredFilter { filter, origin });
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.entries.get(name).map(|entry| &entry.filter)
    }

    pub fn origin(&self, name: &str) -> Option<FilterOrigin> {
        self.entries.get(name).map(|entry| entry.origin)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 第 index 个参数解析为非负整数；参数缺失或为空串时返回 None
pub(crate) fn arg_usize(args: &[String], index: usize, what: &str) -> anyhow::Result<Option<usize>> {
    match args.get(index).map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{what} must be a non-negative integer, got \"{raw}\"")),
    }
}

pub(crate) fn arg_i64(args: &[String], index: usize, what: &str) -> anyhow::Result<Option<i64>> {
    match args.get(index).map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{what} must be an integer, got \"{raw}\"")),
    }
}
