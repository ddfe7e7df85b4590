//! 插件扩展点。
//!
//! 插件按优先级（数值小的先执行，相同优先级按注册顺序）参与三个阶段：
//! 提供过滤器、编译前改写源码、渲染后改写输出。每个钩子都显式接收
//! [`PluginContext`]，其中包含当前选项、插件自己的状态表以及同伴插件查询。

use crate::error::{TemplateError, TemplateResult};
use crate::filters::FilterMap;
use crate::options::Options;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    /// 贡献的过滤器，优先级介于区域化过滤器与调用方过滤器之间
    fn filters(&self, _ctx: &mut PluginContext<'_>) -> FilterMap {
        FilterMap::new()
    }

    /// 解析前改写模板源码；缓存键仍使用原始源码
    fn transform_source(&self, source: String, _ctx: &mut PluginContext<'_>) -> anyhow::Result<String> {
        Ok(source)
    }

    /// 改写 `Engine::render` 的输出
    fn after_render(&self, output: String, _ctx: &mut PluginContext<'_>) -> anyhow::Result<String> {
        Ok(output)
    }
}

/// 钩子调用时传入的上下文
pub struct PluginContext<'a> {
    name: &'a str,
    options: &'a Options,
    state: &'a mut HashMap<String, Value>,
    plugins: &'a [String],
}

impl<'a> PluginContext<'a> {
    pub fn plugin_name(&self) -> &str {
        self.name
    }

    pub fn options(&self) -> &Options {
        self.options
    }

    pub fn state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.state.insert(key.into(), value.into())
    }

    pub fn state_mut(&mut self) -> &mut HashMap<String, Value> {
        self.state
    }

    pub fn has_sibling(&self, name: &str) -> bool {
        name != self.name && self.plugins.iter().any(|p| p == name)
    }

    /// 其他已注册插件的名称，按执行顺序
    pub fn siblings(&self) -> impl Iterator<Item = &str> {
        self.plugins
            .iter()
            .map(String::as_str)
            .filter(move |p| *p != self.name)
    }
}

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    state: Mutex<HashMap<String, Value>>,
}

/// 已注册插件，按优先级排序
#[derive(Default)]
pub struct PluginHost {
    entries: Vec<PluginEntry>,
    names: Vec<String>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件；同名插件会被替换，其状态一并丢弃
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();
        if let Some(index) = self.entries.iter().position(|e| e.plugin.name() == name) {
            tracing::warn!(plugin = %name, "插件重复注册，替换旧实例");
            self.entries.remove(index);
        }

        tracing::debug!(plugin = %name, priority = plugin.priority(), "注册插件");
        self.entries.push(PluginEntry {
            plugin,
            state: Mutex::new(HashMap::new()),
        });
        self.entries.sort_by_key(|e| e.plugin.priority());
        self.names = self.entries.iter().map(|e| e.plugin.name().to_string()).collect();
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.plugin.name() != name);
        self.names.retain(|n| n != name);
        before != self.entries.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn with_context<T>(
        &self,
        entry: &PluginEntry,
        options: &Options,
        f: impl FnOnce(&dyn Plugin, &mut PluginContext<'_>) -> T,
    ) -> T {
        let mut state = entry.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut ctx = PluginContext {
            name: entry.plugin.name(),
            options,
            state: &mut state,
            plugins: &self.names,
        };
        f(entry.plugin.as_ref(), &mut ctx)
    }

    /// 合并所有插件的过滤器，后执行的插件覆盖先执行的
    pub fn filters(&self, options: &Options) -> FilterMap {
        let mut merged = FilterMap::new();
        for entry in &self.entries {
            let contributed = self.with_context(entry, options, |plugin, ctx| plugin.filters(ctx));
            for (name, filter) in contributed {
                if merged.insert(name.clone(), filter).is_some() {
                    tracing::warn!(
                        plugin = entry.plugin.name(),
                        filter = %name,
                        "插件过滤器覆盖了另一个插件的同名过滤器"
                    );
                }
            }
        }
        merged
    }

    pub fn transform_source(&self, source: &str, options: &Options) -> TemplateResult<String> {
        let mut current = source.to_string();
        for entry in &self.entries {
            current = self
                .with_context(entry, options, |plugin, ctx| plugin.transform_source(current, ctx))
                .map_err(|source| plugin_error(entry, source))?;
        }
        Ok(current)
    }

    pub fn after_render(&self, output: String, options: &Options) -> TemplateResult<String> {
        let mut current = output;
        for entry in &self.entries {
            current = self
                .with_context(entry, options, |plugin, ctx| plugin.after_render(current, ctx))
                .map_err(|source| plugin_error(entry, source))?;
        }
        Ok(current)
    }
}

fn plugin_error(entry: &PluginEntry, source: anyhow::Error) -> TemplateError {
    tracing::debug!(plugin = entry.plugin.name(), "插件钩子执行失败: {source:#}");
    TemplateError::Plugin {
        plugin: entry.plugin.name().to_string(),
        source,
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost").field("plugins", &self.names).finish()
    }
}
