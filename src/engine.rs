use crate::analyzer::{self, AnalysisReport};
use crate::cache::{CacheKey, TemplateCache};
use crate::config::EngineConfig;
use crate::error::TemplateResult;
use crate::filters::FilterRegistry;
use crate::options::{DEFAULT_CACHE_SIZE, Options};
use crate::plugin::{Plugin, PluginHost};
use crate::registry::TemplateRegistry;
use crate::template::{self, CompileContext, CompiledTemplate};
use crate::value::Value;
use std::borrow::Cow;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 模板引擎：持有子模板注册表、插件与编译缓存
///
/// `Engine` 是 `Send + Sync` 的，可放进 `Arc` 在多线程间共享。
/// 注册表或插件的任何变更都会清空编译缓存。
#[derive(Debug)]
pub struct Engine {
    templates: RwLock<TemplateRegistry>,
    plugins: RwLock<PluginHost>,
    cache: TemplateCache,
    defaults: Options,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(TemplateRegistry::new()),
            plugins: RwLock::new(PluginHost::new()),
            cache: TemplateCache::new(DEFAULT_CACHE_SIZE),
            defaults: Options::default(),
        }
    }

    pub fn from_config(config: EngineConfig) -> Self {
        let defaults = config.options();
        let mut templates = TemplateRegistry::new();
        for (name, source) in config.templates {
            templates.register(name, source);
        }
        tracing::debug!(
            locale = %defaults.locale,
            templates = templates.len(),
            cache_size = config.cache_size,
            "按配置创建模板引擎"
        );

        Self {
            templates: RwLock::new(templates),
            plugins: RwLock::new(PluginHost::new()),
            cache: TemplateCache::new(config.cache_size),
            defaults,
        }
    }

    /// 配置文件给出的默认选项
    pub fn default_options(&self) -> &Options {
        &self.defaults
    }

    fn read_templates(&self) -> RwLockReadGuard<'_, TemplateRegistry> {
        self.templates.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_templates(&self) -> RwLockWriteGuard<'_, TemplateRegistry> {
        self.templates.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_plugins(&self) -> RwLockReadGuard<'_, PluginHost> {
        self.plugins.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_plugins(&self) -> RwLockWriteGuard<'_, PluginHost> {
        self.plugins.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 编译模板；相同源码与选项在缓存容量内返回同一实例
    ///
    /// `options.cache_size` 为 None 时保留引擎当前容量（`Engine::new` 为 200，
    /// `from_config` 取配置值）。
    pub fn compile(&self, source: &str, options: &Options) -> TemplateResult<Arc<CompiledTemplate>> {
        if let Some(size) = options.cache_size
            && self.cache.capacity() != size
        {
            self.cache.set_capacity(size);
        }

        let key = CacheKey::new(source, options);
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!("编译缓存命中");
            return Ok(hit);
        }

        // 读锁一直持有到写入缓存：注册表或插件的变更要等这次写入完成后才能清空缓存
        let plugins = self.read_plugins();
        let templates = self.read_templates();
        let compiled = Arc::new(compile_with(source, options, &plugins, &templates)?);
        Ok(self.cache.insert(key, compiled))
    }

    /// 静态诊断，使用与编译相同的过滤器表与子模板注册表
    ///
    /// 插件的 transform_source 会先作用于源码，诊断位置对应改写后的文本；
    /// 改写失败时退回分析原始源码。
    pub fn analyze(&self, source: &str, options: &Options, context: Option<&Value>) -> AnalysisReport {
        let plugins = self.read_plugins();
        let source = match transformed(source, options, &plugins) {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!("插件改写源码失败，按原始源码诊断: {err}");
                Cow::Borrowed(source)
            }
        };
        let plugin_filters = plugins.filters(options);
        drop(plugins);

        let filters = FilterRegistry::build(&options.locale, &plugin_filters, &options.filters);
        let templates = self.read_templates();
        analyzer::analyze(
            &source,
            CompileContext {
                filters: &filters,
                templates: &templates,
                options,
            },
            context,
        )
    }

    /// 编译并同步渲染，输出再经过插件的 after_render
    pub fn render(&self, source: &str, context: &Value, options: &Options) -> TemplateResult<String> {
        let compiled = self.compile(source, options)?;
        let output = compiled.render(context)?;
        self.after_render(output, options)
    }

    pub async fn render_async(
        &self,
        source: &str,
        context: &Value,
        options: &Options,
    ) -> TemplateResult<String> {
        let compiled = self.compile(source, options)?;
        let output = compiled.render_async(context).await?;
        self.after_render(output, options)
    }

    fn after_render(&self, output: String, options: &Options) -> TemplateResult<String> {
        let plugins = self.read_plugins();
        if plugins.is_empty() {
            return Ok(output);
        }
        plugins.after_render(output, options)
    }

    pub fn register_template(&self, name: impl Into<String>, source: impl Into<String>) {
        let name = name.into();
        tracing::debug!(template = %name, "注册子模板");
        let mut templates = self.write_templates();
        templates.register(name, source);
        self.cache.clear();
    }

    pub fn unregister_template(&self, name: &str) -> bool {
        let mut templates = self.write_templates();
        let removed = templates.unregister(name).is_some();
        self.cache.clear();
        removed
    }

    pub fn template_source(&self, name: &str) -> Option<String> {
        self.read_templates().get(name).map(str::to_string)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.read_templates().has(name)
    }

    /// 已注册子模板名称，按名称排序
    pub fn templates(&self) -> Vec<String> {
        self.read_templates()
            .list()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn clear_templates(&self) {
        let mut templates = self.write_templates();
        templates.clear();
        self.cache.clear();
    }

    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        let mut plugins = self.write_plugins();
        plugins.register(plugin);
        self.cache.clear();
    }

    pub fn unregister_plugin(&self, name: &str) -> bool {
        let mut plugins = self.write_plugins();
        let removed = plugins.unregister(name);
        self.cache.clear();
        removed
    }

    pub fn plugins(&self) -> Vec<String> {
        self.read_plugins().names().to_vec()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

/// 依次应用插件的源码改写
fn transformed<'s>(source: &'s str, options: &Options, plugins: &PluginHost) -> TemplateResult<Cow<'s, str>> {
    if plugins.is_empty() {
        Ok(Cow::Borrowed(source))
    } else {
        plugins.transform_source(source, options).map(Cow::Owned)
    }
}

fn compile_with(
    source: &str,
    options: &Options,
    plugins: &PluginHost,
    templates: &TemplateRegistry,
) -> TemplateResult<CompiledTemplate> {
    let source = transformed(source, options, plugins)?;
    let plugin_filters = plugins.filters(options);
    let filters = FilterRegistry::build(&options.locale, &plugin_filters, &options.filters);
    let ast = template::parse(&source)?;
    let compiled = template::compile(
        &ast,
        CompileContext {
            filters: &filters,
            templates,
            options,
        },
    )?;

    tracing::debug!(
        nodes = ast.nodes.len(),
        constant = compiled.is_constant(),
        "模板编译完成"
    );
    Ok(compiled)
}
