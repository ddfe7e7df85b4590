use std::collections::HashMap;

/// 可复用子模板：名称 → 源码
///
/// 由宿主程序持有并传给编译器；引擎包装的可变操作会同时清空编译缓存。
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册或替换同名模板，返回被替换的旧源码
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) -> Option<String> {
        self.templates.insert(name.into(), source.into())
    }

    pub fn unregister(&mut self, name: &str) -> Option<String> {
        self.templates.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// 按名称排序
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&mut self) {
        self.templates.clear();
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
