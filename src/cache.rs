use crate::options::{MissingKind, Options};
use crate::template::CompiledTemplate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 源码加上所有影响编译结果的选项
///
/// 缺失回调与过滤器函数体不参与比较，只记录回调种类与调用方过滤器名称。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: String,
    locale: String,
    on_missing: MissingKind,
    strict_keys: bool,
    filters: Vec<String>,
}

impl CacheKey {
    pub fn new(source: &str, options: &Options) -> Self {
        Self {
            source: source.to_string(),
            locale: options.locale.clone(),
            on_missing: options.on_missing.kind(),
            strict_keys: options.strict_keys,
            // BTreeMap 的键天然有序
            filters: options.filters.keys().cloned().collect(),
        }
    }
}

struct Entry {
    template: Arc<CompiledTemplate>,
    last_used: u64,
}

struct CacheState {
    capacity: usize,
    tick: u64,
    entries: HashMap<CacheKey, Entry>,
}

impl CacheState {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            tracing::debug!(remaining = self.entries.len(), "编译缓存淘汰最久未用的模板");
        }
    }
}

/// 有界 LRU 编译缓存，容量为 0 时不存储任何模板
pub struct TemplateCache {
    state: Mutex<CacheState>,
}

impl TemplateCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                capacity,
                tick: 0,
                entries: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 命中时刷新为最近使用
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompiledTemplate>> {
        let mut state = self.lock();
        let tick = state.touch();
        let entry = state.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.template))
    }

    /// 存入编译结果；若并发编译已先存入同键模板，返回已有实例
    pub fn insert(&self, key: CacheKey, template: Arc<CompiledTemplate>) -> Arc<CompiledTemplate> {
        let mut state = self.lock();
        if state.capacity == 0 {
            return template;
        }

        let tick = state.touch();
        if let Some(existing) = state.entries.get_mut(&key) {
            existing.last_used = tick;
            return Arc::clone(&existing.template);
        }

        // 容量缩小后的超额部分在下一次写入时一并清理
        while state.entries.len() >= state.capacity {
            state.evict_oldest();
        }
        state.entries.insert(
            key,
            Entry {
                template: Arc::clone(&template),
                last_used: tick,
            },
        );
        template
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        if !state.entries.is_empty() {
            tracing::debug!(dropped = state.entries.len(), "清空编译缓存");
        }
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// 只调整上限，不立即淘汰；容量为 0 时清空
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.lock();
        state.capacity = capacity;
        if capacity == 0 {
            state.entries.clear();
        }
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(crate::options::DEFAULT_CACHE_SIZE)
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TemplateCache")
            .field("capacity", &state.capacity)
            .field("len", &state.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{Filter, FilterMap, FilterRegistry};
    use crate::options::OnMissing;
    use crate::registry::TemplateRegistry;
    use crate::template::{CompileContext, compile, parse};

    fn template(source: &str) -> Arc<CompiledTemplate> {
        let options = Options::default();
        let filters = FilterRegistry::build(&options.locale, &FilterMap::new(), &options.filters);
        let ast = parse(source).unwrap();
        Arc::new(
            compile(
                &ast,
                CompileContext {
                    filters: &filters,
                    templates: &TemplateRegistry::new(),
                    options: &options,
                },
            )
            .unwrap(),
        )
    }

    fn key(source: &str) -> CacheKey {
        CacheKey::new(source, &Options::default())
    }

    #[test]
    fn key_tracks_behaviour_relevant_options() {
        let base = Options::default();
        assert_eq!(CacheKey::new("a", &base), CacheKey::new("a", &base.clone()));
        assert_ne!(CacheKey::new("a", &base), CacheKey::new("b", &base));
        assert_ne!(
            CacheKey::new("a", &base),
            CacheKey::new("a", &base.clone().locale("de-DE"))
        );
        assert_ne!(
            CacheKey::new("a", &base),
            CacheKey::new("a", &base.clone().strict_keys(true))
        );
        assert_ne!(
            CacheKey::new("a", &base),
            CacheKey::new("a", &base.clone().on_missing(OnMissing::Error))
        );
        assert_ne!(
            CacheKey::new("a", &base),
            CacheKey::new("a", &base.clone().filter("x", Filter::sync(|v, _| Ok(v))))
        );
    }

    #[test]
    fn callbacks_share_a_key_by_kind() {
        let one = Options::default().on_missing(OnMissing::callback(|_| "1".into()));
        let two = Options::default().on_missing(OnMissing::callback(|_| "2".into()));
        assert_eq!(CacheKey::new("a", &one), CacheKey::new("a", &two));
    }

    #[test]
    fn hit_returns_same_instance() {
        let cache = TemplateCache::new(2);
        let stored = cache.insert(key("a"), template("a"));
        let hit = cache.get(&key("a")).unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
    }

    #[test]
    fn racing_insert_keeps_first_instance() {
        let cache = TemplateCache::new(2);
        let first = cache.insert(key("a"), template("a"));
        let second = cache.insert(key("a"), template("a"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = TemplateCache::new(2);
        cache.insert(key("a"), template("a"));
        cache.insert(key("b"), template("b"));
        cache.get(&key("a"));
        cache.insert(key("c"), template("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = TemplateCache::new(0);
        let a = cache.insert(key("a"), template("a"));
        let b = cache.insert(key("a"), template("a"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(cache.is_empty());
        assert!(cache.get(&key("a")).is_none());
    }

    #[test]
    fn shrinking_defers_eviction_to_next_insert() {
        let cache = TemplateCache::new(3);
        for source in ["a", "b", "c"] {
            cache.insert(key(source), template(source));
        }
        cache.set_capacity(1);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 3);

        cache.insert(key("d"), template("d"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("d")).is_some());
    }

    #[test]
    fn clear_empties() {
        let cache = TemplateCache::default();
        assert_eq!(cache.capacity(), 200);
        cache.insert(key("a"), template("a"));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
