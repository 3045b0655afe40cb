//! Display-time translation of topics and descriptions.
//!
//! [`CachedTranslator`] fronts any [`Translator`] with an explicit
//! [`BoundedCache`] handed in by the caller. Translation failures fall back
//! to the original text; they never fail a request.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Least-recently-used cache with a fixed capacity.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up and mark as most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let (value, used) = self.entries.get_mut(key)?;
        let previous = *used;
        self.order.remove(&previous);
        *used = tick;
        self.order.insert(tick, key.clone());
        Some(value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        let tick = self.next_tick();
        if let Some((_, used)) = self.entries.get(&key) {
            self.order.remove(used);
        }
        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));

        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, lang: &str) -> Result<String>;

    fn name(&self) -> &'static str;
}

pub type DynTranslator = Arc<dyn Translator>;

/// Returns the input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str, _lang: &str) -> Result<String> {
        Ok(text.to_string())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

pub struct CachedTranslator<T: Translator> {
    inner: T,
    cache: Mutex<BoundedCache<String, String>>,
}

impl<T: Translator> CachedTranslator<T> {
    pub fn new(inner: T, cache: BoundedCache<String, String>) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// `lang:text`, keyed on the whole text so long shared openings never collide.
pub fn cache_key(text: &str, lang: &str) -> String {
    format!("{}:{text}", lang.trim().to_ascii_lowercase())
}

#[async_trait]
impl<T: Translator> Translator for CachedTranslator<T> {
    async fn translate(&self, text: &str, lang: &str) -> Result<String> {
        if text.trim().is_empty() || lang.trim().is_empty() {
            return Ok(text.to_string());
        }
        let key = cache_key(text, lang);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit);
            }
        }

        match self.inner.translate(text, lang).await {
            Ok(translated) => {
                debug!(target: "api", translator = self.inner.name(), %lang, "translated");
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(key, translated.clone());
                }
                Ok(translated)
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target: "api", translator = self.inner.name(), %lang, %error, "translation failed; using original");
                Ok(text.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
