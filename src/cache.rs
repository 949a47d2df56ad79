use crate::LinkPreviewData;
use dashmap::DashMap;
use std::sync::Arc;

/// Resolved previews keyed by source URL. Failures are never stored, so a failed URL is
/// fetched again the next time it is detected.
#[derive(Clone)]
pub struct Cache {
    cache: Arc<DashMap<String, LinkPreviewData>>,
    capacity: usize,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { 100 } else { capacity };
        Self {
            cache: Arc::new(DashMap::with_capacity(capacity)),
            capacity,
        }
    }

    pub async fn get(&self, key: &str) -> Option<LinkPreviewData> {
        self.cache.get(key).map(|entry| entry.clone())
    }

    pub async fn set(&self, key: String, value: LinkPreviewData) {
        if self.cache.len() >= self.capacity && !self.cache.contains_key(&key) {
            return;
        }
        self.cache.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
