//! Size-bounded LRU cache for rendered page previews.
//!
//! Entries are keyed by document id + layer name and weighed by a caller
//! supplied function (bytes of a bitmap, for instance). Inserting past the
//! capacity evicts least recently used entries first.

use crate::model::descriptor::{DocumentId, LayerDescriptor};
use std::collections::{HashMap, VecDeque};

/// Composite key of one preview.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewKey {
    pub document_id: DocumentId,
    pub layer_name: Option<String>,
}

impl PreviewKey {
    pub fn new(document_id: impl Into<DocumentId>, layer_name: Option<String>) -> Self {
        Self {
            document_id: document_id.into(),
            layer_name,
        }
    }

    pub fn for_layer(layer: &LayerDescriptor) -> Self {
        Self::new(layer.document_id.clone(), layer.layer_name.clone())
    }
}

struct Entry<V> {
    value: V,
    size: usize,
}

/// Capacity-bounded, size-weighted LRU map.
pub struct PreviewCache<V> {
    capacity: usize,
    total_size: usize,
    weigher: Box<dyn Fn(&V) -> usize + Send + Sync>,
    map: HashMap<PreviewKey, Entry<V>>,
    // Front = most recently used.
    order: VecDeque<PreviewKey>,
}

impl<V> PreviewCache<V> {
    /// Creates a cache holding at most `capacity` size units.
    pub fn new(capacity: usize, weigher: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        Self {
            capacity,
            total_size: 0,
            weigher: Box::new(weigher),
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Creates a cache where every entry weighs one unit.
    pub fn with_entry_limit(max_entries: usize) -> Self {
        Self::new(max_entries, |_| 1)
    }

    /// Returns a cached preview and marks it most recently used.
    pub fn get(&mut self, key: &PreviewKey) -> Option<&V> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.map.get(key).map(|entry| &entry.value)
    }

    /// Inserts or replaces a preview.
    ///
    /// Returns `false` (and leaves the cache untouched) when the value alone
    /// exceeds the capacity.
    pub fn put(&mut self, key: PreviewKey, value: V) -> bool {
        let size = (self.weigher)(&value);
        if size > self.capacity {
            return false;
        }

        self.remove(&key);
        while self.total_size + size > self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }

        self.total_size += size;
        self.order.push_front(key.clone());
        self.map.insert(key, Entry { value, size });
        true
    }

    /// Removes one preview, returning it when present.
    pub fn remove(&mut self, key: &PreviewKey) -> Option<V> {
        let entry = self.map.remove(key)?;
        self.order.retain(|candidate| candidate != key);
        self.total_size -= entry.size;
        Some(entry.value)
    }

    /// Removes every preview of `document_id`, across all layers.
    pub fn remove_document(&mut self, document_id: &str) {
        let keys: Vec<PreviewKey> = self
            .map
            .keys()
            .filter(|key| key.document_id == document_id)
            .cloned()
            .collect();
        for key in keys {
            self.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
        self.total_size = 0;
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of entry sizes currently held.
    pub fn size(&self) -> usize {
        self.total_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn touch(&mut self, key: &PreviewKey) {
        self.order.retain(|candidate| candidate != key);
        self.order.push_front(key.clone());
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_back() {
            Some(oldest) => {
                if let Some(entry) = self.map.remove(&oldest) {
                    self.total_size -= entry.size;
                }
                true
            }
            None => false,
        }
    }
}
