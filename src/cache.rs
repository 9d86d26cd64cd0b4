//! LRU cache for decoded tiles, bounded by a byte budget.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

/// Default cache budget: 256 MiB of decoded tile data.
pub const DEFAULT_TILE_CACHE_BUDGET: usize = 256 * 1024 * 1024;

/// Upper bound on entries so the LRU bookkeeping itself stays cheap.
const DEFAULT_MAX_ENTRIES: usize = 16_384;

/// Cache key: which image of the file, which tile of its grid. The cache is
/// owned by one reader, so file identity is implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TileKey {
    /// Identity of the image inside the file: the IFD's read offset.
    pub image: u64,
    pub tile_index: usize,
}

/// Byte-budgeted LRU over decoded tile buffers.
///
/// Entries are shared out as `Arc`s so an eviction never invalidates a
/// buffer a caller is still holding.
pub(crate) struct TileCache {
    cache: LruCache<TileKey, Arc<Vec<u8>>>,
    budget: usize,
    used: usize,
}

impl TileCache {
    pub fn new(budget: usize) -> TileCache {
        TileCache {
            cache: LruCache::new(NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap()),
            budget,
            used: 0,
        }
    }

    pub fn get(&mut self, key: &TileKey) -> Option<Arc<Vec<u8>>> {
        self.cache.get(key).cloned()
    }

    pub fn put(&mut self, key: TileKey, data: Arc<Vec<u8>>) {
        if data.len() > self.budget {
            // Oversized tiles would immediately evict everything else.
            return;
        }
        if let Some(old) = self.cache.peek(&key) {
            self.used = self.used.saturating_sub(old.len());
        }
        self.used += data.len();
        self.cache.put(key, data);
        while self.used > self.budget {
            match self.cache.pop_lru() {
                Some((_, evicted)) => self.used = self.used.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.used = 0;
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cache.len()
    }

    #[cfg(test)]
    fn used(&self) -> usize {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(image: u64, tile_index: usize) -> TileKey {
        TileKey { image, tile_index }
    }

    #[test]
    fn get_put_and_budget_eviction() {
        let mut cache = TileCache::new(1000);
        cache.put(key(0, 0), Arc::new(vec![0; 400]));
        cache.put(key(0, 1), Arc::new(vec![0; 400]));
        assert_eq!(cache.used(), 800);

        // Touch tile 0 so tile 1 is the LRU victim.
        assert!(cache.get(&key(0, 0)).is_some());
        cache.put(key(0, 2), Arc::new(vec![0; 400]));

        assert!(cache.used() <= 1000);
        assert!(cache.get(&key(0, 0)).is_some());
        assert!(cache.get(&key(0, 1)).is_none());
        assert!(cache.get(&key(0, 2)).is_some());
    }

    #[test]
    fn replacing_an_entry_adjusts_the_budget() {
        let mut cache = TileCache::new(1000);
        cache.put(key(1, 7), Arc::new(vec![0; 600]));
        cache.put(key(1, 7), Arc::new(vec![0; 100]));
        assert_eq!(cache.used(), 100);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn oversized_entries_are_not_cached() {
        let mut cache = TileCache::new(100);
        cache.put(key(0, 0), Arc::new(vec![0; 101]));
        assert_eq!(cache.len(), 0);
    }
}
