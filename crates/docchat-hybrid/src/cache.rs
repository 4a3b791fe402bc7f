//! Keyword rankers keyed by the exact chunk set they were built over.
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, OnceLock};

use twox_hash::XxHash64;

use docchat_core::types::{Chunk, RetrievalFilter};
use docchat_text::KeywordRanker;

pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    filter: Vec<String>,
    fingerprint: u64,
}

impl CacheKey {
    pub fn new(filter: &RetrievalFilter, chunks: &[Chunk]) -> Self {
        Self { filter: filter.filenames().map(str::to_string).collect(), fingerprint: fingerprint(chunks) }
    }
}

/// xxHash of the sorted chunk ids.
pub fn fingerprint(chunks: &[Chunk]) -> u64 {
    let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    let mut hasher = XxHash64::with_seed(0);
    for id in ids {
        hasher.write(id.as_bytes());
        hasher.write_u8(0xff);
    }
    hasher.finish()
}

pub struct RankerCache {
    capacity: usize,
    inner: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    next: u64,
    map: HashMap<CacheKey, (u64, Arc<KeywordRanker>)>,
}

impl RankerCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), inner: Mutex::new(Entries::default()) }
    }

    /// Process-wide cache.
    pub fn global() -> Arc<RankerCache> {
        static GLOBAL: OnceLock<Arc<RankerCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(RankerCache::new(DEFAULT_CAPACITY))))
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<KeywordRanker>> {
        let entries = self.inner.lock().ok()?;
        entries.map.get(key).map(|(_, r)| Arc::clone(r))
    }

    /// Insert, evicting the oldest entries past capacity. A racing insert for
    /// the same key keeps whichever ranker landed first.
    pub fn insert(&self, key: CacheKey, ranker: Arc<KeywordRanker>) -> Arc<KeywordRanker> {
        let Ok(mut entries) = self.inner.lock() else { return ranker };
        if let Some((_, existing)) = entries.map.get(&key) {
            return Arc::clone(existing);
        }
        let seq = entries.next;
        entries.next += 1;
        entries.map.insert(key, (seq, Arc::clone(&ranker)));
        while entries.map.len() > self.capacity {
            let oldest = entries.map.iter().min_by_key(|(_, (s, _))| *s).map(|(k, _)| k.clone());
            match oldest {
                Some(k) => { entries.map.remove(&k); }
                None => break,
            }
        }
        ranker
    }

    pub fn len(&self) -> usize { self.inner.lock().map(|e| e.map.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::types::ChunkMetadata;

    fn chunk(id: &str) -> Chunk { Chunk { id: id.into(), text: format!("text {id}"), metadata: ChunkMetadata::default() } }

    #[test]
    fn fingerprint_ignores_order_but_not_membership() {
        let ab = fingerprint(&[chunk("a"), chunk("b")]);
        assert_eq!(ab, fingerprint(&[chunk("b"), chunk("a")]));
        assert_ne!(ab, fingerprint(&[chunk("a"), chunk("b"), chunk("c")]));
        assert_ne!(fingerprint(&[chunk("ab")]), fingerprint(&[chunk("a"), chunk("b")]));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let cache = RankerCache::new(2);
        let keys: Vec<CacheKey> = ["x", "y", "z"].iter().map(|id| CacheKey::new(&RetrievalFilter::all(), &[chunk(id)])).collect();
        for (k, id) in keys.iter().zip(["x", "y", "z"]) {
            let ranker = Arc::new(KeywordRanker::build(vec![chunk(id)]).unwrap());
            cache.insert(k.clone(), ranker);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&keys[0]).is_none());
        assert!(cache.get(&keys[2]).is_some());
    }
}
