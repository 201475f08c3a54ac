/// Transport-owned caches for the `hello` announcement.
///
/// - `HelloCache` keeps the last encoded hello so an unchanged payload is
///   re-sent verbatim instead of being re-serialized and re-sealed.
/// - `DedupCache` remembers, per sender address, the last hello seen from
///   one instance id (host name and payload) so repeats can be flagged.
use std::net::SocketAddr;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde_json::Value;

/// Default number of sender addresses tracked for hello deduplication.
pub(crate) const DEFAULT_DEDUP_CAPACITY: usize = 256;

/// Single-slot cache of the most recently encoded hello.
#[derive(Debug, Default)]
pub(crate) struct HelloCache {
    slot: Option<(Option<Value>, Vec<u8>)>,
}

impl HelloCache {
    /// Cached frame for `payload`, if it is exactly the last one encoded.
    pub fn get(&self, payload: &Option<Value>) -> Option<&[u8]> {
        match &self.slot {
            Some((cached, frame)) if cached == payload => Some(frame),
            _ => None,
        }
    }

    pub fn store(&mut self, payload: Option<Value>, frame: Vec<u8>) {
        self.slot = Some((payload, frame));
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

#[derive(Debug)]
struct LastHello {
    iid: String,
    host_name: String,
    payload: Option<Value>,
}

/// Bounded per-sender-address record of the last hello.
#[derive(Debug)]
pub(crate) struct DedupCache {
    entries: LruCache<SocketAddr, LastHello>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Record a hello and report whether it repeats the previous one
    /// from the same address and instance, host name and payload included.
    ///
    /// A different instance id on a known address replaces that address's
    /// entry.
    pub fn observe(
        &mut self,
        from: SocketAddr,
        iid: &str,
        host_name: &str,
        payload: &Option<Value>,
    ) -> bool {
        if let Some(last) = self.entries.get_mut(&from) {
            if last.iid == iid {
                if last.host_name == host_name && &last.payload == payload {
                    return true;
                }
                last.host_name = host_name.to_string();
                last.payload = payload.clone();
                return false;
            }
        }
        self.entries.put(
            from,
            LastHello {
                iid: iid.to_string(),
                host_name: host_name.to_string(),
                payload: payload.clone(),
            },
        );
        false
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[test]
    fn hello_cache_hits_only_on_identical_payload() {
        let mut cache = HelloCache::default();
        let payload = Some(json!({"isMaster": false, "weight": 1.0}));
        assert!(cache.get(&payload).is_none());

        cache.store(payload.clone(), vec![1, 2, 3]);
        assert_eq!(cache.get(&payload), Some(&[1u8, 2, 3][..]));

        let changed = Some(json!({"isMaster": true, "weight": 1.0}));
        assert!(cache.get(&changed).is_none());
    }

    #[test]
    fn hello_cache_invalidate() {
        let mut cache = HelloCache::default();
        cache.store(None, vec![9]);
        assert!(!cache.is_empty());
        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.get(&None).is_none());
    }

    #[test]
    fn dedup_flags_exact_repeat() {
        let mut dedup = DedupCache::new(8);
        let payload = Some(json!({"weight": 2.0}));

        assert!(!dedup.observe(addr(1), "a", "box", &payload));
        assert!(dedup.observe(addr(1), "a", "box", &payload));
        assert!(dedup.observe(addr(1), "a", "box", &payload));
    }

    #[test]
    fn dedup_changed_payload_is_fresh() {
        let mut dedup = DedupCache::new(8);
        assert!(!dedup.observe(addr(1), "a", "box", &Some(json!({"isMaster": false}))));
        assert!(!dedup.observe(addr(1), "a", "box", &Some(json!({"isMaster": true}))));
        assert!(dedup.observe(addr(1), "a", "box", &Some(json!({"isMaster": true}))));
    }

    #[test]
    fn dedup_changed_host_name_is_fresh() {
        let mut dedup = DedupCache::new(8);
        let payload = Some(json!({"weight": 2.0}));

        assert!(!dedup.observe(addr(1), "a", "box", &payload));
        assert!(!dedup.observe(addr(1), "a", "renamed", &payload));
        assert!(dedup.observe(addr(1), "a", "renamed", &payload));
    }

    #[test]
    fn dedup_new_instance_replaces_address_entry() {
        let mut dedup = DedupCache::new(8);
        let payload = Some(json!({"weight": 2.0}));

        assert!(!dedup.observe(addr(1), "old", "box", &payload));
        assert!(!dedup.observe(addr(1), "new", "box", &payload));
        assert_eq!(dedup.len(), 1);
        // The old instance's record is gone.
        assert!(!dedup.observe(addr(1), "old", "box", &payload));
    }

    #[test]
    fn dedup_is_bounded() {
        let mut dedup = DedupCache::new(2);
        for port in 0..5 {
            dedup.observe(addr(port), "x", "box", &None);
        }
        assert_eq!(dedup.len(), 2);
    }
}
