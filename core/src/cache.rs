use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::model::ResourceKind;
use crate::roles::Permission;

/// Settings for the access evaluator's decision cache.
#[derive(Debug, Clone)]
pub struct AccessControlConfig {
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl AccessControlConfig {
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: String,
    pub resource_id: String,
    pub permission: Permission,
    pub kind: ResourceKind,
}

impl CacheKey {
    pub fn new(user_id: &str, resource_id: &str, permission: Permission, kind: ResourceKind) -> Self {
        Self {
            user_id: user_id.to_string(),
            resource_id: resource_id.to_string(),
            permission,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
}

#[derive(Clone, Copy)]
struct Entry {
    granted: bool,
    inserted_at: Instant,
}

/// TTL cache of boolean permission decisions.
///
/// Entries are only ever overwritten or expired. Stale reads inside the TTL
/// window are accepted; last write wins.
pub struct PermissionCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    enabled: bool,
    ttl: Duration,
}

impl PermissionCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            enabled,
            ttl,
        }
    }

    pub fn from_config(config: &AccessControlConfig) -> Self {
        Self::new(config.cache_enabled, config.cache_ttl)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cached decision for `key` if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<bool> {
        if !self.enabled {
            return None;
        }
        let mut guard = self.entries.lock();
        match guard.get(key).copied() {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.granted),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a decision and drop every expired entry.
    pub fn insert(&self, key: CacheKey, granted: bool) {
        if !self.enabled {
            return;
        }
        let mut guard = self.entries.lock();
        let ttl = self.ttl;
        guard.retain(|_, e| e.inserted_at.elapsed() < ttl);
        guard.insert(
            key,
            Entry {
                granted,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries. Expired ones count until the next insert
    /// or a read of the same key.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.lock().len(),
        }
    }
}
