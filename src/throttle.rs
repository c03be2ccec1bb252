//! Process-local cooldown and per-key lock bookkeeping shared by stickies
//! and triggers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// True while `now` is less than `window` past `last`.
pub fn within_window(last: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(last) < window
}

/// Last-fire timestamps keyed by `K`, checked against a fixed window.
pub struct CooldownMap<K> {
    window: Duration,
    last_fired: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash> CooldownMap<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Time left before `key` may fire again, if any.
    pub fn remaining(&self, key: &K, now: Instant) -> Option<Duration> {
        let map = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        let last = *map.get(key)?;
        within_window(last, now, self.window)
            .then(|| self.window - now.saturating_duration_since(last))
    }

    pub fn is_cooling(&self, key: &K, now: Instant) -> bool {
        self.remaining(key, now).is_some()
    }

    pub fn mark(&self, key: K, now: Instant) {
        let mut map = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key, now);
    }
}

/// One async mutex per key. The map itself is only locked briefly and never
/// across an await.
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the lock for `key`, creating it on first use.
    pub fn ensure(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    pub fn get(&self, key: &K) -> Option<Arc<tokio::sync::Mutex<()>>> {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.get(key).cloned()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_window() {
        let cooldowns = CooldownMap::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert!(!cooldowns.is_cooling(&"a", t0));
        cooldowns.mark("a", t0);

        assert!(cooldowns.is_cooling(&"a", t0 + Duration::from_secs(1)));
        assert_eq!(
            cooldowns.remaining(&"a", t0 + Duration::from_secs(1)),
            Some(Duration::from_secs(4))
        );
        // Exactly at the window boundary the key is free again.
        assert!(!cooldowns.is_cooling(&"a", t0 + Duration::from_secs(5)));
        assert!(!cooldowns.is_cooling(&"b", t0));
    }

    #[tokio::test]
    async fn test_keyed_locks_reuse() {
        let locks = KeyedLocks::new();
        let a = locks.ensure(&1u64);
        let again = locks.ensure(&1u64);
        assert!(Arc::ptr_eq(&a, &again));

        let guard = a.lock().await;
        assert!(again.try_lock().is_err());
        drop(guard);

        assert!(locks.get(&2).is_none());
        assert!(Arc::ptr_eq(&a, &locks.get(&1).unwrap()));
    }
}
