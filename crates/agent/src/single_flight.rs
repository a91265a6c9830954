//! Per-key single-flight guard.
//!
//! Membership in the set means "a job for this key is running". Insertion
//! is an atomic check-and-insert; the returned guard removes the key when
//! dropped, however the job ends.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. `None` if it is already claimed.
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        let inserted = self
            .keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string());
        inserted.then(|| InFlightGuard {
            keys: self.keys.clone(),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().unwrap_or_else(|e| e.into_inner()).contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let set = InFlightSet::new();
        let guard = set.try_acquire("s1").unwrap();
        assert_eq!(guard.key(), "s1");
        assert!(set.try_acquire("s1").is_none());
        assert!(set.contains("s1"));

        drop(guard);
        assert!(!set.contains("s1"));
        assert!(set.try_acquire("s1").is_some());
    }

    #[test]
    fn keys_are_independent() {
        let set = InFlightSet::new();
        let _a = set.try_acquire("a").unwrap();
        let _b = set.try_acquire("b").unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn clones_share_state() {
        let set = InFlightSet::new();
        let other = set.clone();
        let _guard = set.try_acquire("k").unwrap();
        assert!(other.try_acquire("k").is_none());
    }

    #[test]
    fn concurrent_acquire_admits_one() {
        let set = InFlightSet::new();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let set = set.clone();
                    scope.spawn(move || set.try_acquire("hot").map(std::mem::forget).is_some())
                })
                .collect();
            handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
        });
        assert_eq!(winners, 1);
        assert!(set.contains("hot"));
    }
}
