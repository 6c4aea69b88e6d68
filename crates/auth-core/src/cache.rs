//! Expiring in-memory cache for authenticated credentials
//!
//! Entries expire either on a sliding window, reset by every successful
//! read, or at an absolute instant fixed on insertion. Expiry is evaluated
//! lazily on access; [`ExpiringCache::spawn_sweeper`] can additionally
//! reclaim idle entries in the background.
//!
//! Every operation on a single key is atomic with respect to the others
//! (DashMap shard locks). No lock is held across caller code except
//! inside [`ExpiringCache::get_or_create`], which runs its factory before
//! taking the entry lock.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use uuid::Uuid;

use crate::Credentials;

/// The cache the authorization engine keeps credentials in
pub type CredentialCache = ExpiringCache<Credentials>;

/// Longest lifetime an entry can be given; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct CacheEntry<V> {
    value: V,
    sliding: Option<Duration>,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration, sliding: bool, now: Instant) -> Self {
        let ttl = ttl.min(MAX_TTL);
        Self {
            value,
            sliding: sliding.then_some(ttl),
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    fn touch(&mut self, now: Instant) {
        if let Some(window) = self.sliding {
            self.expires_at = now + window;
        }
    }
}

/// Keyed store whose values expire on a sliding or absolute schedule.
///
/// Cloning is cheap and yields a handle to the same entries.
pub struct ExpiringCache<V> {
    /// Random per-instance prefix applied to every key
    header: Arc<str>,
    entries: Arc<DashMap<String, CacheEntry<V>>>,
}

impl<V> Clone for ExpiringCache<V> {
    fn clone(&self) -> Self {
        Self {
            header: Arc::clone(&self.header),
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ExpiringCache<V> {
    pub fn new() -> Self {
        Self {
            header: Uuid::new_v4().simple().to_string().into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        let mut namespaced = String::with_capacity(self.header.len() + key.len());
        namespaced.push_str(&self.header);
        namespaced.push_str(key);
        namespaced
    }

    /// Insert `value`, replacing any previous value and expiration policy.
    pub fn add(&self, key: &str, value: V, ttl: Duration, sliding: bool) {
        let entry = CacheEntry::new(value, ttl, sliding, Instant::now());
        self.entries.insert(self.namespaced(key), entry);
    }

    /// Whether a live entry exists. Counts as an access for sliding entries.
    pub fn contains_key(&self, key: &str) -> bool {
        let key = self.namespaced(key);
        let now = Instant::now();
        {
            let Some(mut entry) = self.entries.get_mut(&key) else {
                return false;
            };
            if !entry.is_expired(now) {
                entry.touch(now);
                return true;
            }
        }
        self.entries.remove_if(&key, |_, entry| entry.is_expired(now));
        false
    }

    /// Swap the value of a live entry, keeping its expiration policy.
    ///
    /// Returns `false` without inserting anything when no live entry exists.
    pub fn replace(&self, key: &str, value: V) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(&self.namespaced(key)) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.value = value;
                entry.touch(now);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(&self.namespaced(key));
    }

    /// Remove and return the value, if it was still live.
    pub fn pop(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let (_, entry) = self.entries.remove(&self.namespaced(key))?;
        (!entry.is_expired(now)).then_some(entry.value)
    }

    /// Number of live entries; expired entries awaiting removal are not counted.
    pub fn count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Periodically purge expired entries on the current tokio runtime.
    ///
    /// The task ends once every handle to this cache has been dropped.
    /// A zero `period` starts nothing and returns `None`.
    pub fn spawn_sweeper(&self, period: Duration) -> Option<JoinHandle<()>>
    where
        V: Send + Sync + 'static,
    {
        if period.is_zero() {
            return None;
        }
        let entries = Arc::downgrade(&self.entries);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let removed = purge(&entries);
                if removed > 0 {
                    debug!(removed, "Swept expired cache entries");
                }
            }
        }))
    }
}

impl<V: Clone> ExpiringCache<V> {
    /// Clone out a live value. Counts as an access for sliding entries.
    pub fn get(&self, key: &str) -> Option<V> {
        let key = self.namespaced(key);
        let now = Instant::now();
        {
            let mut entry = self.entries.get_mut(&key)?;
            if !entry.is_expired(now) {
                entry.touch(now);
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(&key, |_, entry| entry.is_expired(now));
        None
    }

    /// Return the live value, or store and return the factory's result.
    ///
    /// Concurrent misses may each run `factory`; the first value stored wins
    /// and is returned to every caller that loses the race.
    pub fn get_or_create<F>(&self, key: &str, factory: F, ttl: Duration, sliding: bool) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }

        let value = factory();
        let now = Instant::now();
        match self.entries.entry(self.namespaced(key)) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let entry = occupied.get_mut();
                entry.touch(now);
                entry.value.clone()
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(CacheEntry::new(value.clone(), ttl, sliding, now));
                value
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value.clone(), ttl, sliding, now));
                value
            }
        }
    }
}

impl<V> fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

fn purge<V>(entries: &DashMap<String, CacheEntry<V>>) -> usize {
    let now = Instant::now();
    let mut removed = 0;
    entries.retain(|_, entry| {
        let keep = !entry.is_expired(now);
        if !keep {
            removed += 1;
        }
        keep
    });
    removed
}
