use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use lru::LruCache;

pub const DEFAULT_SESSION_CAPACITY: usize = 256;

/// Per-session state keyed by session id. Holds at most `capacity` sessions;
/// the least recently used one is evicted to make room.
pub struct SessionStore<T> {
    sessions: Mutex<LruCache<String, T>>,
}

impl<T: Clone + Default> SessionStore<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { sessions: Mutex::new(LruCache::new(capacity)) }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, T>> {
        match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Unknown ids read as a fresh default without being stored.
    pub fn get(&self, id: &str) -> T {
        self.lock().get(id).cloned().unwrap_or_default()
    }

    pub fn update<F: FnOnce(&mut T)>(&self, id: &str, update: F) -> T {
        let mut sessions = self.lock();
        let session = sessions.get_or_insert_mut(id.to_string(), T::default);
        update(session);
        session.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone + Default> Default for SessionStore<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAPACITY)
    }
}
