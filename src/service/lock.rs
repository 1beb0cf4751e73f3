//! Serialization of read-modify-write version updates

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::config::LockMode;

/// Held for the duration of one read → compute → persist sequence
pub type IncrementGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct IncrementLock {
    mode: LockMode,
    global: Arc<tokio::sync::Mutex<()>>,
    per_identifier: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IncrementLock {
    pub fn new(mode: LockMode) -> Self {
        Self {
            mode,
            global: Arc::new(tokio::sync::Mutex::new(())),
            per_identifier: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub async fn acquire(&self, identifier: &str) -> IncrementGuard {
        let lock = match self.mode {
            LockMode::Global => Arc::clone(&self.global),
            LockMode::PerIdentifier => {
                let mut locks = self
                    .per_identifier
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                // an entry only the map references has no holder and no waiter
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                Arc::clone(locks.entry(identifier.to_string()).or_default())
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.per_identifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for IncrementLock {
    fn default() -> Self {
        Self::new(LockMode::default())
    }
}
