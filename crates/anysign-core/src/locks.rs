//! Per-entity mutual exclusion for status writes

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::{SignatureId, SignerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Signature(SignatureId),
    Signer(SignerId),
}

/// One async lock per entity, created on demand and dropped once unused
#[derive(Default)]
pub struct EntityLocks {
    slots: Mutex<HashMap<EntityKey, Weak<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Access is held until the guard drops.
    pub async fn acquire(&self, key: EntityKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.retain(|_, weak| weak.strong_count() > 0);
            match slots.get(&key).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    slots.insert(key, Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        slot.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|w| w.strong_count() > 0).count()
    }
}
