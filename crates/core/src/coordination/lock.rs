// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed reentrant locks with scoped release
//!
//! [`KeyedLocks`] hands out one lock per [`LockKey`], created on first use and
//! evicted once nothing references it. An entry's reference count covers live
//! guards and callers still waiting to acquire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Unique identifier for a lock holder
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderId(pub String);

impl HolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random holder identity
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key: the kind of thing being locked plus which one
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    pub owner: String,
    pub discriminator: String,
}

impl LockKey {
    pub fn new(owner: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            discriminator: discriminator.into(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.discriminator)
    }
}

#[derive(Debug)]
struct Hold {
    holder: HolderId,
    count: usize,
}

struct Entry {
    key: LockKey,
    hold: Mutex<Option<Hold>>,
    released: Notify,
}

impl Entry {
    fn hold(&self) -> MutexGuard<'_, Option<Hold>> {
        self.hold.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the lock, or one more hold if `holder` already owns it
    fn try_take(&self, holder: &HolderId) -> bool {
        let mut hold = self.hold();
        if let Some(h) = hold.as_mut() {
            if &h.holder != holder {
                return false;
            }
            h.count += 1;
            return true;
        }
        *hold = Some(Hold {
            holder: holder.clone(),
            count: 1,
        });
        true
    }

    /// Give back one hold. Never touches a lock `holder` does not own.
    fn release(&self, holder: &HolderId) -> bool {
        let mut hold = self.hold();
        let remaining = match hold.as_mut() {
            Some(h) if &h.holder == holder => {
                h.count -= 1;
                h.count
            }
            current => {
                tracing::warn!(
                    key = %self.key,
                    %holder,
                    owner = ?current.map(|h| h.holder.clone()),
                    "release by a holder that does not own the lock"
                );
                return false;
            }
        };
        if remaining == 0 {
            *hold = None;
            drop(hold);
            tracing::trace!(key = %self.key, %holder, "lock freed");
            self.released.notify_waiters();
        }
        true
    }
}

struct Slot {
    entry: Arc<Entry>,
    refs: usize,
}

#[derive(Default)]
struct Registry {
    slots: Mutex<HashMap<LockKey, Slot>>,
}

impl Registry {
    fn slots(&self) -> MutexGuard<'_, HashMap<LockKey, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lease(self: &Arc<Self>, key: LockKey) -> Lease {
        let entry = {
            let mut slots = self.slots();
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                entry: Arc::new(Entry {
                    key,
                    hold: Mutex::new(None),
                    released: Notify::new(),
                }),
                refs: 0,
            });
            slot.refs += 1;
            Arc::clone(&slot.entry)
        };
        Lease {
            registry: Arc::clone(self),
            entry,
        }
    }
}

/// One counted reference to a registry entry
struct Lease {
    registry: Arc<Registry>,
    entry: Arc<Entry>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut slots = self.registry.slots();
        if let Some(slot) = slots.get_mut(&self.entry.key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&self.entry.key);
                tracing::trace!(key = %self.entry.key, "lock entry evicted");
            }
        }
    }
}

/// Registry of reentrant locks keyed by [`LockKey`]
#[derive(Clone, Default)]
pub struct KeyedLocks {
    registry: Arc<Registry>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `holder` owns the lock for `owner`/`discriminator`
    pub async fn acquire(
        &self,
        owner: impl Into<String>,
        discriminator: impl Into<String>,
        holder: &HolderId,
    ) -> KeyedLockGuard {
        self.acquire_key(LockKey::new(owner, discriminator), holder)
            .await
    }

    /// Wait until `holder` owns the lock for `key`.
    ///
    /// Reentrant: a holder that already owns the lock gets another hold
    /// immediately. Dropping the returned future before it resolves gives up
    /// the wait without side effects.
    pub async fn acquire_key(&self, key: LockKey, holder: &HolderId) -> KeyedLockGuard {
        let lease = self.registry.lease(key);
        let entry = Arc::clone(&lease.entry);
        loop {
            let released = entry.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if entry.try_take(holder) {
                tracing::trace!(key = %entry.key, %holder, "lock acquired");
                return KeyedLockGuard::new(lease, holder);
            }
            released.await;
        }
    }

    /// Acquire without waiting
    pub fn try_acquire(&self, key: LockKey, holder: &HolderId) -> Option<KeyedLockGuard> {
        let lease = self.registry.lease(key);
        if lease.entry.try_take(holder) {
            Some(KeyedLockGuard::new(lease, holder))
        } else {
            None
        }
    }

    /// Run `work` while holding the lock, releasing it however `work` ends
    pub async fn with_lock<F: Future>(&self, key: LockKey, holder: &HolderId, work: F) -> F::Output {
        let _guard = self.acquire_key(key, holder).await;
        work.await
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.registry.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn holder_of(&self, key: &LockKey) -> Option<HolderId> {
        let entry = self.registry.slots().get(key).map(|s| Arc::clone(&s.entry))?;
        let hold = entry.hold();
        hold.as_ref().map(|h| h.holder.clone())
    }

    /// Outstanding holds on `key`, zero if unlocked
    pub fn hold_count(&self, key: &LockKey) -> usize {
        let Some(entry) = self.registry.slots().get(key).map(|s| Arc::clone(&s.entry)) else {
            return 0;
        };
        let hold = entry.hold();
        hold.as_ref().map_or(0, |h| h.count)
    }
}

impl fmt::Debug for KeyedLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLocks").field("entries", &self.len()).finish()
    }
}

/// One hold on a keyed lock, released on drop
pub struct KeyedLockGuard {
    lease: Option<Lease>,
    holder: HolderId,
}

impl KeyedLockGuard {
    fn new(lease: Lease, holder: &HolderId) -> Self {
        Self {
            lease: Some(lease),
            holder: holder.clone(),
        }
    }

    pub fn key(&self) -> Option<&LockKey> {
        self.lease.as_ref().map(|l| &l.entry.key)
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    /// True until the first release
    pub fn is_held(&self) -> bool {
        self.lease.is_some()
    }

    /// Give back this hold.
    ///
    /// Only the first call has any effect; later calls return false.
    pub fn release(&mut self) -> bool {
        let Some(lease) = self.lease.take() else {
            return false;
        };
        lease.entry.release(&self.holder)
    }
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for KeyedLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLockGuard")
            .field("key", &self.key())
            .field("holder", &self.holder)
            .finish()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
