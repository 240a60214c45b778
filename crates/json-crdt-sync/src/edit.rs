//! Optimistic and lock-based edit coordination on top of the sync manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use json_crdt_core::{DocError, Document, Patch, PatchBuilder};

use crate::error::SyncError;
use crate::manager::SyncManager;

#[derive(Debug, Clone)]
pub struct EditOptions {
    /// Total attempts before an optimistic edit gives up.
    pub max_retries: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Double the delay after each conflict.
    pub exponential_backoff: bool,
    /// Distributed-lock TTL for transactional edits.
    pub transaction_ttl: Duration,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            exponential_backoff: false,
            transaction_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    /// The caller's mutation function failed; never retried.
    #[error("mutation failed: {0}")]
    Mutation(DocError),
    /// The built patch failed to apply.
    #[error("apply failed: {0}")]
    Apply(DocError),
    /// Every attempt hit a concurrent version change.
    #[error("edit conflicted on every attempt, gave up after {attempts}")]
    RetriesExhausted { attempts: u32 },
    /// Distributed lock could not be acquired or released.
    #[error("lock error: {0}")]
    Lock(String),
    /// Synchronization-layer failure.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Progress states of one optimistic edit, for instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Attempting,
    ConflictDetected,
    Retrying,
    Succeeded,
    Failed,
}

/// Distributed mutual exclusion, consumed only by transactional edits.
/// Real backends live outside this crate; `MemoryLockManager` covers
/// single-process use and tests.
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockGuard, EditError>;
    async fn release(&self, guard: LockGuard) -> Result<(), EditError>;
}

/// Proof of lock ownership; the token guards against releasing a lock that
/// expired and was re-acquired by someone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    pub key: String,
    pub token: Uuid,
}

#[derive(Debug, Default)]
pub struct MemoryLockManager {
    held: Mutex<HashMap<String, (Uuid, Instant)>>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockGuard, EditError> {
        let mut held = self.held.lock();
        if let Some((_, expires)) = held.get(key) {
            if Instant::now() < *expires {
                return Err(EditError::Lock(format!("lock already held: {key}")));
            }
        }
        let token = Uuid::new_v4();
        held.insert(key.to_string(), (token, Instant::now() + ttl));
        Ok(LockGuard {
            key: key.to_string(),
            token,
        })
    }

    async fn release(&self, guard: LockGuard) -> Result<(), EditError> {
        let mut held = self.held.lock();
        match held.get(&guard.key) {
            Some((token, _)) if *token == guard.token => {
                held.remove(&guard.key);
                Ok(())
            }
            _ => Err(EditError::Lock(format!(
                "lock not held by this guard: {}",
                guard.key
            ))),
        }
    }
}

/// Runs caller mutations against the shared document with either optimistic
/// retries or a distributed lock.
pub struct Editor {
    manager: Arc<SyncManager>,
    locks: Arc<dyn LockManager>,
    options: EditOptions,
}

impl Editor {
    pub fn new(manager: Arc<SyncManager>, locks: Arc<dyn LockManager>, options: EditOptions) -> Self {
        Self {
            manager,
            locks,
            options,
        }
    }

    /// Optimistic edit: snapshot the document, run the mutation against a
    /// fresh builder, then apply only if no other local mutation landed in
    /// between. Conflicts retry up to `max_retries`; a mutation failure is
    /// returned immediately on the first attempt. The resulting patch is
    /// broadcast best-effort after the local apply.
    pub async fn edit<F>(&self, mutate: F) -> Result<Patch, EditError>
    where
        F: Fn(&Document, &mut PatchBuilder) -> Result<(), DocError>,
    {
        let mut delay = self.options.retry_delay;
        for attempt in 1..=self.options.max_retries {
            debug!(attempt, state = ?EditState::Attempting, "optimistic edit");
            let AttemptPatch { version, patch } = self.build_attempt(&mutate, attempt)?;
            if patch.is_empty() {
                return Ok(patch);
            }

            let conflicted = {
                let doc = self.manager.document();
                let mut doc = doc.write();
                if doc.version() != version {
                    true
                } else {
                    patch.apply(&mut doc).map_err(EditError::Apply)?;
                    false
                }
            };

            if conflicted {
                debug!(attempt, state = ?EditState::ConflictDetected, "edit conflicted");
                if attempt < self.options.max_retries {
                    debug!(attempt, state = ?EditState::Retrying, delay = ?delay, "retrying");
                    sleep(delay).await;
                    if self.options.exponential_backoff {
                        delay *= 2;
                    }
                }
                continue;
            }

            self.propagate(&patch).await;
            debug!(attempt, state = ?EditState::Succeeded, "edit applied");
            return Ok(patch);
        }
        debug!(state = ?EditState::Failed, attempts = self.options.max_retries, "edit gave up");
        Err(EditError::RetriesExhausted {
            attempts: self.options.max_retries,
        })
    }

    /// Lock-based edit: acquires the distributed lock for `key`, applies
    /// the mutation exactly once, and releases the lock on every exit path.
    /// Lock acquisition failure is fatal and surfaces to the caller.
    pub async fn edit_transaction<F>(&self, key: &str, mutate: F) -> Result<Patch, EditError>
    where
        F: FnOnce(&Document, &mut PatchBuilder) -> Result<(), DocError>,
    {
        let guard = self
            .locks
            .acquire(key, self.options.transaction_ttl)
            .await?;
        let result = self.run_exclusive(mutate).await;
        if let Err(err) = self.locks.release(guard).await {
            warn!(%err, "failed to release transaction lock");
        }
        result
    }

    fn build_attempt<F>(&self, mutate: &F, attempt: u32) -> Result<AttemptPatch, EditError>
    where
        F: Fn(&Document, &mut PatchBuilder) -> Result<(), DocError>,
    {
        let snapshot = self.manager.document().read().clone();
        let version = snapshot.version();
        let mut builder = snapshot.builder();
        mutate(&snapshot, &mut builder).map_err(EditError::Mutation)?;
        builder.set_metadata("txn", json!(Uuid::new_v4().to_string()));
        builder.set_metadata("retry", json!(attempt - 1));
        Ok(AttemptPatch {
            version,
            patch: builder.build(),
        })
    }

    async fn run_exclusive<F>(&self, mutate: F) -> Result<Patch, EditError>
    where
        F: FnOnce(&Document, &mut PatchBuilder) -> Result<(), DocError>,
    {
        let snapshot = self.manager.document().read().clone();
        let mut builder = snapshot.builder();
        mutate(&snapshot, &mut builder).map_err(EditError::Mutation)?;
        builder.set_metadata("txn", json!(Uuid::new_v4().to_string()));
        let patch = builder.build();
        if patch.is_empty() {
            return Ok(patch);
        }
        {
            let doc = self.manager.document();
            let mut doc = doc.write();
            patch.apply(&mut doc).map_err(EditError::Apply)?;
        }
        self.propagate(&patch).await;
        Ok(patch)
    }

    /// Store/broadcast bookkeeping after a successful local apply; failures
    /// are logged, never fatal to the edit.
    async fn propagate(&self, patch: &Patch) {
        if let Err(err) = self.manager.record_and_broadcast(patch).await {
            warn!(%err, "failed to record applied patch");
        }
    }
}

struct AttemptPatch {
    version: u64,
    patch: Patch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_lock_excludes_second_acquirer_until_release() {
        let locks = MemoryLockManager::new();
        let guard = locks.acquire("doc", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            locks.acquire("doc", Duration::from_secs(5)).await,
            Err(EditError::Lock(_))
        ));
        locks.release(guard).await.unwrap();
        locks.acquire("doc", Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired_but_not_released_by_old_guard() {
        let locks = MemoryLockManager::new();
        let stale = locks
            .acquire("doc", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        let fresh = locks.acquire("doc", Duration::from_secs(5)).await.unwrap();
        assert!(locks.release(stale).await.is_err());
        locks.release(fresh).await.unwrap();
    }
}
