//! In-process key store implementing both collaborator traits.

use async_trait::async_trait;
use passhotp_engine::hotp::SecretKey;
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::Mutex;

use crate::strategy::collaborators::{CounterResync, HotpKey, KeyLookup};
use crate::strategy::types::{BoxError, PropertyMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("no HOTP key enrolled for principal")]
    UnknownPrincipal,

    /// Resync may only move the counter forward.
    #[error("counter {requested} does not advance past stored counter {current}")]
    StaleCounter { current: u64, requested: u64 },
}

/// Keys held in a map behind an async mutex.
///
/// `resync` is a compare-and-advance: it refuses any counter that is not
/// strictly greater than the stored one, so two requests racing on the same
/// stale counter cannot both succeed.
pub struct MemoryKeyStore<P> {
    keys: Mutex<HashMap<P, HotpKey>>,
}

impl<P> Default for MemoryKeyStore<P> {
    fn default() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }
}

impl<P> MemoryKeyStore<P>
where
    P: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll or replace a principal's key.
    pub async fn insert(&self, principal: P, secret: SecretKey, counter: u64) {
        self.keys
            .lock()
            .await
            .insert(principal, HotpKey::new(secret, counter));
    }

    pub async fn remove(&self, principal: &P) -> bool {
        self.keys.lock().await.remove(principal).is_some()
    }

    /// Current stored counter.
    pub async fn counter(&self, principal: &P) -> Option<u64> {
        self.keys.lock().await.get(principal).map(|k| k.counter)
    }

    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.lock().await.is_empty()
    }
}

#[async_trait]
impl<P> KeyLookup<P> for MemoryKeyStore<P>
where
    P: Eq + Hash + Send + Sync,
{
    async fn lookup(&self, principal: &P) -> Result<HotpKey, BoxError> {
        self.keys
            .lock()
            .await
            .get(principal)
            .cloned()
            .ok_or_else(|| MemoryStoreError::UnknownPrincipal.into())
    }
}

#[async_trait]
impl<P> CounterResync<P> for MemoryKeyStore<P>
where
    P: Eq + Hash + Send + Sync,
{
    async fn resync(
        &self,
        principal: &P,
        secret: &SecretKey,
        new_counter: u64,
        _delta: u64,
    ) -> Result<Option<PropertyMap>, BoxError> {
        let mut keys = self.keys.lock().await;
        let entry = keys
            .get_mut(principal)
            .ok_or(MemoryStoreError::UnknownPrincipal)?;
        if new_counter <= entry.counter {
            return Err(MemoryStoreError::StaleCounter {
                current: entry.counter,
                requested: new_counter,
            }
            .into());
        }
        entry.secret = secret.clone();
        entry.counter = new_counter;
        Ok(None)
    }
}
