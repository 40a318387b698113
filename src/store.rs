//! JSON-file key store.
//!
//! Holds one record per principal (base-32 secret, next expected counter,
//! last successful use). The whole file is rewritten on every change via a
//! temporary file and a rename, so a crash leaves either the old or the new
//! contents. Each write runs in its own task holding the store lock, so a
//! caller that stops waiting (a timeout, a dropped request) cannot leave the
//! file and the in-memory copy disagreeing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use passhotp_engine::hotp::SecretKey;
use passhotp_strategy::strategy::{BoxError, CounterResync, HotpKey, KeyLookup, PropertyMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type KeyMap = HashMap<String, StoredKey>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed key store: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stored secret for {0} is not valid base-32")]
    InvalidSecret(String),

    #[error("no HOTP key enrolled for {0}")]
    UnknownPrincipal(String),

    #[error("key store write did not complete: {0}")]
    Write(#[from] tokio::task::JoinError),

    #[error("counter {requested} does not advance past stored counter {current} for {principal}")]
    StaleCounter {
        principal: String,
        current: u64,
        requested: u64,
    },
}

/// One record as written to disk.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKey {
    pub principal: String,
    /// Base-32, unpadded.
    pub secret: String,
    pub counter: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredKey")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .field("counter", &self.counter)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

pub struct FileKeyStore {
    path: PathBuf,
    keys: Arc<Mutex<KeyMap>>,
}

impl FileKeyStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let keys = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let records: Vec<StoredKey> = serde_json::from_str(&data)?;
            records
                .into_iter()
                .map(|r| (r.principal.clone(), r))
                .collect()
        } else {
            HashMap::new()
        };
        tracing::debug!(path = %path.display(), keys = keys.len(), "opened key store");
        Ok(Self {
            path,
            keys: Arc::new(Mutex::new(keys)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enroll or replace a principal's key and persist it.
    pub async fn enroll(
        &self,
        principal: impl Into<String>,
        secret: &SecretKey,
        counter: u64,
    ) -> Result<(), StoreError> {
        let principal = principal.into();
        let keys = self.keys.clone().lock_owned().await;
        let mut next = (*keys).clone();
        next.insert(
            principal.clone(),
            StoredKey {
                principal: principal.clone(),
                secret: secret.to_base32(),
                counter,
                last_used_at: None,
            },
        );
        self.commit(keys, next).await?;
        tracing::info!(principal = %principal, "enrolled HOTP key");
        Ok(())
    }

    pub async fn remove(&self, principal: &str) -> Result<bool, StoreError> {
        let keys = self.keys.clone().lock_owned().await;
        if !keys.contains_key(principal) {
            return Ok(false);
        }
        let mut next = (*keys).clone();
        next.remove(principal);
        self.commit(keys, next).await?;
        Ok(true)
    }

    pub async fn principals(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn record(&self, principal: &str) -> Option<StoredKey> {
        self.keys.lock().await.get(principal).cloned()
    }

    /// Write `next` to disk and then install it in memory, in a task that
    /// keeps the lock until both are done. Dropping the returned future does
    /// not cancel the task.
    async fn commit(
        &self,
        mut keys: OwnedMutexGuard<KeyMap>,
        next: KeyMap,
    ) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::spawn(async move {
            persist(&path, &next).await?;
            *keys = next;
            Ok::<(), StoreError>(())
        })
        .await?
    }
}

async fn persist(path: &Path, keys: &KeyMap) -> Result<(), StoreError> {
    let mut records: Vec<&StoredKey> = keys.values().collect();
    records.sort_by(|a, b| a.principal.cmp(&b.principal));
    let data = serde_json::to_string_pretty(&records)?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl KeyLookup<String> for FileKeyStore {
    async fn lookup(&self, principal: &String) -> Result<HotpKey, BoxError> {
        let keys = self.keys.lock().await;
        let record = keys
            .get(principal)
            .ok_or_else(|| StoreError::UnknownPrincipal(principal.clone()))?;
        let secret = SecretKey::from_base32(&record.secret)
            .map_err(|_| StoreError::InvalidSecret(principal.clone()))?;
        Ok(HotpKey::new(secret, record.counter))
    }
}

#[async_trait]
impl CounterResync<String> for FileKeyStore {
    async fn resync(
        &self,
        principal: &String,
        _secret: &SecretKey,
        new_counter: u64,
        delta: u64,
    ) -> Result<Option<PropertyMap>, BoxError> {
        let keys = self.keys.clone().lock_owned().await;
        let mut record = keys
            .get(principal)
            .cloned()
            .ok_or_else(|| StoreError::UnknownPrincipal(principal.clone()))?;
        if new_counter <= record.counter {
            return Err(StoreError::StaleCounter {
                principal: principal.clone(),
                current: record.counter,
                requested: new_counter,
            }
            .into());
        }

        let now = Utc::now();
        record.counter = new_counter;
        record.last_used_at = Some(now);
        let mut next = (*keys).clone();
        next.insert(principal.clone(), record);
        self.commit(keys, next).await?;
        tracing::debug!(principal = %principal, delta, counter = new_counter, "counter advanced");

        let mut properties = PropertyMap::new();
        properties.insert("lastUsedAt".into(), serde_json::Value::String(now.to_rfc3339()));
        Ok(Some(properties))
    }
}
