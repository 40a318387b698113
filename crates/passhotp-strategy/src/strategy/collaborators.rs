// ── Collaborators ────────────────────────────────────────────────────────────
//
// The application owns credential storage. The strategy reaches it through
// two calls: `lookup` before verification and `resync` after a match.

use async_trait::async_trait;
use passhotp_engine::hotp::SecretKey;
use std::sync::Arc;

use crate::strategy::types::{BoxError, PropertyMap};

/// Key material for one principal. `counter` is the next expected value.
#[derive(Debug, Clone)]
pub struct HotpKey {
    pub secret: SecretKey,
    pub counter: u64,
}

impl HotpKey {
    pub fn new(secret: SecretKey, counter: u64) -> Self {
        Self { secret, counter }
    }
}

/// Resolves the stored key and counter for a principal.
#[async_trait]
pub trait KeyLookup<P>: Send + Sync
where
    P: Send + Sync,
{
    async fn lookup(&self, principal: &P) -> Result<HotpKey, BoxError>;
}

/// Persists the advanced counter after a successful match.
///
/// Called exactly once per accepted code. Must durably store `new_counter`
/// before returning `Ok`, and must either store it completely or not at all.
/// The returned map, if any, is handed to the caller for its session.
#[async_trait]
pub trait CounterResync<P>: Send + Sync
where
    P: Send + Sync,
{
    async fn resync(
        &self,
        principal: &P,
        secret: &SecretKey,
        new_counter: u64,
        delta: u64,
    ) -> Result<Option<PropertyMap>, BoxError>;
}

#[async_trait]
impl<P, T> KeyLookup<P> for Arc<T>
where
    P: Send + Sync,
    T: KeyLookup<P> + ?Sized,
{
    async fn lookup(&self, principal: &P) -> Result<HotpKey, BoxError> {
        (**self).lookup(principal).await
    }
}

#[async_trait]
impl<P, T> CounterResync<P> for Arc<T>
where
    P: Send + Sync,
    T: CounterResync<P> + ?Sized,
{
    async fn resync(
        &self,
        principal: &P,
        secret: &SecretKey,
        new_counter: u64,
        delta: u64,
    ) -> Result<Option<PropertyMap>, BoxError> {
        (**self).resync(principal, secret, new_counter, delta).await
    }
}
