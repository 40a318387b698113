//! The HOTP authentication strategy.
//!
//! Ordering is fixed: extract code → look up key → verify → resync →
//! success. A missing or wrong code is `Fail`; anything that prevents a
//! verdict is `Error`. `Success` is only returned after the resync
//! collaborator has confirmed the advanced counter.

use async_trait::async_trait;
use passhotp_engine::hotp::{self, HotpParams, Verification};
use std::future::Future;

use crate::strategy::collaborators::{CounterResync, KeyLookup};
use crate::strategy::field;
use crate::strategy::types::*;

/// A pluggable step in a request authentication pipeline.
#[async_trait]
pub trait Strategy<P>: Send + Sync
where
    P: Send + Sync,
{
    /// Name the strategy is registered under.
    fn name(&self) -> &str;

    async fn authenticate(&self, request: &AuthRequest<P>) -> AuthOutcome<P>;
}

/// HOTP strategy composed from the engine and two collaborators.
pub struct HotpStrategy<L, R> {
    config: StrategyConfig,
    params: HotpParams,
    lookup: L,
    resync: R,
}

impl<L, R> HotpStrategy<L, R> {
    /// Strategy with default options (`code` field, window 50, 6 digits).
    pub fn new(lookup: L, resync: R) -> Self {
        Self::with_config(StrategyConfig::default(), lookup, resync)
    }

    pub fn with_config(config: StrategyConfig, lookup: L, resync: R) -> Self {
        let params = config.params();
        Self {
            config,
            params,
            lookup,
            resync,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Submitted code for this request, body first, then query.
    pub fn extract_code<'a, P>(&self, request: &'a AuthRequest<P>) -> Option<&'a str> {
        field::extract_code(
            request.body.as_ref(),
            request.query.as_ref(),
            &self.config.code_field,
        )
    }

    /// Run the verification state machine for an already-extracted code.
    pub async fn authenticate_request<P>(
        &self,
        candidate: Option<&str>,
        principal: &P,
    ) -> AuthOutcome<P>
    where
        P: Clone + Send + Sync,
        L: KeyLookup<P>,
        R: CounterResync<P>,
    {
        let name = &self.config.name;

        let Some(candidate) = candidate else {
            log::debug!("{}: no code submitted", name);
            return AuthOutcome::Fail(FailReason::MissingCode);
        };

        let key = match self.bounded(Stage::Lookup, self.lookup.lookup(principal)).await {
            Ok(key) => key,
            Err(e) => {
                log::warn!("{}: {}", name, e);
                return AuthOutcome::Error(e);
            }
        };

        let verification = match hotp::verify_with(
            candidate,
            key.secret.as_bytes(),
            key.counter,
            self.config.window,
            self.params,
        ) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("{}: stored key rejected: {}", name, e);
                return AuthOutcome::Error(StrategyError::Engine(e));
            }
        };

        let delta = match verification {
            Verification::NoMatch => {
                log::debug!("{}: code did not match within window {}", name, self.config.window);
                return AuthOutcome::Fail(FailReason::InvalidCode);
            }
            Verification::Matched { delta } => delta,
        };

        let Some(new_counter) = verification.next_counter(key.counter) else {
            log::warn!("{}: counter exhausted at {}", name, key.counter);
            return AuthOutcome::Error(StrategyError::CounterOverflow);
        };

        let resynced = self
            .bounded(
                Stage::Resync,
                self.resync.resync(principal, &key.secret, new_counter, delta),
            )
            .await;
        match resynced {
            Ok(properties) => {
                log::debug!("{}: accepted at delta {}, counter now {}", name, delta, new_counter);
                AuthOutcome::Success {
                    principal: principal.clone(),
                    properties,
                }
            }
            Err(e) => {
                log::warn!("{}: {}", name, e);
                AuthOutcome::Error(e)
            }
        }
    }

    /// Await a collaborator call, applying the configured timeout.
    async fn bounded<T, F>(&self, stage: Stage, call: F) -> Result<T, StrategyError>
    where
        F: Future<Output = Result<T, BoxError>>,
    {
        let wrap = |e: BoxError| match stage {
            Stage::Lookup => StrategyError::Lookup(e),
            Stage::Resync => StrategyError::Resync(e),
        };
        match self.config.collaborator_timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(wrap),
                Err(_) => Err(StrategyError::Timeout { stage }),
            },
            None => call.await.map_err(wrap),
        }
    }
}

#[async_trait]
impl<P, L, R> Strategy<P> for HotpStrategy<L, R>
where
    P: Clone + Send + Sync + 'static,
    L: KeyLookup<P>,
    R: CounterResync<P>,
{
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn authenticate(&self, request: &AuthRequest<P>) -> AuthOutcome<P> {
        let Some(code) = self.extract_code(request) else {
            log::debug!("{}: no code submitted", self.config.name);
            return AuthOutcome::Fail(FailReason::MissingCode);
        };
        let Some(principal) = request.principal.as_ref() else {
            log::warn!(
                "{}: code submitted without an authenticated principal",
                self.config.name
            );
            return AuthOutcome::Error(StrategyError::MissingPrincipal);
        };
        self.authenticate_request(Some(code), principal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::collaborators::HotpKey;
    use crate::strategy::memory_store::MemoryKeyStore;
    use passhotp_engine::hotp::{HotpError, SecretKey};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const RFC_KEY: &[u8] = b"12345678901234567890";

    fn code(counter: u64) -> String {
        hotp::generate(RFC_KEY, counter).unwrap()
    }

    fn body(code: &str) -> RequestValue {
        RequestValue::map([("code", RequestValue::scalar(code))])
    }

    /// Scripted collaborator that records every call.
    #[derive(Default)]
    struct Recorder {
        secret: Option<Vec<u8>>,
        counter: u64,
        lookup_fails: bool,
        resync_fails: bool,
        resync_delay: Option<Duration>,
        properties: Option<PropertyMap>,
        lookups: AtomicUsize,
        resyncs: Mutex<Vec<(u64, u64)>>,
    }

    impl Recorder {
        fn rfc(counter: u64) -> Self {
            Self {
                secret: Some(RFC_KEY.to_vec()),
                counter,
                ..Default::default()
            }
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }

        fn resyncs(&self) -> Vec<(u64, u64)> {
            self.resyncs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KeyLookup<String> for Recorder {
        async fn lookup(&self, _principal: &String) -> Result<HotpKey, BoxError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.lookup_fails {
                return Err("directory unavailable".into());
            }
            let secret = self.secret.clone().unwrap_or_default();
            Ok(HotpKey::new(SecretKey::new(secret), self.counter))
        }
    }

    #[async_trait]
    impl CounterResync<String> for Recorder {
        async fn resync(
            &self,
            _principal: &String,
            _secret: &SecretKey,
            new_counter: u64,
            delta: u64,
        ) -> Result<Option<PropertyMap>, BoxError> {
            if let Some(delay) = self.resync_delay {
                tokio::time::sleep(delay).await;
            }
            self.resyncs.lock().unwrap().push((new_counter, delta));
            if self.resync_fails {
                return Err("write rejected".into());
            }
            Ok(self.properties.clone())
        }
    }

    fn strategy(
        rec: &Arc<Recorder>,
        config: StrategyConfig,
    ) -> HotpStrategy<Arc<Recorder>, Arc<Recorder>> {
        HotpStrategy::with_config(config, rec.clone(), rec.clone())
    }

    fn alice() -> AuthRequest<String> {
        AuthRequest::new("alice".to_string())
    }

    #[tokio::test]
    async fn accepts_code_inside_window_and_resyncs() {
        let rec = Arc::new(Recorder::rfc(0));
        let s = strategy(&rec, StrategyConfig::default().with_window(5));

        let outcome = s.authenticate(&alice().with_body(body(&code(3)))).await;

        match outcome {
            AuthOutcome::Success { principal, .. } => assert_eq!(principal, "alice"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(rec.resyncs(), vec![(4, 3)]);
    }

    #[tokio::test]
    async fn absent_code_fails_without_collaborators() {
        let rec = Arc::new(Recorder::rfc(0));
        let s = strategy(&rec, StrategyConfig::default());

        let request = alice()
            .with_body(RequestValue::map([("other", RequestValue::scalar("x"))]))
            .with_query(RequestValue::default());
        let outcome = s.authenticate(&request).await;

        assert!(matches!(outcome, AuthOutcome::Fail(FailReason::MissingCode)));
        assert_eq!(rec.lookups(), 0);
        assert!(rec.resyncs().is_empty());
    }

    #[tokio::test]
    async fn absent_code_fails_before_missing_principal() {
        let rec = Arc::new(Recorder::rfc(0));
        let s = strategy(&rec, StrategyConfig::default());
        let outcome = s.authenticate(&AuthRequest::default()).await;
        assert!(matches!(outcome, AuthOutcome::Fail(FailReason::MissingCode)));
    }

    #[tokio::test]
    async fn code_without_principal_is_error() {
        let rec = Arc::new(Recorder::rfc(0));
        let s = strategy(&rec, StrategyConfig::default());
        let request = AuthRequest::default().with_body(body(&code(0)));
        let outcome = s.authenticate(&request).await;
        assert!(matches!(
            outcome,
            AuthOutcome::Error(StrategyError::MissingPrincipal)
        ));
        assert_eq!(rec.lookups(), 0);
    }

    #[tokio::test]
    async fn code_from_query_with_nested_field() {
        let rec = Arc::new(Recorder::rfc(0));
        let s = strategy(&rec, StrategyConfig::default().with_code_field("otp[code]"));
        let query = RequestValue::map([(
            "otp",
            RequestValue::map([("code", RequestValue::scalar(code(0)))]),
        )]);
        let outcome = s.authenticate(&alice().with_query(query)).await;
        assert!(outcome.is_success());
        assert_eq!(rec.resyncs(), vec![(1, 0)]);
    }

    #[tokio::test]
    async fn wrong_code_fails_without_resync() {
        let rec = Arc::new(Recorder::rfc(0));
        let s = strategy(&rec, StrategyConfig::default().with_window(5));
        let outcome = s.authenticate(&alice().with_body(body(&code(6)))).await;
        assert!(matches!(outcome, AuthOutcome::Fail(FailReason::InvalidCode)));
        assert_eq!(rec.lookups(), 1);
        assert!(rec.resyncs().is_empty());
    }

    #[tokio::test]
    async fn lookup_error_is_error() {
        let rec = Arc::new(Recorder {
            lookup_fails: true,
            ..Recorder::rfc(0)
        });
        let s = strategy(&rec, StrategyConfig::default());
        let outcome = s.authenticate(&alice().with_body(body(&code(0)))).await;
        match outcome {
            AuthOutcome::Error(StrategyError::Lookup(e)) => {
                assert_eq!(e.to_string(), "directory unavailable")
            }
            other => panic!("expected lookup error, got {:?}", other),
        }
        assert!(rec.resyncs().is_empty());
    }

    #[tokio::test]
    async fn resync_error_is_never_success() {
        let rec = Arc::new(Recorder {
            resync_fails: true,
            ..Recorder::rfc(0)
        });
        let s = strategy(&rec, StrategyConfig::default());
        let outcome = s.authenticate(&alice().with_body(body(&code(0)))).await;
        assert!(matches!(outcome, AuthOutcome::Error(StrategyError::Resync(_))));
        assert_eq!(rec.resyncs(), vec![(1, 0)]);
    }

    #[tokio::test]
    async fn empty_stored_key_is_engine_error() {
        let rec = Arc::new(Recorder::default());
        let s = strategy(&rec, StrategyConfig::default());
        let outcome = s.authenticate(&alice().with_body(body("123456"))).await;
        assert!(matches!(
            outcome,
            AuthOutcome::Error(StrategyError::Engine(HotpError::InvalidKey))
        ));
    }

    #[tokio::test]
    async fn bad_digit_config_is_engine_error() {
        let rec = Arc::new(Recorder::rfc(0));
        let s = strategy(&rec, StrategyConfig::default().with_digits(12));
        let outcome = s.authenticate(&alice().with_body(body("123456"))).await;
        assert!(matches!(
            outcome,
            AuthOutcome::Error(StrategyError::Engine(HotpError::InvalidDigits(12)))
        ));
    }

    #[tokio::test]
    async fn counter_at_max_is_overflow_error() {
        let rec = Arc::new(Recorder::rfc(u64::MAX));
        let s = strategy(&rec, StrategyConfig::default());
        let outcome = s
            .authenticate(&alice().with_body(body(&code(u64::MAX))))
            .await;
        assert!(matches!(
            outcome,
            AuthOutcome::Error(StrategyError::CounterOverflow)
        ));
        assert!(rec.resyncs().is_empty());
    }

    #[tokio::test]
    async fn slow_resync_times_out() {
        let rec = Arc::new(Recorder {
            resync_delay: Some(Duration::from_secs(2)),
            ..Recorder::rfc(0)
        });
        let config = StrategyConfig::default().with_collaborator_timeout(Duration::from_millis(50));
        let s = strategy(&rec, config);
        let outcome = s.authenticate(&alice().with_body(body(&code(0)))).await;
        assert!(matches!(
            outcome,
            AuthOutcome::Error(StrategyError::Timeout {
                stage: Stage::Resync
            })
        ));
    }

    #[tokio::test]
    async fn resync_properties_reach_caller() {
        let mut props = PropertyMap::new();
        props.insert("lastUsedAt".into(), json!("2024-05-01T12:00:00Z"));
        let rec = Arc::new(Recorder {
            properties: Some(props),
            ..Recorder::rfc(0)
        });
        let s = strategy(&rec, StrategyConfig::default());
        let outcome = s.authenticate(&alice().with_body(body(&code(0)))).await;

        let mut session = PropertyMap::new();
        assert!(outcome.merge_into(&mut session));
        assert_eq!(session["lastUsedAt"], json!("2024-05-01T12:00:00Z"));
    }

    #[tokio::test]
    async fn replay_against_memory_store_fails() {
        let store = Arc::new(MemoryKeyStore::new());
        store
            .insert("alice".to_string(), SecretKey::new(RFC_KEY.to_vec()), 0)
            .await;
        let s = HotpStrategy::with_config(
            StrategyConfig::default().with_window(5),
            store.clone(),
            store.clone(),
        );
        let request = alice().with_body(body(&code(2)));

        assert!(s.authenticate(&request).await.is_success());
        assert_eq!(store.counter(&"alice".to_string()).await, Some(3));

        let replay = s.authenticate(&request).await;
        assert!(matches!(replay, AuthOutcome::Fail(FailReason::InvalidCode)));
        assert_eq!(store.counter(&"alice".to_string()).await, Some(3));
    }

    #[test]
    fn strategy_name_from_config() {
        let rec = Arc::new(Recorder::rfc(0));
        let config = StrategyConfig {
            name: "second-factor".into(),
            ..Default::default()
        };
        let s = strategy(&rec, config);
        assert_eq!(Strategy::<String>::name(&s), "second-factor");
        assert_eq!(s.config().window, 50);
    }
}
