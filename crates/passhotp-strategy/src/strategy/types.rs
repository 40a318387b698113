//! Core types for the verification coordinator.

use passhotp_engine::hotp::{Algorithm, HotpError, HotpParams, DEFAULT_DIGITS, DEFAULT_WINDOW};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Free-form state a resync collaborator hands back for the caller's session.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// Error type returned by application-supplied collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Request data
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Submitted form or query data as a tree of maps, lists and strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestValue {
    Scalar(String),
    List(Vec<RequestValue>),
    Map(BTreeMap<String, RequestValue>),
}

impl Default for RequestValue {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl RequestValue {
    pub fn scalar(s: impl Into<String>) -> Self {
        Self::Scalar(s.into())
    }

    /// Build a map from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RequestValue)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Child addressed by one path segment. Lists take decimal indices.
    pub fn get(&self, segment: &str) -> Option<&RequestValue> {
        match self {
            Self::Map(m) => m.get(segment),
            Self::List(l) => segment.parse::<usize>().ok().and_then(|i| l.get(i)),
            Self::Scalar(_) => None,
        }
    }

    /// Convert a JSON document. `null` becomes absent inside maps and an
    /// empty scalar inside lists; numbers and booleans keep their text form.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Scalar(b.to_string())),
            Value::Number(n) => Some(Self::Scalar(n.to_string())),
            Value::String(s) => Some(Self::Scalar(s)),
            Value::Array(items) => Some(Self::List(
                items
                    .into_iter()
                    .map(|v| Self::from_json(v).unwrap_or_else(|| Self::Scalar(String::new())))
                    .collect(),
            )),
            Value::Object(obj) => Some(Self::Map(
                obj.into_iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }
}

/// Everything the strategy reads from one incoming request.
#[derive(Debug, Clone)]
pub struct AuthRequest<P> {
    /// Principal established by an earlier pipeline stage.
    pub principal: Option<P>,
    /// Body-style submission (form or JSON).
    pub body: Option<RequestValue>,
    /// Query-string submission.
    pub query: Option<RequestValue>,
}

impl<P> Default for AuthRequest<P> {
    fn default() -> Self {
        Self {
            principal: None,
            body: None,
            query: None,
        }
    }
}

impl<P> AuthRequest<P> {
    pub fn new(principal: P) -> Self {
        Self {
            principal: Some(principal),
            body: None,
            query: None,
        }
    }

    pub fn with_body(mut self, body: RequestValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: RequestValue) -> Self {
        self.query = Some(query);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Strategy options. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyConfig {
    /// Name the strategy registers under.
    pub name: String,
    /// Field (or bracket path such as `otp[code]`) holding the submitted code.
    pub code_field: String,
    /// Number of counter positions searched beyond the stored one. Loaded
    /// configs cap this at `hotp::MAX_WINDOW`.
    pub window: u64,
    pub digits: u8,
    pub algorithm: Algorithm,
    /// Upper bound on each collaborator call; unbounded when absent.
    pub collaborator_timeout_ms: Option<u64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "hotp".to_string(),
            code_field: "code".to_string(),
            window: DEFAULT_WINDOW,
            digits: DEFAULT_DIGITS,
            algorithm: Algorithm::Sha1,
            collaborator_timeout_ms: None,
        }
    }
}

impl StrategyConfig {
    /// Builder: set code field.
    pub fn with_code_field(mut self, field: impl Into<String>) -> Self {
        self.code_field = field.into();
        self
    }

    /// Builder: set look-ahead window.
    pub fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    /// Builder: set digit count.
    pub fn with_digits(mut self, digits: u8) -> Self {
        self.digits = digits;
        self
    }

    /// Builder: bound collaborator calls.
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn params(&self) -> HotpParams {
        HotpParams::default()
            .with_digits(self.digits)
            .with_algorithm(self.algorithm)
    }

    pub fn collaborator_timeout(&self) -> Option<Duration> {
        self.collaborator_timeout_ms.map(Duration::from_millis)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a request was rejected. A normal, user-facing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// No code in the body or query.
    MissingCode,
    /// The code did not match within the window.
    InvalidCode,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCode => write!(f, "missing one-time code"),
            Self::InvalidCode => write!(f, "invalid one-time code"),
        }
    }
}

/// Terminal state of one authentication attempt.
#[derive(Debug)]
pub enum AuthOutcome<P> {
    /// Code accepted and the advanced counter persisted.
    Success {
        principal: P,
        properties: Option<PropertyMap>,
    },
    /// Authentication rejected.
    Fail(FailReason),
    /// Authentication could not be evaluated.
    Error(StrategyError),
}

impl<P> AuthOutcome<P> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Copy returned properties into `session`, overwriting existing keys.
    /// Returns `true` if anything was merged.
    pub fn merge_into(&self, session: &mut PropertyMap) -> bool {
        match self {
            Self::Success {
                properties: Some(props),
                ..
            } if !props.is_empty() => {
                for (k, v) in props {
                    session.insert(k.clone(), v.clone());
                }
                true
            }
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Collaborator call that was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Resync,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "key lookup"),
            Self::Resync => write!(f, "counter resync"),
        }
    }
}

/// Failures that prevent a verdict. Never used for a wrong code.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StrategyError {
    /// No principal was established before this strategy ran.
    #[error("no authenticated principal on request")]
    MissingPrincipal,

    #[error("key lookup failed: {0}")]
    Lookup(#[source] BoxError),

    /// The stored key or configured parameters are unusable.
    #[error("HOTP configuration error: {0}")]
    Engine(#[from] HotpError),

    /// The advanced counter was not persisted; the attempt is incomplete.
    #[error("counter resync failed: {0}")]
    Resync(#[source] BoxError),

    #[error("counter cannot advance past u64::MAX")]
    CounterOverflow,

    #[error("{stage} timed out")]
    Timeout { stage: Stage },
}
