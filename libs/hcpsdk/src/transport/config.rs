use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default User-Agent string for HCP requests
pub const DEFAULT_USER_AGENT: &str = concat!("hcpsdk/", env!("CARGO_PKG_VERSION"));

/// HCP closes idle connections after 30 seconds, pooled connections must not
/// outlive that
pub const HCP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Conditions that trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Connection refused, reset, no node reachable
    TransportError,
    /// Request attempt timeout
    Timeout,
    /// Specific HTTP status code
    Status(u16),
    /// Never retried (deadline exceeded, service closed, authentication)
    NonRetryable,
}

impl RetryTrigger {
    pub const TOO_MANY_REQUESTS: Self = Self::Status(429);
    pub const REQUEST_TIMEOUT: Self = Self::Status(408);
    pub const INTERNAL_SERVER_ERROR: Self = Self::Status(500);
    pub const BAD_GATEWAY: Self = Self::Status(502);
    pub const SERVICE_UNAVAILABLE: Self = Self::Status(503);
    pub const GATEWAY_TIMEOUT: Self = Self::Status(504);
}

/// Check if an HTTP method is idempotent per RFC 9110.
///
/// HCP object writes (`PUT`) are idempotent as far as retrying is concerned: a
/// repeated `PUT` of the same object either succeeds or reports 409.
#[must_use]
pub fn is_idempotent_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::GET
            | http::Method::HEAD
            | http::Method::PUT
            | http::Method::DELETE
            | http::Method::OPTIONS
            | http::Method::TRACE
    )
}

/// Exponential backoff: `min(initial * multiplier^attempt, max)`, plus up to
/// 25% jitter when enabled.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// 1ms initial, 100ms max, no jitter
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exp);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Retry policy.
///
/// Triggers in `always_retry` apply to every request. Triggers in
/// `idempotent_retry` apply only to idempotent methods, so a MAPI `POST`
/// (log preparation, replication actions) is never repeated after a 5xx or a
/// broken connection.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt (total attempts = 1 + `max_retries`)
    pub max_retries: usize,

    pub backoff: ExponentialBackoff,

    /// Default: `{429}`
    pub always_retry: HashSet<RetryTrigger>,

    /// Default: `{TransportError, Timeout, 408, 500, 502, 503, 504}`
    pub idempotent_retry: HashSet<RetryTrigger>,

    /// Use the backoff even if the response carries `Retry-After`
    pub ignore_retry_after: bool,

    /// Maximum bytes drained from a failed response before retrying, so the
    /// connection can go back to the pool. Default: 64 KiB.
    pub retry_response_drain_limit: usize,
}

/// Default drain limit for response bodies before retry (64 KiB)
pub const DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT: usize = 64 * 1024;

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            always_retry: HashSet::from([RetryTrigger::TOO_MANY_REQUESTS]),
            idempotent_retry: HashSet::from([
                RetryTrigger::TransportError,
                RetryTrigger::Timeout,
                RetryTrigger::REQUEST_TIMEOUT,
                RetryTrigger::INTERNAL_SERVER_ERROR,
                RetryTrigger::BAD_GATEWAY,
                RetryTrigger::SERVICE_UNAVAILABLE,
                RetryTrigger::GATEWAY_TIMEOUT,
            ]),
            ignore_retry_after: false,
            retry_response_drain_limit: DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT,
        }
    }
}

impl RetryConfig {
    /// No retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Whether `trigger` should cause a retry of a request using `method`
    #[must_use]
    pub fn should_retry(&self, trigger: RetryTrigger, method: &http::Method) -> bool {
        if self.always_retry.contains(&trigger) {
            return true;
        }
        self.idempotent_retry.contains(&trigger) && is_idempotent_method(method)
    }
}

/// Certificate verification strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsConfig {
    /// Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// OS native root certificate store
    Native,
    /// Trust only the PEM encoded CA certificates in this file
    CustomCa(PathBuf),
    /// Accept any server certificate.
    ///
    /// HCP systems ship with self-signed certificates; this mode talks to them
    /// without importing the certificate, at the price of no server
    /// authentication at all.
    AcceptInvalidCerts,
}

/// Whether plain HTTP is allowed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// HTTPS only
    #[default]
    TlsOnly,
    /// Allow `http://` targets. Only meant for mock servers in tests.
    AllowInsecureHttp,
}

/// Settings for one [`Connection`](crate::Connection) to an HCP target
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for a single attempt, from sending the request until the
    /// response headers arrive (default: 30s)
    pub request_timeout: Duration,

    /// TCP connect timeout per node address (default: 10s).
    ///
    /// A node that does not accept within this time is skipped and the next
    /// address of the target is tried.
    pub connect_timeout: Duration,

    /// Deadline across all attempts and backoff sleeps (default: none)
    pub total_timeout: Option<Duration>,

    /// Upper bound for buffered body reads (`bytes()`, `json()`, ...).
    /// Streaming through `into_body()` is not limited. Default: 10 MiB.
    pub max_body_size: usize,

    pub user_agent: String,

    /// `None` disables retrying
    pub retry: Option<RetryConfig>,

    /// Fail fast with `Overloaded` once this many requests are in flight.
    /// `None` means no limit.
    pub max_concurrent_requests: Option<usize>,

    pub transport: TransportSecurity,

    pub tls: TlsConfig,

    /// Requests that may queue in front of the shared service (default: 1024)
    pub buffer_capacity: usize,

    /// Idle pooled connections are closed after this (default: 30s)
    pub pool_idle_timeout: Option<Duration>,

    /// Idle connections kept per target (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: Some(RetryConfig::default()),
            max_concurrent_requests: Some(100),
            transport: TransportSecurity::TlsOnly,
            tls: TlsConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(HCP_IDLE_TIMEOUT),
            pool_max_idle_per_host: 32,
        }
    }
}

impl ConnectionConfig {
    /// Settings for MAPI sessions: log downloads take long to produce their
    /// first byte, so the attempt timeout is raised to 10 minutes and retries
    /// are left to the caller.
    #[must_use]
    pub fn mapi() -> Self {
        Self {
            request_timeout: Duration::from_secs(600),
            retry: Some(RetryConfig::disabled()),
            max_concurrent_requests: Some(8),
            buffer_capacity: 64,
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }

    /// Settings for talking to mock servers over plain HTTP.
    ///
    /// **WARNING**: allows unencrypted connections. Never use in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            total_timeout: None,
            max_body_size: 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: None,
            max_concurrent_requests: None,
            transport: TransportSecurity::AllowInsecureHttp,
            tls: TlsConfig::default(),
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
        }
    }
}
