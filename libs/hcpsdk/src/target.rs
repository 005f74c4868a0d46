//! An HCP endpoint: name, port, credentials, node addresses and connection
//! settings.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authorization, DummyAuthorization};
use crate::connection::Connection;
use crate::error::HcpError;
use crate::ips::{Circle, QueryMode};
use crate::transport::build_service;
use crate::transport::config::{ConnectionConfig, TransportSecurity};

/// Port of the REST data access interface
pub const DEFAULT_PORT: u16 = 443;

/// Port of the management API
pub const MAPI_PORT: u16 = 9090;

/// URL scheme used to reach the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scheme {
    #[default]
    Https,
    /// Plain HTTP; requires [`TransportSecurity::AllowInsecureHttp`]
    Http,
}

impl Scheme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved HCP endpoint.
///
/// For data access the FQDN has the form `namespace.tenant.hcp-name.domain`;
/// for MAPI it is `admin.hcp-name.domain` or `tenant.hcp-name.domain` with
/// port 9090. Cloning is cheap.
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

struct TargetInner {
    fqdn: String,
    port: u16,
    scheme: Scheme,
    authorization: Arc<dyn Authorization>,
    circle: Arc<Circle>,
    config: ConnectionConfig,
    dns_refresh: Option<Duration>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("fqdn", &self.inner.fqdn)
            .field("port", &self.inner.port)
            .field("scheme", &self.inner.scheme)
            .field("authorization", &self.inner.authorization)
            .field("addresses", &self.inner.circle.addresses())
            .finish_non_exhaustive()
    }
}

impl Target {
    #[must_use]
    pub fn builder(fqdn: impl Into<String>) -> TargetBuilder {
        TargetBuilder::new(fqdn)
    }

    #[must_use]
    pub fn fqdn(&self) -> &str {
        &self.inner.fqdn
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.inner.scheme
    }

    /// `scheme://fqdn:port`, without trailing slash
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.inner.scheme, self.inner.fqdn, self.inner.port)
    }

    /// First label of the FQDN (the namespace of a data access target)
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.inner.fqdn.split('.').next().filter(|s| !s.is_empty())
    }

    /// Second label of the FQDN (the tenant of a data access target)
    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        self.inner.fqdn.split('.').nth(1).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn circle(&self) -> &Arc<Circle> {
        &self.inner.circle
    }

    /// Node addresses currently known for the target
    #[must_use]
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.inner.circle.addresses()
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Open a connection: builds the middleware stack and its connection pool.
    ///
    /// Clone the returned [`Connection`] to share the pool between tasks.
    ///
    /// # Errors
    /// Fails on TLS setup errors or an invalid user agent.
    pub fn connection(&self) -> Result<Connection, HcpError> {
        let service = build_service(
            &self.inner.config,
            Arc::clone(&self.inner.circle),
            self.inner.dns_refresh,
            Arc::clone(&self.inner.authorization),
        )?;
        Ok(Connection::new(
            service,
            self.base_url(),
            self.inner.config.max_body_size,
            self.inner.config.transport,
        ))
    }
}

/// Builder for [`Target`]
#[must_use]
pub struct TargetBuilder {
    fqdn: String,
    port: u16,
    scheme: Scheme,
    authorization: Arc<dyn Authorization>,
    addresses: Option<Vec<IpAddr>>,
    config: ConnectionConfig,
    dns_refresh: Option<Duration>,
    query_mode: QueryMode,
}

impl TargetBuilder {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            port: DEFAULT_PORT,
            scheme: Scheme::Https,
            authorization: Arc::new(DummyAuthorization),
            addresses: None,
            config: ConnectionConfig::default(),
            dns_refresh: None,
            query_mode: QueryMode::System,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn authorization(mut self, authorization: impl Authorization + 'static) -> Self {
        self.authorization = Arc::new(authorization);
        self
    }

    /// Use these node addresses instead of asking DNS
    pub fn addresses(mut self, addresses: Vec<IpAddr>) -> Self {
        self.addresses = Some(addresses);
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Re-resolve the FQDN when a new connection is opened and the cached
    /// answer is older than `ttl`
    pub fn dns_refresh(mut self, ttl: Duration) -> Self {
        self.dns_refresh = Some(ttl);
        self
    }

    /// How the FQDN is resolved, now and on every refresh
    pub fn query_mode(mut self, mode: QueryMode) -> Self {
        self.query_mode = mode;
        self
    }

    /// Talk plain HTTP (mock servers in tests).
    ///
    /// Only available in debug builds or with the `allow-insecure-http`
    /// feature.
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "hcpsdk::security",
            fqdn = %self.fqdn,
            "insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.scheme = Scheme::Http;
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Resolve the FQDN (unless addresses were pinned) and build the target.
    ///
    /// # Errors
    /// [`HcpError::Resolve`] if the name cannot be resolved or no address was
    /// given, [`HcpError::InvalidScheme`] if plain HTTP is requested without
    /// insecure transport.
    pub async fn build(self) -> Result<Target, HcpError> {
        if self.scheme == Scheme::Http && self.config.transport == TransportSecurity::TlsOnly {
            return Err(HcpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            });
        }

        let circle = match self.addresses {
            Some(addresses) => Circle::from_addresses(self.fqdn.clone(), self.port, addresses)?,
            None => Circle::resolve_with(self.fqdn.clone(), self.port, self.query_mode).await?,
        };
        tracing::debug!(
            fqdn = %self.fqdn,
            port = self.port,
            addresses = ?circle.addresses(),
            "target ready"
        );

        Ok(Target {
            inner: Arc::new(TargetInner {
                fqdn: self.fqdn,
                port: self.port,
                scheme: self.scheme,
                authorization: self.authorization,
                circle: Arc::new(circle),
                config: self.config,
                dns_refresh: self.dns_refresh,
            }),
        })
    }
}
