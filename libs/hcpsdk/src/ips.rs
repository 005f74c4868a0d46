//! Target address resolution.
//!
//! An HCP system answers for a DNS name (for example
//! `ns1.tenant1.hcp.example.com`) with the addresses of all of its nodes. A
//! [`Circle`] resolves such a name once, caches the node addresses and hands
//! them out round-robin so that new connections are spread across the nodes.
//! [`CircleResolver`] plugs a `Circle` into hyper's connector, which then tries
//! the addresses in rotation order until one accepts the connection.
//!
//! [`QueryMode::Direct`] asks the configured name servers on every lookup,
//! skipping the system resolver and any cache in between, for setups where a
//! node list that changed minutes ago must be seen at once.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use hickory_resolver::{ResolveError, TokioResolver};
use hyper_util::client::legacy::connect::dns::Name;
use thiserror::Error;

/// Name resolution failures
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IpsError {
    /// The name resolved, but yielded no usable address
    #[error("no addresses found for '{0}'")]
    NoAddresses(String),

    /// The system resolver failed
    #[error("lookup of '{fqdn}' failed: {source}")]
    Lookup {
        fqdn: String,
        #[source]
        source: std::io::Error,
    },

    /// The name server answered that the name does not exist
    #[error("'{0}' does not exist (NXDOMAIN)")]
    NxDomain(String),

    /// Asking the name servers directly failed
    #[error("DNS query for '{fqdn}' failed: {source}")]
    Dns {
        fqdn: String,
        #[source]
        source: Box<ResolveError>,
    },
}

/// How a name is turned into addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryMode {
    /// The operating system resolver, with whatever caching it does
    #[default]
    System,
    /// The name servers from the system configuration, uncached
    Direct,
}

/// Resolve `fqdn` through the system resolver.
///
/// IPv4 addresses are preferred: IPv6 addresses are only returned if the name
/// has no IPv4 address at all. Duplicates are removed, order is kept.
///
/// # Errors
/// Returns [`IpsError::Lookup`] if the resolver fails and
/// [`IpsError::NoAddresses`] if the answer is empty.
pub async fn query(fqdn: &str) -> Result<Vec<IpAddr>, IpsError> {
    query_with(fqdn, QueryMode::System).await
}

/// [`query`] with an explicit [`QueryMode`].
///
/// # Errors
/// As [`query`]; in [`QueryMode::Direct`] a missing name is
/// [`IpsError::NxDomain`] and other failures are [`IpsError::Dns`].
pub async fn query_with(fqdn: &str, mode: QueryMode) -> Result<Vec<IpAddr>, IpsError> {
    let answer = match mode {
        QueryMode::System => system_lookup(fqdn).await?,
        QueryMode::Direct => direct_lookup(fqdn).await?,
    };

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for ip in answer {
        let bucket = if ip.is_ipv4() { &mut v4 } else { &mut v6 };
        if !bucket.contains(&ip) {
            bucket.push(ip);
        }
    }

    let ips = if v4.is_empty() { v6 } else { v4 };
    if ips.is_empty() {
        return Err(IpsError::NoAddresses(fqdn.to_owned()));
    }

    tracing::debug!(fqdn, count = ips.len(), ?mode, "resolved target addresses");
    Ok(ips)
}

async fn system_lookup(fqdn: &str) -> Result<Vec<IpAddr>, IpsError> {
    let answer = tokio::net::lookup_host((fqdn, 0))
        .await
        .map_err(|source| IpsError::Lookup {
            fqdn: fqdn.to_owned(),
            source,
        })?;
    Ok(answer.map(|addr| addr.ip()).collect())
}

async fn direct_lookup(fqdn: &str) -> Result<Vec<IpAddr>, IpsError> {
    let dns_error = |source: ResolveError| IpsError::Dns {
        fqdn: fqdn.to_owned(),
        source: Box::new(source),
    };
    let mut builder = TokioResolver::builder_tokio().map_err(dns_error)?;
    builder.options_mut().cache_size = 0;
    let resolver = builder.build();

    match resolver.lookup_ip(fqdn).await {
        Ok(lookup) => Ok(lookup.iter().collect()),
        Err(e) if e.is_nx_domain() => Err(IpsError::NxDomain(fqdn.to_owned())),
        Err(e) if e.is_no_records_found() => Err(IpsError::NoAddresses(fqdn.to_owned())),
        Err(e) => Err(dns_error(e)),
    }
}

/// One cached resolver answer
#[derive(Debug)]
struct Snapshot {
    addresses: Vec<IpAddr>,
    resolved_at: Instant,
}

/// Round-robin cache of the node addresses behind one FQDN.
///
/// Reads never block: the address list is an immutable snapshot swapped as a
/// whole on refresh, the round-robin cursor is an atomic counter.
#[derive(Debug)]
pub struct Circle {
    fqdn: String,
    port: u16,
    /// Pinned circles never hit DNS
    pinned: bool,
    mode: QueryMode,
    snapshot: ArcSwap<Snapshot>,
    cursor: AtomicUsize,
}

impl Circle {
    /// Resolve `fqdn` and build the address cache.
    ///
    /// # Errors
    /// Returns an error if the name cannot be resolved.
    pub async fn resolve(fqdn: impl Into<String>, port: u16) -> Result<Self, IpsError> {
        Self::resolve_with(fqdn, port, QueryMode::System).await
    }

    /// [`resolve`](Self::resolve) with `mode` used for this and every later
    /// refresh.
    ///
    /// # Errors
    /// Returns an error if the name cannot be resolved.
    pub async fn resolve_with(
        fqdn: impl Into<String>,
        port: u16,
        mode: QueryMode,
    ) -> Result<Self, IpsError> {
        let fqdn = fqdn.into();
        let addresses = query_with(&fqdn, mode).await?;
        let mut circle = Self::with_snapshot(fqdn, port, false, addresses);
        circle.mode = mode;
        Ok(circle)
    }

    /// Build a circle over a fixed address list, bypassing DNS.
    ///
    /// # Errors
    /// Returns [`IpsError::NoAddresses`] if `addresses` is empty.
    pub fn from_addresses(
        fqdn: impl Into<String>,
        port: u16,
        addresses: Vec<IpAddr>,
    ) -> Result<Self, IpsError> {
        let fqdn = fqdn.into();
        if addresses.is_empty() {
            return Err(IpsError::NoAddresses(fqdn));
        }
        Ok(Self::with_snapshot(fqdn, port, true, addresses))
    }

    fn with_snapshot(fqdn: String, port: u16, pinned: bool, addresses: Vec<IpAddr>) -> Self {
        Self {
            fqdn,
            port,
            pinned,
            mode: QueryMode::System,
            snapshot: ArcSwap::from_pointee(Snapshot {
                addresses,
                resolved_at: Instant::now(),
            }),
            cursor: AtomicUsize::new(0),
        }
    }

    /// The name this circle resolves
    #[must_use]
    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Port the target listens on
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// True if the addresses were given explicitly instead of resolved
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    #[must_use]
    pub fn query_mode(&self) -> QueryMode {
        self.mode
    }

    /// Currently cached addresses
    #[must_use]
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.snapshot.load().addresses.clone()
    }

    /// Next address in round-robin order
    #[must_use]
    pub fn next_address(&self) -> IpAddr {
        let snapshot = self.snapshot.load();
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.addresses.len();
        snapshot.addresses[idx]
    }

    /// All cached addresses, starting at the next round-robin position.
    ///
    /// Advances the cursor by one, so consecutive calls start at consecutive
    /// nodes while every call still lists every node for failover.
    #[must_use]
    pub fn rotation(&self) -> Vec<IpAddr> {
        let snapshot = self.snapshot.load();
        let len = snapshot.addresses.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        snapshot
            .addresses
            .iter()
            .cycle()
            .skip(start)
            .take(len)
            .copied()
            .collect()
    }

    /// Force a fresh lookup and replace the cache.
    ///
    /// On failure the previous addresses stay in place.
    ///
    /// # Errors
    /// Returns the resolver error; pinned circles never fail.
    pub async fn refresh(&self) -> Result<(), IpsError> {
        if self.pinned {
            return Ok(());
        }
        let addresses = query_with(&self.fqdn, self.mode).await?;
        tracing::debug!(fqdn = %self.fqdn, ?addresses, "refreshed address cache");
        self.snapshot.store(Arc::new(Snapshot {
            addresses,
            resolved_at: Instant::now(),
        }));
        Ok(())
    }

    /// Refresh the cache if it is older than `ttl`.
    ///
    /// A failed refresh is logged and the stale addresses are kept: a node
    /// list that may be outdated is more useful than none.
    pub async fn refresh_if_older(&self, ttl: Duration) {
        if self.pinned || self.snapshot.load().resolved_at.elapsed() < ttl {
            return;
        }
        if let Err(e) = self.refresh().await {
            tracing::warn!(fqdn = %self.fqdn, error = %e, "address refresh failed; keeping cached addresses");
        }
    }
}

/// hyper DNS resolver backed by a [`Circle`].
///
/// Names other than the circle's FQDN (for example after a redirect) fall back
/// to the system resolver.
#[derive(Debug, Clone)]
pub struct CircleResolver {
    circle: Arc<Circle>,
    refresh_after: Option<Duration>,
}

impl CircleResolver {
    #[must_use]
    pub fn new(circle: Arc<Circle>, refresh_after: Option<Duration>) -> Self {
        Self {
            circle,
            refresh_after,
        }
    }
}

type ResolveFuture =
    Pin<Box<dyn Future<Output = Result<std::vec::IntoIter<SocketAddr>, std::io::Error>> + Send>>;

impl tower::Service<Name> for CircleResolver {
    type Response = std::vec::IntoIter<SocketAddr>;
    type Error = std::io::Error;
    type Future = ResolveFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, name: Name) -> Self::Future {
        let circle = Arc::clone(&self.circle);
        let refresh_after = self.refresh_after;
        Box::pin(async move {
            if !name.as_str().eq_ignore_ascii_case(circle.fqdn()) {
                let ips = query_with(name.as_str(), circle.query_mode())
                    .await
                    .map_err(std::io::Error::other)?;
                return Ok(to_socket_addrs(ips).into_iter());
            }
            if let Some(ttl) = refresh_after {
                circle.refresh_if_older(ttl).await;
            }
            // Port 0 lets the connector fill in the port from the request URI
            Ok(to_socket_addrs(circle.rotation()).into_iter())
        })
    }
}

fn to_socket_addrs(ips: Vec<IpAddr>) -> Vec<SocketAddr> {
    ips.into_iter().map(|ip| SocketAddr::new(ip, 0)).collect()
}
