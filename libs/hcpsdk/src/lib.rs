#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Client SDK for the Hitachi Content Platform (HCP)
//!
//! The crate covers:
//! - Name resolution of HCP targets into a round-robin ring of node addresses
//! - HCP native and Active Directory authorization
//! - A pooled, TLS-first HTTP transport with timeouts, retries and
//!   concurrency limits
//! - Namespace information (`/proc`), object and directory access (`/rest`)
//! - UUID based path generation for large object populations
//! - The management API (MAPI): log download, replication links, tenants
//!
//! # Example
//!
//! ```ignore
//! use hcpsdk::{NativeAuthorization, Target};
//! use hcpsdk::namespace::NamespaceInfo;
//! use secrecy::SecretString;
//!
//! let auth = NativeAuthorization::new("user", &SecretString::from("secret".to_owned()))?;
//! let target = Target::builder("ns1.tenant1.hcp.example.com")
//!     .authorization(auth)
//!     .build()
//!     .await?;
//!
//! let stats = NamespaceInfo::new(target.connection()?).statistics().await?;
//! println!("{stats:?}");
//! ```

pub mod auth;
pub mod connection;
pub mod error;
pub mod ips;
pub mod mapi;
pub mod namespace;
pub mod objects;
pub mod pathbuilder;
pub mod target;
pub mod transport;
pub mod xml;

pub use auth::{Authorization, DummyAuthorization, NativeAdAuthorization, NativeAuthorization};
pub use connection::{Connection, RequestBuilder};
pub use error::{HcpError, InvalidUriKind};
pub use ips::{Circle, IpsError, QueryMode};
pub use target::{DEFAULT_PORT, MAPI_PORT, Scheme, Target, TargetBuilder};
pub use transport::config::{
    ConnectionConfig, DEFAULT_USER_AGENT, ExponentialBackoff, RetryConfig, RetryTrigger, TlsConfig,
    TransportSecurity,
};
pub use transport::response::HcpResponse;
