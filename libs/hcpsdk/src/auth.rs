//! Credentials attached to HCP requests.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::HeaderValue;
use http::header::{AUTHORIZATION, HeaderName};
use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};

use crate::error::HcpError;

/// Source of the headers that authenticate a request.
///
/// Implementations compute their header values up front; `headers()` runs on
/// every attempt, retries included.
pub trait Authorization: Send + Sync + fmt::Debug {
    /// Headers to add to each request
    fn headers(&self) -> Vec<(HeaderName, HeaderValue)>;
}

fn sensitive(value: &str) -> Result<HeaderValue, HcpError> {
    let mut value = HeaderValue::from_str(value)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Local HCP user: `Authorization: HCP <base64(user)>:<md5hex(password)>`
pub struct NativeAuthorization {
    user: String,
    header: HeaderValue,
}

impl NativeAuthorization {
    /// # Errors
    /// Fails if the token is not a valid header value, which cannot happen for
    /// base64/hex output but is checked nonetheless.
    pub fn new(user: impl Into<String>, password: &SecretString) -> Result<Self, HcpError> {
        let user = user.into();
        let token = format!(
            "HCP {}:{}",
            STANDARD.encode(user.as_bytes()),
            hex::encode(Md5::digest(password.expose_secret().as_bytes()))
        );
        Ok(Self {
            header: sensitive(&token)?,
            user,
        })
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Debug for NativeAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAuthorization")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl Authorization for NativeAuthorization {
    fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        vec![(AUTHORIZATION, self.header.clone())]
    }
}

/// Active Directory user: `Authorization: AD <user>:<password>`.
///
/// The password travels in clear text inside the TLS session.
pub struct NativeAdAuthorization {
    user: String,
    header: HeaderValue,
}

impl NativeAdAuthorization {
    /// # Errors
    /// [`HcpError::InvalidHeaderValue`] if user or password contain characters
    /// not allowed in a header.
    pub fn new(user: impl Into<String>, password: &SecretString) -> Result<Self, HcpError> {
        let user = user.into();
        let token = format!("AD {user}:{}", password.expose_secret());
        Ok(Self {
            header: sensitive(&token)?,
            user,
        })
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Debug for NativeAdAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAdAuthorization")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl Authorization for NativeAdAuthorization {
    fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        vec![(AUTHORIZATION, self.header.clone())]
    }
}

/// Anonymous access, for namespaces that allow it
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyAuthorization;

impl Authorization for DummyAuthorization {
    fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        Vec::new()
    }
}
