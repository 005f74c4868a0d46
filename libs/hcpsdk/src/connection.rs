use std::fmt;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request};
use http_body_util::Full;
use tokio::time::Instant;
use tower::Service;

use crate::error::{HcpError, InvalidUriKind};
use crate::transport::config::TransportSecurity;
use crate::transport::response::HcpResponse;
use crate::transport::{BufferedService, map_buffer_error, try_acquire_buffer_slot};

/// A pooled session with one [`Target`](crate::Target).
///
/// `Connection` is `Clone + Send + Sync`; clones share the middleware stack
/// and the connection pool, so hand clones to as many tasks as needed.
#[derive(Clone)]
pub struct Connection {
    service: BufferedService,
    base_url: String,
    max_body_size: usize,
    transport_security: TransportSecurity,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        service: BufferedService,
        base_url: String,
        max_body_size: usize,
        transport_security: TransportSecurity,
    ) -> Self {
        Self {
            service,
            base_url,
            max_body_size,
            transport_security,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request for `path`, which must begin with `/` and be
    /// percent-encoded already (see [`PathBuilder::object_path`]).
    ///
    /// [`PathBuilder::object_path`]: crate::pathbuilder::PathBuilder::object_path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        RequestBuilder {
            service: self.service.clone(),
            max_body_size: self.max_body_size,
            transport_security: self.transport_security,
            method,
            url: format!("{}{path}", self.base_url),
            query: Vec::new(),
            headers: Vec::new(),
            body: Bytes::new(),
            error: None,
        }
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn head(&self, path: &str) -> RequestBuilder {
        self.request(Method::HEAD, path)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }
}

/// Request under construction.
///
/// Invalid headers are remembered and reported by [`send`](Self::send).
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    transport_security: TransportSecurity,
    method: Method,
    url: String,
    query: Vec<String>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
    error: Option<HcpError>,
}

impl RequestBuilder {
    /// Append `key=value` to the query string, both percent-encoded
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push(format!(
            "{}={}",
            urlencoding::encode(key),
            urlencoding::encode(value)
        ));
        self
    }

    /// Append a bare `key` to the query string (HCP uses `?cancel`, `?suspend`)
    pub fn flag(mut self, key: &str) -> Self {
        self.query.push(urlencoding::encode(key).into_owned());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HcpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HcpError::InvalidHeaderValue(e)),
        }
        self
    }

    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// XML request body with `Content-Type: application/xml`
    pub fn xml(self, body: String) -> Self {
        self.header("content-type", "application/xml").body_bytes(body)
    }

    fn uri(&self) -> Result<http::Uri, HcpError> {
        let url = if self.query.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, self.query.join("&"))
        };

        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| HcpError::InvalidUri {
            url: url.clone(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;
        if uri.authority().is_none() {
            return Err(HcpError::InvalidUri {
                url,
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match (uri.scheme_str(), self.transport_security) {
            (Some("https"), _) | (Some("http"), TransportSecurity::AllowInsecureHttp) => Ok(uri),
            (Some("http"), TransportSecurity::TlsOnly) => Err(HcpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            (Some(scheme), _) => Err(HcpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// are supported".to_owned(),
            }),
            (None, _) => Err(HcpError::InvalidUri {
                url,
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    /// Send the request.
    ///
    /// Every HTTP status is returned as `Ok`; use the response helpers to turn
    /// failures into errors.
    ///
    /// # Errors
    /// Invalid headers or URL, transport failures, timeouts, and
    /// [`HcpError::Overloaded`] when the concurrency limit is reached.
    pub async fn send(mut self) -> Result<HcpResponse, HcpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let uri = self.uri()?;

        let mut builder = Request::builder().method(self.method.clone()).uri(uri);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(Full::new(self.body))?;

        try_acquire_buffer_slot(&mut self.service).await?;

        let started = Instant::now();
        let inner = self.service.call(request).await.map_err(map_buffer_error)?;
        let service_time = started.elapsed();

        tracing::debug!(
            method = %self.method,
            url = %self.url,
            status = inner.status().as_u16(),
            service_time_ms = service_time.as_millis(),
            "HCP request completed"
        );

        Ok(HcpResponse {
            inner,
            max_body_size: self.max_body_size,
            service_time,
        })
    }
}
