use std::sync::Arc;
use std::task::{Context, Poll};

use http::Request;
use tower::{Layer, Service};

use crate::auth::Authorization;

/// Adds the target's credentials to every attempt.
///
/// Sits inside the retry loop, so each retried attempt is authenticated
/// afresh. Headers already set by the caller win.
#[derive(Clone)]
pub struct AuthLayer {
    authorization: Arc<dyn Authorization>,
}

impl AuthLayer {
    #[must_use]
    pub fn new(authorization: Arc<dyn Authorization>) -> Self {
        Self { authorization }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authorization: Arc::clone(&self.authorization),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authorization: Arc<dyn Authorization>,
}

impl<S, B> Service<Request<B>> for AuthService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let headers = req.headers_mut();
        for (name, value) in self.authorization.headers() {
            headers.entry(name).or_insert(value);
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::auth::{DummyAuthorization, NativeAuthorization};
    use http::HeaderValue;
    use secrecy::SecretString;
    use tower::ServiceExt;
    use tower::service_fn;

    async fn echo_auth(req: Request<()>) -> Result<Option<HeaderValue>, std::convert::Infallible> {
        Ok(req.headers().get(http::header::AUTHORIZATION).cloned())
    }

    #[tokio::test]
    async fn test_native_header_attached() {
        let auth = NativeAuthorization::new("n", &SecretString::from("n01".to_owned())).unwrap();
        let svc = AuthLayer::new(Arc::new(auth)).layer(service_fn(echo_auth));

        let value = svc.oneshot(Request::new(())).await.unwrap().unwrap();
        assert!(value.to_str().unwrap().starts_with("HCP bg==:"));
    }

    #[tokio::test]
    async fn test_dummy_leaves_request_alone() {
        let svc = AuthLayer::new(Arc::new(DummyAuthorization)).layer(service_fn(echo_auth));
        assert_eq!(svc.oneshot(Request::new(())).await.unwrap(), None);
    }
}
