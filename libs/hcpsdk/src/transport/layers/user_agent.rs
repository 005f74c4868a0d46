use std::task::{Context, Poll};

use http::{HeaderValue, Request};
use tower::{Layer, Service};

use crate::error::HcpError;

/// Sets `User-Agent` on requests that do not carry one
#[derive(Clone)]
pub struct UserAgentLayer {
    user_agent: HeaderValue,
}

impl UserAgentLayer {
    /// # Errors
    /// [`HcpError::InvalidHeaderValue`] if `user_agent` is not a valid header value
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, HcpError> {
        Ok(Self {
            user_agent: HeaderValue::from_str(user_agent.as_ref())?,
        })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UserAgentService<S> {
    inner: S,
    user_agent: HeaderValue,
}

impl<S, B> Service<Request<B>> for UserAgentService<S>
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
        req.headers_mut()
            .entry(http::header::USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tower::ServiceExt;
    use tower::service_fn;

    async fn echo_ua(req: Request<()>) -> Result<Option<HeaderValue>, std::convert::Infallible> {
        Ok(req.headers().get(http::header::USER_AGENT).cloned())
    }

    #[tokio::test]
    async fn test_user_agent_added() {
        let svc = UserAgentLayer::try_new("hcpsdk/test").unwrap().layer(service_fn(echo_ua));
        let ua = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(ua, Some(HeaderValue::from_static("hcpsdk/test")));
    }

    #[tokio::test]
    async fn test_user_agent_not_overwritten() {
        let svc = UserAgentLayer::try_new("hcpsdk/test").unwrap().layer(service_fn(echo_ua));
        let req = Request::builder()
            .header(http::header::USER_AGENT, "hcp-cli/1.0")
            .body(())
            .unwrap();
        let ua = svc.oneshot(req).await.unwrap();
        assert_eq!(ua, Some(HeaderValue::from_static("hcp-cli/1.0")));
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        assert!(UserAgentLayer::try_new("bad\x00agent").is_err());
    }
}
