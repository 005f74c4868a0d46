use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use rand::Rng;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

use crate::error::HcpError;
use crate::transport::config::{ExponentialBackoff, RetryConfig, RetryTrigger};
use crate::transport::response::{ResponseBody, parse_retry_after};

/// Retry number (1-based) sent along with every repeated request
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Retries failed attempts with exponential backoff.
///
/// `total_timeout` bounds the whole exchange, backoff sleeps included.
#[derive(Clone)]
pub struct RetryLayer {
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig, total_timeout: Option<Duration>) -> Self {
        Self {
            config,
            total_timeout,
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: Arc::new(self.config.clone()),
            total_timeout: self.total_timeout,
        }
    }
}

/// Service half of [`RetryLayer`].
///
/// A response whose status is a retry trigger is drained (up to the drain
/// limit, so the connection returns to the pool) and the request is sent
/// again. When retries are exhausted the last response is returned as `Ok`,
/// whatever its status; only transport errors and timeouts surface as `Err`.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: Arc<RetryConfig>,
    total_timeout: Option<Duration>,
}

/// Outcome of one attempt as seen by the retry loop
enum Verdict {
    Done(Result<Response<ResponseBody>, HcpError>),
    Retry {
        trigger: RetryTrigger,
        retry_after: Option<Duration>,
    },
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HcpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = Response<ResponseBody>;
    type Error = HcpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Keep the service that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);
        let total_timeout = self.total_timeout;

        let (parts, body) = req.into_parts();

        Box::pin(async move {
            let deadline = total_timeout.map(|t| (Instant::now() + t, t));
            let host = parts
                .uri
                .authority()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string);

            let mut attempt = 0usize;
            loop {
                if let Some((at, limit)) = deadline
                    && Instant::now() >= at
                {
                    return Err(HcpError::DeadlineExceeded(limit));
                }

                let mut req = Request::from_parts(parts.clone(), body.clone());
                if attempt > 0
                    && let Ok(value) = HeaderValue::try_from(attempt.to_string())
                {
                    req.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
                }

                let mut svc = inner.clone();
                svc.ready().await?;
                let result = svc.call(req).await;

                let may_retry = attempt < config.max_retries;
                let verdict = match result {
                    Ok(resp) => {
                        let trigger = RetryTrigger::Status(resp.status().as_u16());
                        if may_retry && config.should_retry(trigger, &parts.method) {
                            let retry_after = parse_retry_after(resp.headers())
                                .filter(|_| !config.ignore_retry_after);
                            drain(resp, config.retry_response_drain_limit).await;
                            Verdict::Retry {
                                trigger,
                                retry_after,
                            }
                        } else {
                            Verdict::Done(Ok(resp))
                        }
                    }
                    Err(err) => {
                        let trigger = trigger_for(&err);
                        if may_retry && config.should_retry(trigger, &parts.method) {
                            tracing::debug!(error = %err, "attempt failed");
                            Verdict::Retry {
                                trigger,
                                retry_after: None,
                            }
                        } else {
                            Verdict::Done(Err(err))
                        }
                    }
                };

                let (trigger, retry_after) = match verdict {
                    Verdict::Done(result) => return result,
                    Verdict::Retry {
                        trigger,
                        retry_after,
                    } => (trigger, retry_after),
                };

                let mut delay = retry_after.unwrap_or_else(|| backoff_for(&config.backoff, attempt));
                if let Some((at, limit)) = deadline {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(HcpError::DeadlineExceeded(limit));
                    }
                    delay = delay.min(remaining);
                }

                tracing::debug!(
                    retry = attempt + 1,
                    max_retries = config.max_retries,
                    trigger = ?trigger,
                    method = %parts.method,
                    host = %host,
                    backoff_ms = delay.as_millis(),
                    retry_after_used = retry_after.is_some(),
                    "retrying HCP request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

/// Read and discard up to `limit` bytes so HTTP/1.1 can reuse the connection
async fn drain(response: Response<ResponseBody>, limit: usize) {
    let declared = response
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        tracing::trace!(content_length = ?declared, limit, "skipping drain of large body");
        return;
    }

    let mut body = std::pin::pin!(response.into_body());
    let mut drained = 0usize;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                drained += frame.data_ref().map_or(0, Bytes::len);
                if drained >= limit {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "drain failed; connection will not be reused");
                break;
            }
        }
    }
}

fn trigger_for(err: &HcpError) -> RetryTrigger {
    match err {
        HcpError::Transport(_) => RetryTrigger::TransportError,
        HcpError::Timeout(_) => RetryTrigger::Timeout,
        _ => RetryTrigger::NonRetryable,
    }
}

/// Backoff before retry number `attempt + 1`, with up to 25% jitter, never
/// above `backoff.max`
pub fn backoff_for(backoff: &ExponentialBackoff, attempt: usize) -> Duration {
    let base = backoff.delay(attempt);
    if !backoff.jitter {
        return base;
    }
    let factor = rand::rng().random_range(0.0..=0.25);
    (base + base.mul_f64(factor)).min(backoff.max)
}
