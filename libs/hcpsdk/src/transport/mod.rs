//! HTTP(S) transport to HCP nodes: hyper client, rustls, and the tower
//! middleware stack (timeouts, retries, credentials, concurrency limits).

mod builder;
pub mod config;
pub mod layers;
pub mod response;
pub mod tls;

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use tower::Service;
use tower::buffer::Buffer;

use crate::error::HcpError;
use response::ResponseBody;

pub(crate) use builder::build_service;

pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HcpError>> + Send>>;

/// The shared, cloneable front of the stack
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Unwrap errors coming out of the buffer.
///
/// Anything that is not an [`HcpError`] means the buffer worker is gone.
pub(crate) fn map_buffer_error(err: tower::BoxError) -> HcpError {
    match err.downcast::<HcpError>() {
        Ok(e) => *e,
        Err(err) => {
            tracing::error!(error = %err, "buffer worker closed unexpectedly; service unavailable");
            HcpError::ServiceClosed
        }
    }
}

/// Reserve a buffer slot without waiting: a full buffer is
/// [`HcpError::Overloaded`]
pub(crate) async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HcpError> {
    let ready = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match ready {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HcpError::Overloaded),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_map_buffer_error_unwraps_hcp_error() {
        let err: tower::BoxError = Box::new(HcpError::LogsNotReady);
        assert!(matches!(map_buffer_error(err), HcpError::LogsNotReady));
    }

    #[test]
    fn test_map_buffer_error_closed() {
        let err: tower::BoxError = "worker gone".into();
        assert!(matches!(map_buffer_error(err), HcpError::ServiceClosed));
    }
}
