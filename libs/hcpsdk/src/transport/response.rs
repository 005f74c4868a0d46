use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body::Frame;
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::HcpError;

/// Header in which HCP explains why a request failed
pub const HCP_ERROR_MESSAGE_HEADER: &str = "x-hcp-errormessage";

/// Bytes of a failed response kept for the error message
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Decompressed, type-erased response body
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Parse a `Retry-After` header, either delta-seconds or an HTTP-date.
///
/// Negative values, dates in the past and unparsable values yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}

/// Value of the `X-HCP-ErrorMessage` header, if present and printable
pub fn hcp_error_message(headers: &HeaderMap) -> Option<String> {
    headers
        .get(HCP_ERROR_MESSAGE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

pin_project! {
    /// Streaming body that fails with [`HcpError::BodyTooLarge`] once more than
    /// `limit` bytes have been read.
    pub struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    #[must_use]
    pub fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl http_body::Body for LimitedBody {
    type Data = Bytes;
    type Error = HcpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HcpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(HcpError::Transport(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Response from an HCP node.
///
/// `send()` hands back every HTTP status as `Ok`; the `checked_*` readers,
/// [`json`](Self::json), [`text`](Self::text) and
/// [`error_for_status`](Self::error_for_status) turn non-2xx statuses into
/// errors. 401 and 403 become [`HcpError::Authentication`].
#[derive(Debug)]
pub struct HcpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
    pub(crate) service_time: Duration,
}

impl HcpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Canonical reason phrase of the status, empty for unknown codes
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.inner.status().canonical_reason().unwrap_or_default()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Header value as a string, `None` if missing or not visible ASCII
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// HCP's explanation of a failed request
    #[must_use]
    pub fn hcp_error_message(&self) -> Option<String> {
        hcp_error_message(self.inner.headers())
    }

    /// Time from sending the request (including retries) until the response
    /// headers arrived
    #[must_use]
    pub fn service_time(&self) -> Duration {
        self.service_time
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// Fail on non-2xx without reading the body.
    ///
    /// # Errors
    /// [`HcpError::Authentication`] for 401/403, [`HcpError::HttpStatus`] for
    /// any other non-2xx status.
    pub fn error_for_status(self) -> Result<Self, HcpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }
        Err(status_error(
            self.inner.status(),
            self.inner.headers(),
            String::new(),
        ))
    }

    /// Fail unless the status is exactly `expected` (HCP answers a
    /// successful PUT with 201, MAPI with 200).
    ///
    /// # Errors
    /// As [`error_for_status`](Self::error_for_status); an unexpected 2xx
    /// becomes [`HcpError::HttpStatus`].
    pub fn expect_status(self, expected: StatusCode) -> Result<Self, HcpError> {
        if self.inner.status() == expected {
            return Ok(self);
        }
        Err(status_error(
            self.inner.status(),
            self.inner.headers(),
            String::new(),
        ))
    }

    /// Read the body, whatever the status.
    ///
    /// # Errors
    /// [`HcpError::BodyTooLarge`] past `max_body_size`, transport errors.
    pub async fn bytes(self) -> Result<Bytes, HcpError> {
        read_body_limited(self.inner, self.max_body_size).await
    }

    /// Read the body of a 2xx response.
    ///
    /// # Errors
    /// Status errors carry up to 8 KiB of the body as preview.
    pub async fn checked_bytes(self) -> Result<Bytes, HcpError> {
        checked_body(self.inner, self.max_body_size).await
    }

    /// Parse the body of a 2xx response as JSON.
    ///
    /// # Errors
    /// As [`checked_bytes`](Self::checked_bytes), plus [`HcpError::Json`].
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HcpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Parse the body of a 2xx response as an XML document.
    ///
    /// # Errors
    /// As [`checked_bytes`](Self::checked_bytes), plus [`HcpError::Xml`].
    pub async fn xml(self) -> Result<crate::xml::Element, HcpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        crate::xml::parse(&body)
    }

    /// Body of a 2xx response as text, invalid UTF-8 replaced.
    ///
    /// # Errors
    /// As [`checked_bytes`](Self::checked_bytes).
    pub async fn text(self) -> Result<String, HcpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// The raw body stream. Neither the status nor `max_body_size` is checked.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }

    /// Body stream bounded by `max_body_size`
    #[must_use]
    pub fn into_limited_body(self) -> LimitedBody {
        LimitedBody::new(self.inner.into_body(), self.max_body_size)
    }

    /// Stream the body into `writer` chunk by chunk; `max_body_size` does not
    /// apply. `progress` gets the running byte count after every chunk.
    ///
    /// # Errors
    /// [`HcpError::Transport`] while reading, [`HcpError::Io`] while writing.
    pub async fn copy_to<W, F>(self, writer: &mut W, mut progress: F) -> Result<u64, HcpError>
    where
        W: AsyncWrite + Unpin + ?Sized,
        F: FnMut(u64),
    {
        let mut body = self.inner.into_body();
        let mut total: u64 = 0;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(HcpError::Transport)?;
            if let Some(chunk) = frame.data_ref() {
                writer.write_all(chunk).await?;
                total += chunk.len() as u64;
                progress(total);
            }
        }
        writer.flush().await?;
        Ok(total)
    }
}

/// Map a non-2xx status to the matching error
pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap, body_preview: String) -> HcpError {
    let hcp_error_message = hcp_error_message(headers);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return HcpError::Authentication {
            status,
            hcp_error_message,
        };
    }
    HcpError::HttpStatus {
        status,
        hcp_error_message,
        body_preview,
        retry_after: parse_retry_after(headers),
    }
}

async fn checked_body(response: Response<ResponseBody>, max_body_size: usize) -> Result<Bytes, HcpError> {
    let status = response.status();
    if status.is_success() {
        return read_body_limited(response, max_body_size).await;
    }

    let headers = response.headers().clone();
    let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
    let body_preview = match read_body_limited(response, preview_limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(HcpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
        Err(e) => return Err(e),
    };
    Err(status_error(status, &headers, body_preview))
}

pub(crate) async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HcpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HcpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HcpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn response(status: u16, headers: &[(&str, &str)], body: &'static [u8]) -> HcpResponse {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = Full::new(Bytes::from_static(body))
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed();
        HcpResponse {
            inner: builder.body(body).unwrap(),
            max_body_size: 16,
            service_time: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, " 120 ".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_retry_after_rejects_negative_and_past() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "-5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(
            http::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_parse_retry_after_future_date() {
        let mut headers = HeaderMap::new();
        let date = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(60));
        headers.insert(http::header::RETRY_AFTER, date.parse().unwrap());

        let secs = parse_retry_after(&headers).unwrap().as_secs();
        assert!((58..=60).contains(&secs));
    }

    #[test]
    fn test_accessors() {
        let resp = response(
            409,
            &[("X-HCP-ErrorMessage", "Object already exists")],
            b"",
        );
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(resp.reason(), "Conflict");
        assert_eq!(resp.header("x-hcp-errormessage"), Some("Object already exists"));
        assert_eq!(resp.hcp_error_message().as_deref(), Some("Object already exists"));
        assert_eq!(resp.service_time(), Duration::from_millis(5));
    }

    #[test]
    fn test_error_for_status_maps_auth_failures() {
        let err = response(403, &[], b"").error_for_status().unwrap_err();
        assert!(matches!(
            err,
            HcpError::Authentication {
                status: StatusCode::FORBIDDEN,
                ..
            }
        ));

        let err = response(401, &[], b"").error_for_status().unwrap_err();
        assert!(matches!(err, HcpError::Authentication { .. }));
    }

    #[test]
    fn test_error_for_status_keeps_hcp_message() {
        let err = response(409, &[("X-HCP-ErrorMessage", "exists")], b"")
            .error_for_status()
            .unwrap_err();
        match err {
            HcpError::HttpStatus {
                status,
                hcp_error_message,
                ..
            } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(hcp_error_message.as_deref(), Some("exists"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_expect_status() {
        assert!(response(201, &[], b"").expect_status(StatusCode::CREATED).is_ok());

        let err = response(200, &[], b"").expect_status(StatusCode::CREATED).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_xml_parses_success_body() {
        let root = response(200, &[], b"<proc a=\"1\"/>").xml().await.unwrap();
        assert_eq!(root.name, "proc");
        assert_eq!(root.attr("a"), Some("1"));
    }

    #[tokio::test]
    async fn test_checked_bytes_includes_preview() {
        let err = response(500, &[], b"boom").checked_bytes().await.unwrap_err();
        match err {
            HcpError::HttpStatus { body_preview, .. } => assert_eq!(body_preview, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bytes_enforces_limit() {
        let err = response(200, &[], b"0123456789abcdefXYZ")
            .bytes()
            .await
            .unwrap_err();
        assert!(matches!(err, HcpError::BodyTooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn test_limited_body_counts_bytes() {
        let mut body = response(200, &[], b"0123456789").into_limited_body();
        let mut total = 0;
        while let Some(frame) = body.frame().await {
            if let Some(data) = frame.unwrap().data_ref() {
                total += data.len();
            }
        }
        assert_eq!(total, 10);
        assert_eq!(body.bytes_read(), 10);
    }

    #[tokio::test]
    async fn test_copy_to_ignores_body_limit() {
        let mut out = Vec::new();
        let mut reported = Vec::new();
        let total = response(200, &[], b"0123456789abcdefXYZ")
            .copy_to(&mut out, |n| reported.push(n))
            .await
            .unwrap();
        assert_eq!(total, 19);
        assert_eq!(out, b"0123456789abcdefXYZ");
        assert_eq!(reported.last(), Some(&19));
    }
}
