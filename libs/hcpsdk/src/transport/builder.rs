use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::buffer::Buffer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

use super::BufferedService;
use super::config::{ConnectionConfig, TransportSecurity};
use super::layers::{AuthLayer, RetryLayer, UserAgentLayer};
use super::response::ResponseBody;
use super::tls;
use crate::auth::Authorization;
use crate::error::HcpError;
use crate::ips::{Circle, CircleResolver};

type InnerService =
    BoxCloneService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HcpError>;

type Connector = HttpsConnector<HttpConnector<CircleResolver>>;

/// Assemble the middleware stack for one target.
///
/// Request flow, outer to inner:
/// `Buffer -> LoadShed/ConcurrencyLimit -> Retry -> Auth -> error mapping ->
/// Timeout -> UserAgent -> Decompression -> hyper client`.
///
/// Auth sits inside the retry loop so every attempt carries credentials. The
/// hyper client resolves the target name through the [`Circle`], which keeps
/// SNI and `Host` on the FQDN while connections go to the node addresses.
pub(crate) fn build_service(
    config: &ConnectionConfig,
    circle: Arc<Circle>,
    dns_refresh: Option<Duration>,
    authorization: Arc<dyn Authorization>,
) -> Result<BufferedService, HcpError> {
    if config.transport == TransportSecurity::AllowInsecureHttp {
        tracing::warn!(
            fqdn = circle.fqdn(),
            "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
             use only for testing with mock servers"
        );
    }

    let timeout = config.request_timeout;
    let connector = build_connector(config, CircleResolver::new(circle, dns_refresh))?;

    let mut client_builder = Client::builder(TokioExecutor::new());
    // The pool timer drives pool_idle_timeout
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .http2_only(false);
    if let Some(idle) = config.pool_idle_timeout {
        client_builder.pool_idle_timeout(idle);
    }
    let hyper_client = client_builder.build::<_, Full<Bytes>>(connector);

    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(UserAgentLayer::try_new(&config.user_agent)?)
        .layer(DecompressionLayer::new())
        .service(hyper_client)
        .map_response(box_response_body)
        .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

    let mut service: InnerService = ServiceBuilder::new()
        .layer(AuthLayer::new(authorization))
        .service(service)
        .boxed_clone();

    if let Some(retry) = &config.retry {
        service = ServiceBuilder::new()
            .layer(RetryLayer::new(retry.clone(), config.total_timeout))
            .service(service)
            .boxed_clone();
    }

    if let Some(limit) = config.max_concurrent_requests {
        service = ServiceBuilder::new()
            .layer(LoadShedLayer::new())
            .layer(ConcurrencyLimitLayer::new(limit.max(1)))
            .service(service)
            .map_err(map_load_shed_error)
            .boxed_clone();
    }

    Ok(Buffer::new(service, config.buffer_capacity.max(1)))
}

fn build_connector(config: &ConnectionConfig, resolver: CircleResolver) -> Result<Connector, HcpError> {
    let mut http = HttpConnector::new_with_resolver(resolver);
    // The TLS wrapper decides which schemes are accepted
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));
    http.set_nodelay(true);

    let builder = match tls::client_config(&config.tls)? {
        Some(client_config) => hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config),
        None => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::crypto_provider())
            .map_err(|e| HcpError::Tls(Box::new(e)))?,
    };

    let connector = if config.transport == TransportSecurity::AllowInsecureHttp {
        builder
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http)
    } else {
        builder.https_only().enable_all_versions().wrap_connector(http)
    };
    Ok(connector)
}

/// Keep typed errors that were boxed by tower, turn timeouts into
/// [`HcpError::Timeout`] and everything else into a transport error
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HcpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HcpError::Timeout(timeout);
    }
    match err.downcast::<HcpError>() {
        Ok(e) => *e,
        Err(other) => HcpError::Transport(other),
    }
}

fn map_load_shed_error(err: tower::BoxError) -> HcpError {
    if err.is::<tower::load_shed::error::Overloaded>() {
        return HcpError::Overloaded;
    }
    match err.downcast::<HcpError>() {
        Ok(e) => *e,
        Err(other) => HcpError::Transport(other),
    }
}

fn box_response_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::auth::DummyAuthorization;
    use std::net::{IpAddr, Ipv4Addr};

    fn circle() -> Arc<Circle> {
        Arc::new(
            Circle::from_addresses(
                "ns1.tenant1.hcp.example.com",
                443,
                vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_build_default_stack() {
        let result = build_service(
            &ConnectionConfig::default(),
            circle(),
            None,
            Arc::new(DummyAuthorization),
        );
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_user_agent() {
        let config = ConnectionConfig {
            user_agent: "bad\nagent".to_owned(),
            ..ConnectionConfig::for_testing()
        };
        let result = build_service(&config, circle(), None, Arc::new(DummyAuthorization));
        assert!(matches!(result, Err(HcpError::InvalidHeaderValue(_))));
    }

    /// WARN messages emitted while `f` runs
    fn captured_warnings(f: impl FnOnce()) -> Vec<String> {
        use std::sync::Mutex;
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<String>>>);

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
            fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
                if *event.metadata().level() == tracing::Level::WARN {
                    let mut visitor = MessageVisitor(String::new());
                    event.record(&mut visitor);
                    self.0.lock().unwrap().push(visitor.0);
                }
            }
        }

        struct MessageVisitor(String);
        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let capture = Capture::default();
        let warnings = Arc::clone(&capture.0);
        tracing::subscriber::with_default(tracing_subscriber::registry().with(capture), f);
        let captured = warnings.lock().unwrap().clone();
        captured
    }

    #[tokio::test]
    async fn test_insecure_http_warning_emitted() {
        let warnings = captured_warnings(|| {
            let _service = build_service(
                &ConnectionConfig::for_testing(),
                circle(),
                None,
                Arc::new(DummyAuthorization),
            );
        });
        assert!(
            warnings.iter().any(|w| w.contains("insecure HTTP")),
            "{warnings:?}"
        );
    }

    #[tokio::test]
    async fn test_tls_only_no_warning() {
        let warnings = captured_warnings(|| {
            let _service = build_service(
                &ConnectionConfig::default(),
                circle(),
                None,
                Arc::new(DummyAuthorization),
            );
        });
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_map_tower_error_timeout() {
        let err: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        let mapped = map_tower_error(err, Duration::from_secs(3));
        assert!(matches!(mapped, HcpError::Timeout(d) if d == Duration::from_secs(3)));
    }

    #[test]
    fn test_map_tower_error_keeps_typed_errors() {
        let err: tower::BoxError = Box::new(HcpError::Overloaded);
        assert!(matches!(
            map_tower_error(err, Duration::ZERO),
            HcpError::Overloaded
        ));
    }

    #[test]
    fn test_map_load_shed_error() {
        let err: tower::BoxError = Box::new(tower::load_shed::error::Overloaded::new());
        assert!(matches!(map_load_shed_error(err), HcpError::Overloaded));
    }
}
