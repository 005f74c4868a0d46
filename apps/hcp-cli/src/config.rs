//! Layered configuration: built-in defaults, then the YAML file given with
//! `--config`, then `HCP__*` environment variables, then command-line flags.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use hcpsdk::pathbuilder::DEFAULT_INITIAL_PATH;
use hcpsdk::{ConnectionConfig, DEFAULT_PORT, MAPI_PORT, RetryConfig, TlsConfig};
use secrecy::SecretString;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix of environment overrides; `__` separates nesting levels
/// (`HCP__CREDENTIALS__PASSWORD`)
pub const ENV_PREFIX: &str = "HCP__";

#[derive(Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Data access endpoint: `namespace.tenant.hcp.domain`
    pub namespace: EndpointConfig,
    /// Management endpoint: `admin.hcp.domain` or `tenant.hcp.domain`
    pub admin: EndpointConfig,
    pub credentials: CredentialsConfig,
    pub connection: ConnectionSettings,
    pub paths: PathSettings,
    pub logging: LoggingConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            namespace: EndpointConfig {
                fqdn: None,
                port: DEFAULT_PORT,
            },
            admin: EndpointConfig {
                fqdn: None,
                port: MAPI_PORT,
            },
            credentials: CredentialsConfig::default(),
            connection: ConnectionSettings::default(),
            paths: PathSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub fqdn: Option<String>,
    pub port: u16,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsConfig {
    #[serde(deserialize_with = "text")]
    pub user: Option<String>,
    #[serde(serialize_with = "redact", deserialize_with = "secret")]
    pub password: Option<SecretString>,
    /// Authenticate as an Active Directory user
    pub active_directory: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    #[default]
    Webpki,
    Native,
    /// Requires `connection.ca_file`
    CustomCa,
    /// Accept self-signed node certificates
    AcceptInvalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSettings {
    /// Per-attempt timeout; MAPI commands default to 10 minutes when unset
    #[serde(with = "crate::duration_serde::option")]
    pub request_timeout: Option<Duration>,
    #[serde(with = "crate::duration_serde")]
    pub connect_timeout: Duration,
    pub max_retries: usize,
    pub max_concurrent_requests: usize,
    /// Largest response buffered in memory; object and log downloads stream
    pub max_body_size: usize,
    pub tls: TlsMode,
    pub ca_file: Option<PathBuf>,
    /// Node addresses to use instead of DNS
    pub addresses: Vec<IpAddr>,
    /// Re-resolve the target when the cached answer is older than this
    #[serde(with = "crate::duration_serde::option")]
    pub dns_refresh: Option<Duration>,
    /// Ask the name servers directly on every lookup instead of the system
    /// resolver
    pub bypass_dns_cache: bool,
    /// Plain HTTP, for mock servers
    pub insecure_http: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            request_timeout: None,
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            max_concurrent_requests: 16,
            max_body_size: 10 * 1024 * 1024,
            tls: TlsMode::Webpki,
            ca_file: None,
            addresses: Vec::new(),
            dns_refresh: None,
            bypass_dns_cache: false,
            insecure_http: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Root of generated object paths
    pub initial_path: String,
    /// Store the original file name as an annotation of generated objects
    pub annotation: bool,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            initial_path: DEFAULT_INITIAL_PATH.to_owned(),
            annotation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when neither `-v` nor `RUST_LOG` is given
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            json: false,
        }
    }
}

#[allow(clippy::ref_option)]
fn redact<S: Serializer>(value: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_str("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

/// Accepts numbers and booleans as text: `password: 12345` in YAML and
/// `HCP__CREDENTIALS__PASSWORD=12345678` both arrive typed.
struct Text;

impl<'de> Visitor<'de> for Text {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    deserializer.deserialize_option(Text)
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
    Ok(text(deserializer)?.map(SecretString::from))
}

/// Which endpoint a command talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Namespace,
    Admin,
}

impl CliConfig {
    /// Defaults, then `path` (YAML), then `HCP__*` variables.
    ///
    /// # Errors
    /// Missing config file, invalid YAML or values of the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(CliConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Env values are parsed (`0042` becomes 42), credentials are taken verbatim
        for field in ["user", "password"] {
            let name = format!("{ENV_PREFIX}CREDENTIALS__{}", field.to_ascii_uppercase());
            if let Ok(value) = std::env::var(&name) {
                figment = figment.merge(Serialized::default(&format!("credentials.{field}"), value));
            }
        }
        figment.extract().context("invalid configuration")
    }

    #[must_use]
    pub fn endpoint(&self, endpoint: Endpoint) -> &EndpointConfig {
        match endpoint {
            Endpoint::Namespace => &self.namespace,
            Endpoint::Admin => &self.admin,
        }
    }

    pub fn endpoint_mut(&mut self, endpoint: Endpoint) -> &mut EndpointConfig {
        match endpoint {
            Endpoint::Namespace => &mut self.namespace,
            Endpoint::Admin => &mut self.admin,
        }
    }

    /// Transport settings for `endpoint`; MAPI starts from the long-running
    /// preset.
    ///
    /// # Errors
    /// `custom_ca` without a `ca_file`.
    pub fn connection_config(&self, endpoint: Endpoint) -> Result<ConnectionConfig> {
        let settings = &self.connection;
        let mut config = match endpoint {
            Endpoint::Namespace => ConnectionConfig::default(),
            Endpoint::Admin => ConnectionConfig::mapi(),
        };

        if let Some(timeout) = settings.request_timeout {
            config.request_timeout = timeout;
        }
        config.connect_timeout = settings.connect_timeout;
        config.max_concurrent_requests = Some(settings.max_concurrent_requests.max(1));
        config.max_body_size = settings.max_body_size;
        if endpoint == Endpoint::Namespace {
            config.retry = if settings.max_retries == 0 {
                None
            } else {
                Some(RetryConfig {
                    max_retries: settings.max_retries,
                    ..RetryConfig::default()
                })
            };
        }
        config.tls = match settings.tls {
            TlsMode::Webpki => TlsConfig::WebPki,
            TlsMode::Native => TlsConfig::Native,
            TlsMode::AcceptInvalid => TlsConfig::AcceptInvalidCerts,
            TlsMode::CustomCa => match &settings.ca_file {
                Some(path) => TlsConfig::CustomCa(path.clone()),
                None => bail!("connection.tls is custom_ca but connection.ca_file is not set"),
            },
        };
        Ok(config)
    }
}
