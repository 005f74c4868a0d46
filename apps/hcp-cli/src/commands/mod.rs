mod logs;
mod ns;
mod object;
mod replication;
mod tenants;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use hcpsdk::{NativeAdAuthorization, NativeAuthorization, QueryMode, Target};
use secrecy::SecretString;
use serde::Serialize;

use crate::config::{CliConfig, Endpoint};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Namespace information from `/proc`
    #[command(subcommand)]
    Ns(ns::NsCommand),
    /// Objects and directories in the namespace
    #[command(subcommand)]
    Object(object::ObjectCommand),
    /// Log preparation and download (MAPI)
    #[command(subcommand)]
    Logs(logs::LogsCommand),
    /// Replication links (MAPI)
    #[command(subcommand)]
    Replication(replication::ReplicationCommand),
    /// Tenants (MAPI, system level user)
    #[command(subcommand)]
    Tenants(tenants::TenantsCommand),
}

impl Command {
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Command::Ns(_) | Command::Object(_) => Endpoint::Namespace,
            Command::Logs(_) | Command::Replication(_) | Command::Tenants(_) => Endpoint::Admin,
        }
    }

    pub async fn run(self, config: &CliConfig) -> Result<()> {
        let target = build_target(config, self.endpoint()).await?;
        match self {
            Command::Ns(cmd) => cmd.run(&target).await,
            Command::Object(cmd) => cmd.run(&target, config).await,
            Command::Logs(cmd) => cmd.run(&target).await,
            Command::Replication(cmd) => cmd.run(&target).await,
            Command::Tenants(cmd) => cmd.run(&target).await,
        }
    }
}

async fn build_target(config: &CliConfig, endpoint: Endpoint) -> Result<Target> {
    let settings = config.endpoint(endpoint);
    let Some(fqdn) = settings.fqdn.as_deref() else {
        let section = match endpoint {
            Endpoint::Namespace => "namespace",
            Endpoint::Admin => "admin",
        };
        bail!("no target given: set {section}.fqdn or pass --fqdn");
    };

    let mut builder = Target::builder(fqdn)
        .port(settings.port)
        .config(config.connection_config(endpoint)?);

    let credentials = &config.credentials;
    if let Some(user) = credentials.user.as_deref() {
        let empty = SecretString::from(String::new());
        let password = credentials.password.as_ref().unwrap_or(&empty);
        builder = if credentials.active_directory {
            builder.authorization(NativeAdAuthorization::new(user, password)?)
        } else {
            builder.authorization(NativeAuthorization::new(user, password)?)
        };
    } else {
        tracing::warn!("no credentials configured, requests are sent anonymously");
    }

    if !config.connection.addresses.is_empty() {
        builder = builder.addresses(config.connection.addresses.clone());
    }
    if let Some(ttl) = config.connection.dns_refresh {
        builder = builder.dns_refresh(ttl);
    }
    if config.connection.bypass_dns_cache {
        builder = builder.query_mode(QueryMode::Direct);
    }
    if config.connection.insecure_http {
        builder = insecure(builder)?;
    }

    builder
        .build()
        .await
        .with_context(|| format!("cannot reach {fqdn}:{}", settings.port))
}

#[cfg(any(debug_assertions, feature = "insecure-http"))]
#[allow(clippy::unnecessary_wraps)]
fn insecure(builder: hcpsdk::TargetBuilder) -> Result<hcpsdk::TargetBuilder> {
    Ok(builder.insecure_http())
}

#[cfg(not(any(debug_assertions, feature = "insecure-http")))]
fn insecure(_builder: hcpsdk::TargetBuilder) -> Result<hcpsdk::TargetBuilder> {
    bail!("connection.insecure_http needs a debug build or the insecure-http feature")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `1234567` -> `1.18 MiB`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1024), "1.00 KiB");
        assert_eq!(human_bytes(1536), "1.50 KiB");
        assert_eq!(human_bytes(1_048_576), "1.00 MiB");
        assert_eq!(human_bytes(1_234_567), "1.18 MiB");
        assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.00 GiB");
        assert_eq!(human_bytes(u64::MAX), "16.00 EiB");
    }

    #[tokio::test]
    async fn bypass_dns_cache_resolves_directly() {
        let mut config = CliConfig::default();
        config.namespace.fqdn = Some("localhost".to_owned());
        config.connection.bypass_dns_cache = true;
        let target = build_target(&config, Endpoint::Namespace).await.unwrap();
        assert_eq!(target.circle().query_mode(), QueryMode::Direct);

        config.connection.bypass_dns_cache = false;
        let target = build_target(&config, Endpoint::Namespace).await.unwrap();
        assert_eq!(target.circle().query_mode(), QueryMode::System);
    }

    #[tokio::test]
    async fn missing_fqdn_names_the_section() {
        let config = CliConfig::default();
        let err = build_target(&config, Endpoint::Admin).await.unwrap_err();
        assert!(err.to_string().contains("admin.fqdn"));
    }
}
