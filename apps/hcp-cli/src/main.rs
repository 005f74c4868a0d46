mod commands;
mod config;
mod duration_serde;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::Command;
use config::{CliConfig, LoggingConfig};

/// Hitachi Content Platform client: namespace data access and the management API
#[derive(Parser)]
#[command(name = "hcp-cli")]
#[command(version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Target FQDN override for the endpoint the command uses
    #[arg(long, global = true)]
    fqdn: Option<String>,

    /// Port override for the endpoint the command uses
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// User name override
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Print the effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut CliConfig) {
        let endpoint = self.command.as_ref().map_or(config::Endpoint::Namespace, Command::endpoint);
        let target = config.endpoint_mut(endpoint);
        if let Some(fqdn) = &self.fqdn {
            target.fqdn = Some(fqdn.clone());
        }
        if let Some(port) = self.port {
            target.port = port;
        }
        if let Some(user) = &self.user {
            config.credentials.user = Some(user.clone());
        }
    }
}

fn init_logging(verbose: u8, logging: &LoggingConfig) -> Result<()> {
    let filter = match verbose {
        0 => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&logging.level)
                .with_context(|| format!("invalid log level filter: {}", logging.level))?,
        },
        1 => EnvFilter::new("hcpsdk=info,hcp_cli=info"),
        2 => EnvFilter::new("hcpsdk=debug,hcp_cli=debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    init_logging(cli.verbose, &config.logging)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("no command given, see --help");
    };
    tracing::debug!(?command, "running command");
    command.run(&config).await
}
