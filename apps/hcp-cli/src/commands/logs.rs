use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Subcommand;
use hcpsdk::Target;
use hcpsdk::mapi::logs::{LogKind, Logs, node_ids};

use super::{human_bytes, print_json};

#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// State of the log preparation
    Status,
    /// Start packaging the logs of a date range
    Prepare {
        /// First day (YYYY-MM-DD), default one week before --end
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day (YYYY-MM-DD), default today
        #[arg(long)]
        end: Option<NaiveDate>,
        /// S-series nodes to include
        #[arg(long, value_delimiter = ',')]
        snodes: Vec<String>,
    },
    /// Download the prepared logs as a zip archive
    Download {
        file: PathBuf,
        /// Node ids, default all nodes of the target
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        snodes: Vec<String>,
        /// Log kinds (ACCESS, SYSTEM, SERVICE, APPLICATION), default all
        #[arg(long = "logs", value_delimiter = ',')]
        kinds: Vec<LogKind>,
    },
    /// Cancel a running preparation
    Cancel,
    /// Write a message into the HCP system log
    Mark { message: String },
}

impl LogsCommand {
    pub async fn run(self, target: &Target) -> Result<()> {
        let logs = Logs::new(target.connection()?).default_nodes(node_ids(&target.addresses()));
        match self {
            LogsCommand::Status => print_json(&logs.status().await?),
            LogsCommand::Prepare { start, end, snodes } => {
                logs.prepare(start, end, &snodes).await?;
                eprintln!("log preparation started");
                Ok(())
            }
            LogsCommand::Download {
                file,
                nodes,
                snodes,
                kinds,
            } => {
                let mut out = tokio::fs::File::create(&file)
                    .await
                    .with_context(|| format!("cannot create {}", file.display()))?;
                let total = logs
                    .download(&mut out, &nodes, &snodes, &kinds, |received| {
                        eprint!("\rreceived {:<12}", human_bytes(received));
                    })
                    .await?;
                eprintln!("\r{} written to {}", human_bytes(total), file.display());
                Ok(())
            }
            LogsCommand::Cancel => {
                logs.cancel().await?;
                Ok(())
            }
            LogsCommand::Mark { message } => {
                logs.mark(&message).await?;
                Ok(())
            }
        }
    }
}
