use anyhow::Result;
use clap::Subcommand;
use hcpsdk::Target;
use hcpsdk::mapi::replication::{LinkAction, Replication};

use super::print_json;

#[derive(Debug, Subcommand)]
pub enum ReplicationCommand {
    /// Replication service settings
    Settings,
    /// Names of the configured links
    Links,
    /// Details of one link
    Link {
        name: String,
        /// Include content and schedule information
        #[arg(long)]
        details: bool,
    },
    /// Change the state of a link (suspend, resume, restore, failOver,
    /// failBack, beginRecovery, completeRecovery)
    Action { name: String, action: LinkAction },
}

impl ReplicationCommand {
    pub async fn run(self, target: &Target) -> Result<()> {
        let replication = Replication::new(target.connection()?);
        match self {
            ReplicationCommand::Settings => print_json(&replication.settings().await?),
            ReplicationCommand::Links => {
                for link in replication.links().await? {
                    println!("{link}");
                }
                Ok(())
            }
            ReplicationCommand::Link { name, details } => print_json(&replication.link(&name, details).await?),
            ReplicationCommand::Action { name, action } => {
                replication.set_link_state(&name, action).await?;
                eprintln!("{action} sent to link {name}");
                Ok(())
            }
        }
    }
}
