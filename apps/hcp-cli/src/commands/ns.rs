use anyhow::Result;
use clap::Subcommand;
use hcpsdk::Target;
use hcpsdk::namespace::NamespaceInfo;

use super::print_json;

#[derive(Debug, Subcommand)]
pub enum NsCommand {
    /// Usage statistics of the namespace
    Stats,
    /// Settings of the namespace
    List {
        /// All namespaces the user can access, not only the target one
        #[arg(long)]
        all: bool,
    },
    /// Retention classes
    Retention,
    /// Namespace and user permissions
    Permissions,
}

impl NsCommand {
    pub async fn run(self, target: &Target) -> Result<()> {
        let info = NamespaceInfo::new(target.connection()?);
        match self {
            NsCommand::Stats => print_json(&info.statistics().await?),
            NsCommand::List { all } => print_json(&info.list_accessible(all).await?),
            NsCommand::Retention => print_json(&info.retention_classes().await?),
            NsCommand::Permissions => print_json(&info.permissions().await?),
        }
    }
}
