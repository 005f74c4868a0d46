use anyhow::Result;
use clap::Subcommand;
use hcpsdk::Target;
use hcpsdk::mapi::tenants::Tenants;

use super::print_json;

#[derive(Debug, Subcommand)]
pub enum TenantsCommand {
    /// Names of all tenants
    List,
    /// Settings of one tenant
    Get { name: String },
}

impl TenantsCommand {
    pub async fn run(self, target: &Target) -> Result<()> {
        let tenants = Tenants::new(target.connection()?);
        match self {
            TenantsCommand::List => {
                for tenant in tenants.list().await? {
                    println!("{tenant}");
                }
                Ok(())
            }
            TenantsCommand::Get { name } => print_json(&tenants.get(&name).await?),
        }
    }
}
