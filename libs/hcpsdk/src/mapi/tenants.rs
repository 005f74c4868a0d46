use serde_json::Value;

use super::{get_json, names};
use crate::connection::Connection;
use crate::error::HcpError;

/// Tenant queries; needs a connection to `admin.<hcp>:9090`
#[derive(Debug, Clone)]
pub struct Tenants {
    connection: Connection,
}

impl Tenants {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Names of all tenants.
    ///
    /// # Errors
    /// Transport and status errors, [`HcpError::Json`] for a malformed answer.
    pub async fn list(&self) -> Result<Vec<String>, HcpError> {
        Ok(names(&get_json(&self.connection, "/mapi/tenants").await?))
    }

    /// Settings of one tenant.
    ///
    /// # Errors
    /// As [`list`](Self::list); 404 for an unknown tenant.
    pub async fn get(&self, name: &str) -> Result<Value, HcpError> {
        let path = format!("/mapi/tenants/{}", urlencoding::encode(name));
        get_json(&self.connection, &path).await
    }
}
