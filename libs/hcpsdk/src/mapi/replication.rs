//! Replication service and replication links.

use std::fmt;
use std::str::FromStr;

use http::StatusCode;
use serde_json::Value;

use super::{get_json, json_request, names};
use crate::connection::Connection;
use crate::error::HcpError;

const SERVICE_PATH: &str = "/mapi/services/replication";

/// State changes a replication link accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Suspend,
    Resume,
    Restore,
    FailOver,
    FailBack,
    BeginRecovery,
    CompleteRecovery,
}

impl LinkAction {
    pub const ALL: [LinkAction; 7] = [
        LinkAction::Suspend,
        LinkAction::Resume,
        LinkAction::Restore,
        LinkAction::FailOver,
        LinkAction::FailBack,
        LinkAction::BeginRecovery,
        LinkAction::CompleteRecovery,
    ];

    /// Query parameter MAPI expects
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LinkAction::Suspend => "suspend",
            LinkAction::Resume => "resume",
            LinkAction::Restore => "restore",
            LinkAction::FailOver => "failOver",
            LinkAction::FailBack => "failBack",
            LinkAction::BeginRecovery => "beginRecovery",
            LinkAction::CompleteRecovery => "completeRecovery",
        }
    }
}

impl fmt::Display for LinkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkAction {
    type Err = String;

    /// Case-insensitive, so `failover` and `failOver` both work
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LinkAction::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let valid: Vec<&str> = LinkAction::ALL.iter().map(|a| a.as_str()).collect();
                format!("unknown link action '{s}', expected one of {}", valid.join(", "))
            })
    }
}

#[derive(Debug, Clone)]
pub struct Replication {
    connection: Connection,
}

impl Replication {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Replication service settings.
    ///
    /// # Errors
    /// Transport and status errors, [`HcpError::Json`] for a malformed answer.
    pub async fn settings(&self) -> Result<Value, HcpError> {
        get_json(&self.connection, SERVICE_PATH).await
    }

    /// Names of the configured links.
    ///
    /// # Errors
    /// As [`settings`](Self::settings).
    pub async fn links(&self) -> Result<Vec<String>, HcpError> {
        let value = get_json(&self.connection, &format!("{SERVICE_PATH}/links")).await?;
        Ok(names(&value))
    }

    /// Details of one link; `verbose` adds content and schedule information.
    ///
    /// # Errors
    /// As [`settings`](Self::settings); 404 for an unknown link.
    pub async fn link(&self, name: &str, verbose: bool) -> Result<Value, HcpError> {
        json_request(self.connection.get(&link_path(name)))
            .query("verbose", if verbose { "true" } else { "false" })
            .send()
            .await?
            .expect_status(StatusCode::OK)?
            .json()
            .await
    }

    /// Suspend, resume, fail over... a link.
    ///
    /// # Errors
    /// Status errors; HCP rejects actions invalid in the link's current state
    /// with 400 and an `X-HCP-ErrorMessage`.
    pub async fn set_link_state(&self, name: &str, action: LinkAction) -> Result<(), HcpError> {
        json_request(self.connection.post(&link_path(name)))
            .flag(action.as_str())
            .send()
            .await?
            .expect_status(StatusCode::OK)?;
        tracing::info!(link = name, %action, "replication link state changed");
        Ok(())
    }
}

fn link_path(name: &str) -> String {
    format!("{SERVICE_PATH}/links/{}", urlencoding::encode(name))
}
