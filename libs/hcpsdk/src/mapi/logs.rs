//! Log download through MAPI.
//!
//! HCP collects logs in two steps: [`Logs::prepare`] starts packaging the logs
//! of a date range, [`Logs::status`] reports when they are ready, then
//! [`Logs::download`] streams them as a zip archive. Needs a connection to
//! `admin.<hcp>:9090` with a user holding the service role.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{Days, NaiveDate, Utc};
use http::StatusCode;
use serde::Serialize;
use tokio::io::AsyncWrite;

use super::{ACCEPT_XML, json_request};
use crate::connection::Connection;
use crate::error::HcpError;
use crate::xml::{self, Element};

const LOGS_PATH: &str = "/mapi/logs";

/// Date format of `<startDate>`/`<endDate>`
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Days covered by [`Logs::prepare`] when no start date is given
pub const DEFAULT_WINDOW_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogKind {
    Access,
    System,
    Service,
    Application,
}

impl LogKind {
    pub const ALL: [LogKind; 4] = [
        LogKind::Access,
        LogKind::System,
        LogKind::Service,
        LogKind::Application,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Access => "ACCESS",
            LogKind::System => "SYSTEM",
            LogKind::Service => "SERVICE",
            LogKind::Application => "APPLICATION",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("invalid log kind '{s}' (ACCESS, SYSTEM, SERVICE, APPLICATION)"))
    }
}

/// State of the log preparation
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStatus {
    pub ready_for_streaming: bool,
    pub streaming_in_progress: bool,
    pub started: bool,
    pub error: bool,
    /// Log kinds the prepared package contains
    pub content: Vec<String>,
}

impl LogStatus {
    fn from_element(root: &Element) -> Self {
        let flag = |name: &str| root.child_text(name).is_some_and(|t| t.eq_ignore_ascii_case("true"));
        Self {
            ready_for_streaming: flag("readyForStreaming"),
            streaming_in_progress: flag("streamingInProgress"),
            started: flag("started"),
            error: flag("error"),
            content: root
                .child_text("content")
                .map(|c| {
                    c.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Node ids MAPI expects in `<nodes>`: the last octet of each IPv4 node
/// address
#[must_use]
pub fn node_ids(addresses: &[IpAddr]) -> Vec<String> {
    addresses
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4.octets()[3].to_string()),
            IpAddr::V6(_) => None,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Logs {
    connection: Connection,
    default_nodes: Vec<String>,
}

impl Logs {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            default_nodes: Vec::new(),
        }
    }

    /// Nodes to download from when [`download`](Self::download) gets none,
    /// usually `node_ids(&target.addresses())`
    #[must_use]
    pub fn default_nodes(mut self, nodes: Vec<String>) -> Self {
        self.default_nodes = nodes;
        self
    }

    /// Write `message` into the HCP system log.
    ///
    /// # Errors
    /// Transport and status errors.
    pub async fn mark(&self, message: &str) -> Result<(), HcpError> {
        json_request(self.connection.post(LOGS_PATH).query("mark", message))
            .send()
            .await?
            .expect_status(StatusCode::OK)?;
        Ok(())
    }

    /// Start preparing the logs between `start` and `end` (inclusive).
    ///
    /// `end` defaults to today, `start` to [`DEFAULT_WINDOW_DAYS`] before
    /// `end`. `snodes` selects S-series nodes to include.
    ///
    /// # Errors
    /// [`HcpError::InvalidDateRange`] when `start` falls after `end`, no
    /// request is sent then. [`HcpError::LogsInProgress`] when HCP is already
    /// preparing logs, transport and status errors otherwise.
    pub async fn prepare(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        snodes: &[String],
    ) -> Result<(), HcpError> {
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        let start = start
            .or_else(|| end.checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS)))
            .unwrap_or(end);
        if start > end {
            return Err(HcpError::InvalidDateRange { start, end });
        }
        let body = prepare_body(start, end, snodes)?;

        let response = self
            .connection
            .post(&format!("{LOGS_PATH}/prepare"))
            .xml(body)
            .send()
            .await?;
        if response.status() == StatusCode::BAD_REQUEST {
            return Err(HcpError::LogsInProgress(response.hcp_error_message()));
        }
        response.expect_status(StatusCode::OK)?;
        tracing::info!(%start, %end, ?snodes, "log preparation started");
        Ok(())
    }

    /// # Errors
    /// Transport and status errors, [`HcpError::Xml`] for a malformed answer.
    pub async fn status(&self) -> Result<LogStatus, HcpError> {
        let root = self
            .connection
            .get(LOGS_PATH)
            .header("accept", ACCEPT_XML)
            .send()
            .await?
            .xml()
            .await?;
        Ok(LogStatus::from_element(&root))
    }

    /// Stream the prepared logs as a zip archive into `writer`.
    ///
    /// Empty `nodes` means the default nodes, empty `kinds` means all kinds.
    /// `progress` receives the number of bytes written so far after every
    /// chunk. Returns the total size.
    ///
    /// # Errors
    /// [`HcpError::LogsNotReady`] unless a prior [`prepare`](Self::prepare)
    /// has finished; transport, status and write errors.
    pub async fn download<W, F>(
        &self,
        writer: &mut W,
        nodes: &[String],
        snodes: &[String],
        kinds: &[LogKind],
        mut progress: F,
    ) -> Result<u64, HcpError>
    where
        W: AsyncWrite + Unpin + ?Sized,
        F: FnMut(u64),
    {
        if !self.status().await?.ready_for_streaming {
            return Err(HcpError::LogsNotReady);
        }

        let nodes = if nodes.is_empty() { self.default_nodes.as_slice() } else { nodes };
        let kinds = if kinds.is_empty() { &LogKind::ALL[..] } else { kinds };
        let body = download_body(nodes, snodes, kinds)?;

        let total = self
            .connection
            .post(&format!("{LOGS_PATH}/download"))
            .xml(body)
            .send()
            .await?
            .expect_status(StatusCode::OK)?
            .copy_to(writer, &mut progress)
            .await?;

        tracing::info!(bytes = total, ?nodes, ?snodes, "log download finished");
        Ok(total)
    }

    /// Abort a running preparation.
    ///
    /// # Errors
    /// Transport and status errors.
    pub async fn cancel(&self) -> Result<(), HcpError> {
        json_request(self.connection.post(LOGS_PATH).flag("cancel"))
            .send()
            .await?
            .expect_status(StatusCode::OK)?;
        tracing::info!("log preparation cancelled");
        Ok(())
    }
}

fn prepare_body(start: NaiveDate, end: NaiveDate, snodes: &[String]) -> Result<String, HcpError> {
    let start = start.format(DATE_FORMAT).to_string();
    let end = end.format(DATE_FORMAT).to_string();
    let snodes = snodes.join(",");
    let mut fields = vec![("startDate", start.as_str()), ("endDate", end.as_str())];
    if !snodes.is_empty() {
        fields.push(("snodes", snodes.as_str()));
    }
    xml::write_simple("logPrepare", &fields)
}

fn download_body(nodes: &[String], snodes: &[String], kinds: &[LogKind]) -> Result<String, HcpError> {
    let nodes = nodes.join(",");
    let snodes = snodes.join(",");
    let content = kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",");
    xml::write_simple(
        "logDownload",
        &[
            ("nodes", nodes.as_str()),
            ("snodes", snodes.as_str()),
            ("content", content.as_str()),
        ],
    )
}
