//! Management API (MAPI), served on port 9090 of `admin.<hcp>` or
//! `<tenant>.<hcp>`.
//!
//! MAPI answers JSON when asked for it; the log interfaces speak XML.

pub mod logs;
pub mod replication;
pub mod tenants;

pub use logs::{LogKind, LogStatus, Logs, node_ids};
pub use replication::{LinkAction, Replication};
pub use tenants::Tenants;

use http::StatusCode;
use serde_json::Value;

use crate::connection::{Connection, RequestBuilder};
use crate::error::HcpError;

pub(crate) const ACCEPT_JSON: &str = "application/json";
pub(crate) const ACCEPT_XML: &str = "application/xml";

pub(crate) fn json_request(request: RequestBuilder) -> RequestBuilder {
    request.header("accept", ACCEPT_JSON)
}

/// GET a MAPI resource as JSON, 200 expected
pub(crate) async fn get_json(connection: &Connection, path: &str) -> Result<Value, HcpError> {
    json_request(connection.get(path))
        .send()
        .await?
        .expect_status(StatusCode::OK)?
        .json()
        .await
}

/// Names from a MAPI list answer: `{"name": ["a", "b"]}`, `{"name": "a"}` or
/// a bare array
pub(crate) fn names(value: &Value) -> Vec<String> {
    let list = match value {
        Value::Object(map) => map.get("name"),
        other => Some(other),
    };
    match list {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        Some(Value::String(name)) => vec![name.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names() {
        assert_eq!(names(&json!({"name": ["t1", "t2"]})), vec!["t1", "t2"]);
        assert_eq!(names(&json!({"name": "only"})), vec!["only"]);
        assert_eq!(names(&json!(["a", 3, "b"])), vec!["a", "b"]);
        assert!(names(&json!({})).is_empty());
        assert!(names(&json!(null)).is_empty());
    }
}
