//! Namespace information published by HCP under `/proc`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::connection::Connection;
use crate::error::HcpError;
use crate::xml::{Element, Value};

/// Separator HCP uses between the lines of a namespace description
pub const DESCRIPTION_SEPARATOR: char = '\u{b0}';

/// Settings of one accessible namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceSettings {
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
    pub description: Vec<String>,
}

impl NamespaceSettings {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionClass {
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Read-only queries against the namespace a [`Connection`] points at
#[derive(Debug, Clone)]
pub struct NamespaceInfo {
    connection: Connection,
}

impl NamespaceInfo {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    async fn fetch(&self, path: &str, single: bool) -> Result<Element, HcpError> {
        let mut request = self.connection.get(path);
        if single {
            request = request.query("single", "true");
        }
        let response = request.send().await?;
        tracing::debug!(
            path,
            service_time_ms = response.service_time().as_millis(),
            "namespace query"
        );
        response.xml().await
    }

    /// Usage statistics of the namespace (`GET /proc/statistics`).
    ///
    /// # Errors
    /// Transport and status errors, or [`HcpError::Xml`] for a malformed
    /// answer.
    pub async fn statistics(&self) -> Result<BTreeMap<String, Value>, HcpError> {
        Ok(self.fetch("/proc/statistics", false).await?.typed_attributes())
    }

    /// Settings of all namespaces the user can access, or only of the one
    /// addressed by the target when `all` is false.
    ///
    /// # Errors
    /// As [`statistics`](Self::statistics).
    pub async fn list_accessible(
        &self,
        all: bool,
    ) -> Result<BTreeMap<String, NamespaceSettings>, HcpError> {
        let root = self.fetch("/proc", !all).await?;
        Ok(named_children(&root)
            .map(|(name, element)| {
                let description = element
                    .child_text("description")
                    .map(|text| {
                        text.split(DESCRIPTION_SEPARATOR)
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();
                (
                    name,
                    NamespaceSettings {
                        attributes: element.typed_attributes(),
                        description,
                    },
                )
            })
            .collect())
    }

    /// Retention classes available in the namespace.
    ///
    /// # Errors
    /// As [`statistics`](Self::statistics).
    pub async fn retention_classes(&self) -> Result<BTreeMap<String, RetentionClass>, HcpError> {
        let root = self.fetch("/proc/retentionClasses", false).await?;
        Ok(named_children(&root)
            .map(|(name, element)| {
                (
                    name,
                    RetentionClass {
                        attributes: element.typed_attributes(),
                        description: element.child_text("description").map(str::to_owned),
                    },
                )
            })
            .collect())
    }

    /// Namespace and user permissions, keyed by permission domain.
    ///
    /// # Errors
    /// As [`statistics`](Self::statistics).
    pub async fn permissions(&self) -> Result<BTreeMap<String, BTreeMap<String, Value>>, HcpError> {
        let root = self.fetch("/proc/permissions", false).await?;
        Ok(root
            .children
            .iter()
            .map(|element| (element.name.clone(), element.typed_attributes()))
            .collect())
    }
}

fn named_children(root: &Element) -> impl Iterator<Item = (String, &Element)> {
    root.children.iter().filter_map(|element| match element.attr("name") {
        Some(name) => Some((name.to_owned(), element)),
        None => {
            tracing::warn!(element = %element.name, "skipping unnamed entry");
            None
        }
    })
}
