//! Object and directory operations of the native REST interface.
//!
//! Paths are REST paths as produced by
//! [`PathBuilder`](crate::pathbuilder::PathBuilder), e.g. `/rest/docs/a.txt`.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use tokio::io::AsyncWrite;

use crate::connection::Connection;
use crate::error::HcpError;
use crate::xml::Value;

/// What a path refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Object,
    Directory,
    Symlink,
    Other(String),
}

impl ObjectKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "object" => ObjectKind::Object,
            "directory" => ObjectKind::Directory,
            "symlink" => ObjectKind::Symlink,
            other => ObjectKind::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Object => f.write_str("object"),
            ObjectKind::Directory => f.write_str("directory"),
            ObjectKind::Symlink => f.write_str("symlink"),
            ObjectKind::Other(s) => f.write_str(s),
        }
    }
}

impl Serialize for ObjectKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// System metadata HCP returns in `X-HCP-*` headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    pub kind: ObjectKind,
    pub size: Option<u64>,
    pub hash_scheme: Option<String>,
    pub hash: Option<String>,
    pub retention: Option<String>,
    pub retention_class: Option<String>,
    pub retention_hold: Option<bool>,
    pub ingest_time: Option<DateTime<Utc>>,
    pub version_id: Option<String>,
    pub custom_metadata: bool,
    pub shred: Option<bool>,
    pub index: Option<bool>,
    pub replicated: Option<bool>,
    pub dpl: Option<u32>,
    pub owner: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl ObjectMetadata {
    /// Read the metadata from HEAD/GET response headers
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        let flag = |name: &str| text(name).and_then(|v| v.parse::<bool>().ok());

        // "SHA-256 8A7F..." carries scheme and digest in one header
        let (hash_scheme, hash) = match text("x-hcp-hash") {
            Some(raw) => match raw.split_once(' ') {
                Some((scheme, digest)) => (Some(scheme.to_owned()), Some(digest.trim().to_owned())),
                None => (None, Some(raw)),
            },
            None => (None, None),
        };

        Self {
            kind: text("x-hcp-type").map_or(ObjectKind::Object, |t| ObjectKind::parse(&t)),
            size: text("x-hcp-size")
                .or_else(|| text("content-length"))
                .and_then(|v| v.parse().ok()),
            hash_scheme,
            hash,
            retention: text("x-hcp-retentionstring").or_else(|| text("x-hcp-retention")),
            retention_class: text("x-hcp-retentionclass"),
            retention_hold: flag("x-hcp-retentionhold"),
            ingest_time: text("x-hcp-ingesttime")
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            version_id: text("x-hcp-versionid"),
            custom_metadata: flag("x-hcp-custom-metadata").unwrap_or(false),
            shred: flag("x-hcp-shred"),
            index: flag("x-hcp-index"),
            replicated: flag("x-hcp-replicated"),
            dpl: text("x-hcp-dpl").and_then(|v| v.parse().ok()),
            owner: text("x-hcp-owner"),
            content_type: text("content-type"),
            etag: text("etag").map(|e| e.trim_matches('"').to_owned()),
        }
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Decoded name
    pub name: String,
    /// Percent-encoded name, usable as a path segment
    pub url_name: String,
    pub kind: ObjectKind,
    pub size: Option<u64>,
    pub ingest_time: Option<DateTime<Utc>>,
    /// Remaining entry attributes (hash, retention, state, ...)
    pub attributes: BTreeMap<String, Value>,
}

fn directory_entry(element: &crate::xml::Element) -> Option<DirectoryEntry> {
    let url_name = element.attr("urlName")?.to_owned();
    let name = match element.attr("utf8Name") {
        Some(name) => name.to_owned(),
        None => urlencoding::decode(&url_name)
            .map_or_else(|_| url_name.clone(), |n| n.into_owned()),
    };

    let mut attributes = element.typed_attributes();
    for key in ["urlName", "utf8Name", "type", "size", "ingestTime"] {
        attributes.remove(key);
    }

    Some(DirectoryEntry {
        name,
        kind: element.attr("type").map_or(ObjectKind::Object, ObjectKind::parse),
        size: element.attr("size").and_then(|s| s.parse().ok()),
        ingest_time: element
            .attr("ingestTime")
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        url_name,
        attributes,
    })
}

/// Object access within the namespace of a [`Connection`]
#[derive(Debug, Clone)]
pub struct Objects {
    connection: Connection,
}

impl Objects {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Store `data` at `path`; HCP answers 201 on success and 409 if the
    /// object exists.
    ///
    /// # Errors
    /// Transport errors, or a status error for anything but 201.
    pub async fn put_object(&self, path: &str, data: impl Into<Bytes>) -> Result<ObjectMetadata, HcpError> {
        let data = data.into();
        let size = data.len();
        let response = self
            .connection
            .put(path)
            .body_bytes(data)
            .send()
            .await?
            .expect_status(StatusCode::CREATED)?;
        tracing::debug!(path, size, "object stored");
        Ok(ObjectMetadata::from_headers(response.headers()))
    }

    /// Read a whole object into memory (bounded by `max_body_size`).
    ///
    /// # Errors
    /// [`HcpError::HttpStatus`] with 404 for a missing object.
    pub async fn get_object(&self, path: &str) -> Result<Bytes, HcpError> {
        self.connection.get(path).send().await?.checked_bytes().await
    }

    /// Stream an object into `writer`, `max_body_size` does not apply.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// As [`get_object`](Self::get_object), plus [`HcpError::Io`] from the
    /// writer.
    pub async fn get_object_to<W>(&self, path: &str, writer: &mut W) -> Result<u64, HcpError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let total = self
            .connection
            .get(path)
            .send()
            .await?
            .error_for_status()?
            .copy_to(writer, |_| {})
            .await?;
        tracing::debug!(path, size = total, "object received");
        Ok(total)
    }

    /// Attach `annotation` (XML) as custom metadata of an existing object.
    ///
    /// # Errors
    /// Status errors, 404 when the object does not exist.
    pub async fn put_annotation(&self, path: &str, annotation: String) -> Result<(), HcpError> {
        self.connection
            .put(path)
            .query("type", "custom-metadata")
            .xml(annotation)
            .send()
            .await?
            .expect_status(StatusCode::CREATED)?;
        tracing::debug!(path, "annotation stored");
        Ok(())
    }

    /// Object or directory metadata.
    ///
    /// # Errors
    /// As [`get_object`](Self::get_object).
    pub async fn head_object(&self, path: &str) -> Result<ObjectMetadata, HcpError> {
        let response = self.connection.head(path).send().await?.error_for_status()?;
        Ok(ObjectMetadata::from_headers(response.headers()))
    }

    /// `false` for a 404, metadata errors otherwise propagate.
    ///
    /// # Errors
    /// Anything [`head_object`](Self::head_object) fails with except 404.
    pub async fn exists(&self, path: &str) -> Result<bool, HcpError> {
        match self.head_object(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    /// Status errors (404 missing, 403 under retention).
    pub async fn delete_object(&self, path: &str) -> Result<(), HcpError> {
        self.connection.delete(path).send().await?.error_for_status()?;
        tracing::debug!(path, "object deleted");
        Ok(())
    }

    /// # Errors
    /// Status errors (409 if the directory exists).
    pub async fn create_directory(&self, path: &str) -> Result<(), HcpError> {
        self.connection
            .put(path)
            .query("type", "directory")
            .send()
            .await?
            .expect_status(StatusCode::CREATED)?;
        Ok(())
    }

    /// Entries of a directory, in the order HCP lists them.
    ///
    /// # Errors
    /// Status errors, or [`HcpError::Xml`] for a malformed listing.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, HcpError> {
        let root = self.connection.get(path).send().await?.xml().await?;
        if root.name != "directory" {
            return Err(HcpError::Xml(format!(
                "expected a directory listing, got <{}>",
                root.name
            )));
        }
        Ok(root
            .children
            .iter()
            .filter(|e| e.name == "entry")
            .filter_map(directory_entry)
            .collect())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_metadata_from_headers() {
        let meta = ObjectMetadata::from_headers(&headers(&[
            ("x-hcp-type", "object"),
            ("x-hcp-size", "4711"),
            ("x-hcp-hash", "SHA-256 9F86D081884C7D65"),
            ("x-hcp-retentionstring", "Deletion Allowed"),
            ("x-hcp-ingesttime", "1391002111"),
            ("x-hcp-versionid", "89681289569729"),
            ("x-hcp-custom-metadata", "true"),
            ("x-hcp-shred", "false"),
            ("x-hcp-dpl", "2"),
            ("etag", "\"abc\""),
        ]));

        assert_eq!(meta.kind, ObjectKind::Object);
        assert_eq!(meta.size, Some(4711));
        assert_eq!(meta.hash_scheme.as_deref(), Some("SHA-256"));
        assert_eq!(meta.hash.as_deref(), Some("9F86D081884C7D65"));
        assert_eq!(meta.retention.as_deref(), Some("Deletion Allowed"));
        assert_eq!(meta.ingest_time.unwrap().timestamp(), 1_391_002_111);
        assert_eq!(meta.version_id.as_deref(), Some("89681289569729"));
        assert!(meta.custom_metadata);
        assert_eq!(meta.shred, Some(false));
        assert_eq!(meta.dpl, Some(2));
        assert_eq!(meta.etag.as_deref(), Some("abc"));
        assert_eq!(meta.index, None);
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = ObjectMetadata::from_headers(&headers(&[
            ("x-hcp-type", "directory"),
            ("content-length", "0"),
        ]));
        assert_eq!(meta.kind, ObjectKind::Directory);
        assert_eq!(meta.size, Some(0));
        assert!(!meta.custom_metadata);
        assert!(meta.hash.is_none());
    }

    #[test]
    fn test_directory_entry() {
        let root = crate::xml::parse(
            br#"<directory path="/rest/docs">
                  <entry urlName="a%20b.txt" utf8Name="a b.txt" type="object" size="12"
                         ingestTime="1391002111" hash="SHA-256 AB" state="created"/>
                  <entry urlName="sub" type="directory" state="created"/>
                </directory>"#,
        )
        .unwrap();

        let entries: Vec<_> = root.children.iter().filter_map(directory_entry).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a b.txt");
        assert_eq!(entries[0].url_name, "a%20b.txt");
        assert_eq!(entries[0].size, Some(12));
        assert_eq!(
            entries[0].attributes.get("state"),
            Some(&Value::Str("created".to_owned()))
        );
        assert!(!entries[0].attributes.contains_key("size"));
        assert_eq!(entries[1].kind, ObjectKind::Directory);
        assert_eq!(entries[1].name, "sub");
    }
}
