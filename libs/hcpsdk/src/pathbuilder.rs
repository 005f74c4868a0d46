//! Object names and directory paths for namespaces holding many objects.
//!
//! Objects are stored under a UUID v4 name. Their directory is derived from
//! the leading hex digits of that name (`<initial>/<c0>/<c1c2>/<c3c4>`), which
//! spreads objects over 16 * 256 * 256 directories and keeps each directory
//! small.

use uuid::Uuid;

use crate::error::HcpError;
use crate::xml;

/// Default directory under which generated paths start
pub const DEFAULT_INITIAL_PATH: &str = "/rest/hcpsdk";

/// Root of the native REST interface
pub const REST_ROOT: &str = "/rest";

const ANNOTATION_ELEMENT: &str = "hcpsdk_fileobject";

/// A freshly generated object location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquePath {
    /// Directory the object belongs in (no trailing slash)
    pub path: String,
    /// Generated object name
    pub object_name: String,
    /// `<hcpsdk_fileobject .../>` annotation, when enabled on the builder
    pub annotation: Option<String>,
}

impl UniquePath {
    /// `path/object_name`
    #[must_use]
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.path, self.object_name)
    }
}

#[derive(Debug, Clone)]
pub struct PathBuilder {
    initial_path: String,
    annotation: bool,
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_PATH)
    }
}

impl PathBuilder {
    /// `initial_path` is normalised to start with `/` and end without one
    #[must_use]
    pub fn new(initial_path: impl AsRef<str>) -> Self {
        let trimmed = initial_path.as_ref().trim_matches('/');
        Self {
            initial_path: format!("/{trimmed}"),
            annotation: false,
        }
    }

    /// Also produce an XML annotation recording the original file name
    #[must_use]
    pub fn annotation(mut self, enabled: bool) -> Self {
        self.annotation = enabled;
        self
    }

    #[must_use]
    pub fn initial_path(&self) -> &str {
        &self.initial_path
    }

    /// Generate a new object name and its directory.
    ///
    /// # Errors
    /// Only if the annotation cannot be serialized.
    pub fn get_unique(&self, filename: &str) -> Result<UniquePath, HcpError> {
        let object_name = Uuid::new_v4().to_string();
        let path = self.get_path(&object_name)?;

        let annotation = if self.annotation {
            Some(xml::write_empty(
                ANNOTATION_ELEMENT,
                &[
                    ("filename", filename),
                    ("path", path.as_str()),
                    ("uuid", object_name.as_str()),
                ],
            )?)
        } else {
            None
        };

        tracing::trace!(%object_name, %path, "generated unique object path");
        Ok(UniquePath {
            path,
            object_name,
            annotation,
        })
    }

    /// Directory for an already known object name.
    ///
    /// # Errors
    /// [`HcpError::InvalidObjectName`] unless the name starts with five hex
    /// digits.
    pub fn get_path(&self, object_name: &str) -> Result<String, HcpError> {
        let prefix = object_name
            .get(..5)
            .filter(|p| p.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| HcpError::InvalidObjectName(object_name.to_owned()))?;

        Ok(format!(
            "{}/{}/{}/{}",
            self.initial_path,
            &prefix[..1],
            &prefix[1..3],
            &prefix[3..5]
        ))
    }

    /// `/rest/<dir>/.../<name>`, every segment percent-encoded, empty
    /// segments dropped
    #[must_use]
    pub fn object_path(dirs: &[&str], name: &str) -> String {
        let mut path = String::from(REST_ROOT);
        for segment in dirs.iter().copied().chain(std::iter::once(name)) {
            if !segment.is_empty() {
                path.push('/');
                path.push_str(&urlencoding::encode(segment));
            }
        }
        path
    }

    /// Turn a slash separated namespace path (`docs/2024/report 1.pdf`) into
    /// an encoded REST path
    #[must_use]
    pub fn rest_path(path: &str) -> String {
        let segments: Vec<&str> = path.split('/').collect();
        match segments.split_last() {
            Some((name, dirs)) => Self::object_path(dirs, name),
            None => REST_ROOT.to_owned(),
        }
    }
}
