use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::path::{normalize_path, normalize_prefix};

/// Address of one stored blob: `identity + "/" + normalized relative path`.
///
/// Keys built through [`ObjectKey::new`] or [`ObjectKey::in_dir`] never
/// contain a `..` segment and always sit inside the identity's namespace.
/// Keys read back from a listing are wrapped with [`ObjectKey::from_raw`]
/// and are not re-validated.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Key for `relative` under the identity's namespace.
    ///
    /// Returns `None` when the relative path normalizes to nothing, since
    /// that would address the namespace itself rather than a blob.
    pub fn new(identity: &Identity, relative: &str) -> Option<Self> {
        Self::in_dir(identity, None, relative)
    }

    /// Key for `relative` under an optional sub-directory of the namespace.
    pub fn in_dir(identity: &Identity, sub_dir: Option<&str>, relative: &str) -> Option<Self> {
        let leaf = normalize_path(relative);
        if leaf.is_empty() {
            return None;
        }
        let dir = sub_dir.map(normalize_prefix).unwrap_or_default();
        Some(Self(format!("{}/{dir}{leaf}", identity.as_str())))
    }

    /// Full listing prefix for a sub-directory (`"<identity>/<dir>/"`).
    ///
    /// An empty or degenerate `sub_dir` yields the whole namespace.
    pub fn prefix(identity: &Identity, sub_dir: &str) -> String {
        format!("{}/{}", identity.as_str(), normalize_prefix(sub_dir))
    }

    /// Wrap a key as returned by the storage backend.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key with `identity + "/"` stripped, if it belongs to `identity`.
    pub fn relative_to(&self, identity: &Identity) -> Option<&str> {
        self.0
            .strip_prefix(identity.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Zero-length "folder" objects some tools create end in `/`.
    pub fn is_placeholder(&self) -> bool {
        self.0.ends_with('/')
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a paginated prefix listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedObject {
    pub key: ObjectKey,
    pub size: u64,
    /// Seconds since the Unix epoch, when the backend reports it.
    pub last_modified: Option<u64>,
}

impl ListedObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: ObjectKey::from_raw(key),
            size,
            last_modified: None,
        }
    }
}
