use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque identity of an authenticated caller.
///
/// The gateway never interprets the value; it only uses it as the first
/// segment of every object key the caller can touch. A `/` would let one
/// identity's namespace nest inside another's, so it is refused here.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Build an identity from a pre-validated string.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TypeError::EmptyIdentity);
        }
        if value.contains('/') {
            return Err(TypeError::InvalidIdentity {
                identity: value,
                reason: "must not contain '/'".into(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key-space prefix owned by this identity (`"<identity>/"`).
    pub fn namespace(&self) -> String {
        format!("{}/", self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
