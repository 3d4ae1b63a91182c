//! Opaque session-cache key.

use std::fmt;
use std::sync::Arc;

/// Identifies a remote endpoint (scheme, host and port).
///
/// The pool only compares and hashes authorities; interpreting the string
/// is left to the [`Connector`](crate::transport::Connector).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Authority(Arc<str>);

impl Authority {
    pub fn new(authority: impl AsRef<str>) -> Self {
        Self(Arc::from(authority.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Authority({:?})", &*self.0)
    }
}

impl From<&str> for Authority {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Authority {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&Authority> for Authority {
    fn from(a: &Authority) -> Self {
        a.clone()
    }
}

impl AsRef<str> for Authority {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
