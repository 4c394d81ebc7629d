//! Source locators (`<scheme>://<absolute path>`).

use crate::sniff::Protocol;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identifies a normalized source for a converter.
///
/// Rendered as `<scheme>://<path>`, e.g. `mbtiles:///data/uploads/abc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    protocol: Protocol,
    path: PathBuf,
}

impl SourceLocator {
    /// Creates a locator for `path` under `protocol`.
    pub fn new(protocol: &Protocol, path: &Path) -> Self {
        Self {
            protocol: protocol.clone(),
            path: path.to_path_buf(),
        }
    }

    /// Parses a `<scheme>://<path>` string.
    pub fn parse(value: &str) -> Option<Self> {
        let (scheme, path) = value.split_once("://")?;
        if scheme.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self {
            protocol: Protocol::from_scheme(scheme),
            path: PathBuf::from(path),
        })
    }

    /// Protocol of the source.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Scheme prefix.
    pub fn scheme(&self) -> &str {
        self.protocol.scheme()
    }

    /// Filesystem path of the source.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol.scheme(), self.path.display())
    }
}
