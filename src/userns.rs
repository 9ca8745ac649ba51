//! User namespace id mapping.
//!
//! Unprivileged containers run in a user namespace whose root maps to the
//! highest id available to the backend. The mapper decides which ids those
//! are.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::UserNamespaceError;

const DEFAULT_UID_MAP: &str = "/proc/self/uid_map";
const DEFAULT_GID_MAP: &str = "/proc/self/gid_map";

/// Decides the id range available to container user namespaces.
#[async_trait]
pub trait UserNamespace: Send + Sync {
    /// Returns the greatest valid `(uid, gid)` pair.
    async fn max_valid_ids(&self) -> Result<(u32, u32), UserNamespaceError>;
}

/// Reads the id maps of the current process.
#[derive(Debug, Clone)]
pub struct ProcUserNamespace {
    uid_map: PathBuf,
    gid_map: PathBuf,
}

impl Default for ProcUserNamespace {
    fn default() -> Self {
        Self {
            uid_map: PathBuf::from(DEFAULT_UID_MAP),
            gid_map: PathBuf::from(DEFAULT_GID_MAP),
        }
    }
}

impl ProcUserNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the maps from the given files instead of `/proc/self`.
    pub fn with_paths(mut self, uid_map: impl Into<PathBuf>, gid_map: impl Into<PathBuf>) -> Self {
        self.uid_map = uid_map.into();
        self.gid_map = gid_map.into();
        self
    }
}

#[async_trait]
impl UserNamespace for ProcUserNamespace {
    async fn max_valid_ids(&self) -> Result<(u32, u32), UserNamespaceError> {
        let uid = max_id_from_file(&self.uid_map).await?;
        let gid = max_id_from_file(&self.gid_map).await?;
        Ok((uid, gid))
    }
}

async fn max_id_from_file(path: &Path) -> Result<u32, UserNamespaceError> {
    let content = tokio::fs::read_to_string(path).await?;
    max_valid_id(&path.display().to_string(), &content)
}

/// Parses an id map (`inside outside length` per line) and returns the
/// greatest id valid inside the namespace.
fn max_valid_id(path: &str, content: &str) -> Result<u32, UserNamespaceError> {
    let mut max: Option<u32> = None;

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let malformed = |reason: &str| UserNamespaceError::MalformedMap {
            path: path.to_string(),
            line: idx + 1,
            reason: reason.to_string(),
        };

        let fields: Vec<u64> = line
            .split_whitespace()
            .map(|f| f.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|e| malformed(&e.to_string()))?;

        let &[inside, _outside, length] = fields.as_slice() else {
            return Err(malformed("expected 3 fields"));
        };

        if length == 0 {
            return Err(malformed("zero length range"));
        }

        let last = inside
            .checked_add(length - 1)
            .ok_or_else(|| malformed("range overflows"))?
            .min(u64::from(u32::MAX)) as u32;
        max = Some(max.map_or(last, |m| m.max(last)));
    }

    max.ok_or_else(|| UserNamespaceError::EmptyMap(path.to_string()))
}
