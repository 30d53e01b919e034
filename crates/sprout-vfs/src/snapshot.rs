use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::VfsError;

/// A serialized capture of a [`crate::Vfs`] tree.
///
/// The wire form is JSON; file contents are base64. Entry order is stable
/// but not load-bearing: rehydration sorts parents-first (see
/// [`crate::Vfs::apply_snapshot`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsSnapshot {
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileEntry {
    Directory { path: String },
    File { path: String, content: String },
    Symlink { path: String, target: String },
}

impl FileEntry {
    pub fn directory(path: impl Into<String>) -> Self {
        Self::Directory { path: path.into() }
    }

    pub fn file(path: impl Into<String>, contents: &[u8]) -> Self {
        Self::File {
            path: path.into(),
            content: BASE64.encode(contents),
        }
    }

    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Symlink {
            path: path.into(),
            target: target.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Directory { path } | Self::File { path, .. } | Self::Symlink { path, .. } => path,
        }
    }

    pub(crate) fn decoded_content(&self) -> Result<Vec<u8>, VfsError> {
        match self {
            Self::File { path, content } => {
                BASE64
                    .decode(content)
                    .map_err(|err| VfsError::InvalidSnapshotEntry {
                        path: path.clone(),
                        reason: err.to_string(),
                    })
            }
            _ => Ok(Vec::new()),
        }
    }
}
