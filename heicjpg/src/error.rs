use std::path::PathBuf;

use thiserror::Error;

/// Why a single job ended in `Failed`. Never aborts sibling jobs.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode {}: {source:#}", path.display())]
    Decode {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("failed to resize {}: {source:#}", path.display())]
    Resize {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("failed to encode {}: {source:#}", path.display())]
    Encode {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConvertError {
    /// Unreadable input counts as a decode failure
    pub fn is_decode(&self) -> bool {
        matches!(self, ConvertError::Read { .. } | ConvertError::Decode { .. })
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            ConvertError::Read { path, .. }
            | ConvertError::Decode { path, .. }
            | ConvertError::Resize { path, .. }
            | ConvertError::Encode { path, .. }
            | ConvertError::Write { path, .. } => path,
        }
    }
}
