//! Types for the placer module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What happened when a file was placed into its destination directory.
///
/// Every variant names the destination file, which is the file that gets
/// registered afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlacementOutcome {
    /// Nothing was at the destination; the source was moved there.
    Moved { path: PathBuf },
    /// The destination already held identical content; the source was deleted,
    /// unless the source was the destination file itself.
    Identical { path: PathBuf },
    /// The destination differed and the source was newer; it was overwritten.
    Replaced { path: PathBuf },
    /// The destination differed and the source was not newer; the destination
    /// was kept. The source was moved to `quarantined` when a conflict
    /// directory is configured, otherwise left where it was.
    KeptExisting {
        path: PathBuf,
        quarantined: Option<PathBuf>,
    },
}

impl PlacementOutcome {
    /// The destination file.
    pub fn path(&self) -> &Path {
        match self {
            Self::Moved { path }
            | Self::Identical { path }
            | Self::Replaced { path }
            | Self::KeptExisting { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Moved { .. } => "moved",
            Self::Identical { .. } => "identical",
            Self::Replaced { .. } => "replaced",
            Self::KeptExisting { .. } => "kept_existing",
        }
    }

    /// Whether the source lost a collision against different content.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::KeptExisting { .. })
    }
}
