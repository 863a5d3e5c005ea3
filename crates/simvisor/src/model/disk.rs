use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Path of the disk image a run boots from.
///
/// An ephemeral handle names a file that does not exist yet: the provisioner
/// creates it, and the run's cleanup guard deletes it afterwards. A retained
/// handle is never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskHandle {
    path: PathBuf,
    ephemeral: bool,
}

impl DiskHandle {
    pub fn ephemeral(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ephemeral: true,
        }
    }

    pub fn retained(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ephemeral: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }
}
