use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The directory every index lives under, one subdirectory per index name.
#[derive(Debug, Clone)]
pub struct BaseDir {
    root: PathBuf,
}

impl BaseDir {
    /// Use `root` as the base directory, creating it if needed.
    pub fn resolve(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            Error::Config(format!(
                "base directory {} could not be created: {e}",
                root.display()
            ))
        })?;

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage location for the index called `name`.
    ///
    /// Names must be a single non-empty path component.
    pub fn index_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(Error::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}
