use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

/// Destination for finished recordings.
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &str;

    /// Push one file. Returns the remote identifier once the store has confirmed it.
    fn upload_file(&self, path: &Path) -> Result<String>;
}

/// Copies files into a directory, e.g. a folder kept in sync by a desktop drive client.
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    target: PathBuf,
}

impl DirectoryStore {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl RemoteStore for DirectoryStore {
    fn name(&self) -> &str {
        "directory"
    }

    fn upload_file(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("upload path {} has no file name", path.display()))?;
        std::fs::create_dir_all(&self.target)
            .with_context(|| format!("create upload directory {}", self.target.display()))?;
        let destination = self.target.join(file_name);
        std::fs::copy(path, &destination).with_context(|| {
            format!("copy {} to {}", path.display(), destination.display())
        })?;
        Ok(destination.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_into_target() -> Result<()> {
        let source = tempfile::tempdir()?;
        let target = tempfile::tempdir()?;
        let file = source.path().join("clip.gif");
        std::fs::write(&file, b"GIF89a")?;

        let store = DirectoryStore::new(target.path().join("drive"));
        let remote_id = store.upload_file(&file)?;
        assert!(remote_id.ends_with("clip.gif"));
        assert_eq!(std::fs::read(target.path().join("drive").join("clip.gif"))?, b"GIF89a");
        assert!(file.exists());
        Ok(())
    }
}
