//! Background upload of finished recordings.
//!
//! The watcher polls a local directory, pushes every finished file to a `RemoteStore`, and
//! deletes the local copy only once the store confirmed the upload. Partial files
//! (`*.part`) are left alone.

#[cfg(feature = "remote-http")]
mod http;
mod store;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(feature = "remote-http")]
pub use http::HttpStore;
pub use store::{DirectoryStore, RemoteStore};

use crate::config::UploadSettings;
use crate::recording::encoder::PARTIAL_EXTENSION;

/// Pick the store configured in `settings`. `None` when uploads are disabled.
pub fn store_from_settings(settings: &UploadSettings) -> Result<Option<Arc<dyn RemoteStore>>> {
    if let Some(url) = settings.url.as_deref() {
        #[cfg(feature = "remote-http")]
        {
            return Ok(Some(Arc::new(HttpStore::new(url)) as Arc<dyn RemoteStore>));
        }
        #[cfg(not(feature = "remote-http"))]
        {
            return Err(anyhow!(
                "upload url {} requires the remote-http feature",
                url
            ));
        }
    }
    Ok(settings
        .target_dir
        .as_ref()
        .map(|dir| Arc::new(DirectoryStore::new(dir)) as Arc<dyn RemoteStore>))
}

/// Upload every finished file in `dir`, oldest name first. Returns how many were uploaded.
pub fn upload_pending(dir: &Path, store: &dyn RemoteStore) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut pending: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext != PARTIAL_EXTENSION)
                .unwrap_or(true)
        })
        .collect();
    pending.sort();

    let mut uploaded = 0;
    for path in pending {
        match store.upload_file(&path) {
            Ok(remote_id) => {
                log::info!(
                    "uploaded {} to {} store as {}",
                    path.display(),
                    store.name(),
                    remote_id
                );
                if let Err(err) = std::fs::remove_file(&path) {
                    log::warn!("unable to delete uploaded {}: {}", path.display(), err);
                }
                uploaded += 1;
            }
            Err(err) => log::error!("upload of {} failed: {:#}", path.display(), err),
        }
    }
    Ok(uploaded)
}

/// Polling thread for one directory.
pub struct UploadWatcher {
    dir: PathBuf,
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl UploadWatcher {
    pub fn spawn(dir: PathBuf, store: Arc<dyn RemoteStore>, poll: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let thread_dir = dir.clone();
        let join = std::thread::Builder::new()
            .name("upload-watcher".to_string())
            .spawn(move || loop {
                if let Err(err) = upload_pending(&thread_dir, store.as_ref()) {
                    log::error!("upload pass over {} failed: {:#}", thread_dir.display(), err);
                }
                match stop_rx.recv_timeout(poll) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| anyhow!("spawn upload watcher: {}", e))?;
        log::info!("upload watcher started on {}", dir.display());
        Ok(Self {
            dir,
            stop_tx,
            join: Some(join),
        })
    }

    pub fn stop(mut self) -> Result<()> {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("upload watcher thread panicked"))?;
        }
        log::info!("upload watcher stopped on {}", self.dir.display());
        Ok(())
    }
}

/// Owns at most one running watcher.
pub struct UploadService {
    store: Option<Arc<dyn RemoteStore>>,
    poll: Duration,
    watcher: Mutex<Option<UploadWatcher>>,
}

impl UploadService {
    pub fn new(store: Option<Arc<dyn RemoteStore>>, poll: Duration) -> Self {
        Self {
            store,
            poll,
            watcher: Mutex::new(None),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// (Re)start watching `dir`. Returns false when no store is configured.
    pub fn start_upload_watcher(&self, dir: &Path) -> Result<bool> {
        let Some(store) = self.store.clone() else {
            log::info!("no upload store configured; {} is not watched", dir.display());
            return Ok(false);
        };
        let mut guard = self
            .watcher
            .lock()
            .map_err(|_| anyhow!("upload watcher lock poisoned"))?;
        if let Some(previous) = guard.take() {
            previous.stop()?;
        }
        *guard = Some(UploadWatcher::spawn(dir.to_path_buf(), store, self.poll)?);
        Ok(true)
    }

    /// Returns false when no watcher was running.
    pub fn stop_upload_watcher(&self) -> Result<bool> {
        let previous = self
            .watcher
            .lock()
            .map_err(|_| anyhow!("upload watcher lock poisoned"))?
            .take();
        match previous {
            Some(watcher) => {
                watcher.stop()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for UploadService {
    fn drop(&mut self) {
        if let Ok(guard) = self.watcher.get_mut() {
            if let Some(watcher) = guard.take() {
                if let Err(err) = watcher.stop() {
                    log::error!("{:#}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyStore {
        attempts: AtomicUsize,
    }

    impl RemoteStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        fn upload_file(&self, path: &Path) -> Result<String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("bad") {
                return Err(anyhow!("remote rejected file"));
            }
            Ok("remote-1".to_string())
        }
    }

    #[test]
    fn only_confirmed_uploads_are_deleted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.gif"), b"a")?;
        std::fs::write(dir.path().join("bad.gif"), b"b")?;
        std::fs::write(dir.path().join("c.gif.part"), b"c")?;
        std::fs::create_dir(dir.path().join("nested"))?;

        let store = FlakyStore {
            attempts: AtomicUsize::new(0),
        };
        assert_eq!(upload_pending(dir.path(), &store)?, 1);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert!(!dir.path().join("a.gif").exists());
        assert!(dir.path().join("bad.gif").exists());
        assert!(dir.path().join("c.gif.part").exists());
        Ok(())
    }

    #[test]
    fn missing_directory_is_not_an_error() -> Result<()> {
        let store = FlakyStore {
            attempts: AtomicUsize::new(0),
        };
        assert_eq!(upload_pending(Path::new("/nonexistent/videos"), &store)?, 0);
        Ok(())
    }

    #[test]
    fn service_without_store_does_not_watch() -> Result<()> {
        let service = UploadService::new(None, Duration::from_secs(60));
        assert!(!service.start_upload_watcher(Path::new("videos"))?);
        assert!(!service.is_watching());
        assert!(!service.stop_upload_watcher()?);
        Ok(())
    }

    #[test]
    fn watcher_uploads_immediately_and_stops() -> Result<()> {
        let videos = tempfile::tempdir()?;
        let target = tempfile::tempdir()?;
        std::fs::write(videos.path().join("clip.gif"), b"GIF89a")?;

        let service = UploadService::new(
            Some(Arc::new(DirectoryStore::new(target.path()))),
            Duration::from_secs(60),
        );
        assert!(service.start_upload_watcher(videos.path())?);
        assert!(service.is_watching());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while videos.path().join("clip.gif").exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(target.path().join("clip.gif").exists());
        assert!(service.stop_upload_watcher()?);
        assert!(!service.is_watching());
        Ok(())
    }
}
