// The command surface: everything the presentation layer can ask for

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::db::CatalogStore;
use crate::error::{Error, Result};
use crate::models::{ScanReport, Settings, VideoEntry};
use crate::scanner::Scanner;
use crate::services::playback::PlaybackDispatcher;

/// Shared core behind every command. Cheap to clone.
#[derive(Clone)]
pub struct Library {
    inner: Arc<Inner>,
}

struct Inner {
    store: CatalogStore,
    scanner: Scanner,
    playback: PlaybackDispatcher,
    /// Settings written on first load when no record exists yet
    first_run: Settings,
    /// Held for the whole of a scan; `try_lock` failing means one is running
    scan_lock: Mutex<()>,
    active_scan: std::sync::Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl Library {
    pub fn new(
        store: CatalogStore,
        scanner: Scanner,
        playback: PlaybackDispatcher,
        first_run: Settings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                scanner,
                playback,
                first_run,
                scan_lock: Mutex::new(()),
                active_scan: std::sync::Mutex::new(None),
                shutdown,
            }),
        }
    }

    /// Scan one folder or video file
    pub async fn scan_folder(&self, root: &Path) -> Result<ScanReport> {
        self.scan_roots(&[root.to_path_buf()]).await
    }

    /// Scan several roots as one pass. Rejected while another scan runs.
    pub async fn scan_roots(&self, roots: &[PathBuf]) -> Result<ScanReport> {
        let Ok(_guard) = self.inner.scan_lock.try_lock() else {
            tracing::warn!("Scan requested while another is running");
            return Err(Error::ScanInProgress);
        };

        let cancel = self.inner.shutdown.child_token();
        // Cleared on drop, also when the caller abandons the scan mid-way
        let _active = ActiveScan::start(self, cancel.clone());

        let settings = self.load_settings().await?;
        self.inner.scanner.scan(roots, &settings, &cancel).await
    }

    /// Ask the running scan to stop. Returns whether one was running.
    pub fn cancel_scan(&self) -> bool {
        match self.active_scan() {
            Some(token) => {
                tracing::info!("Cancelling running scan");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.active_scan().is_some()
    }

    fn active_scan(&self) -> Option<CancellationToken> {
        self.inner
            .active_scan
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_active_scan(&self, token: Option<CancellationToken>) {
        match self.inner.active_scan.lock() {
            Ok(mut slot) => *slot = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub async fn get_cached_videos(&self) -> Result<Vec<VideoEntry>> {
        self.inner.store.get_all().await
    }

    /// Forget an entry and its cached poster. Unknown ids are fine.
    pub async fn remove_video(&self, id: &str) -> Result<()> {
        self.inner.store.delete(id).await?;
        self.inner.scanner.thumbnails().remove_cached(id).await;
        Ok(())
    }

    /// Best-effort recursive delete of a folder on disk. Never fails;
    /// problems are only logged.
    pub async fn delete_folder_if_exists(&self, path: &Path) {
        match tokio::fs::metadata(path).await {
            Ok(m) if m.is_dir() => match tokio::fs::remove_dir_all(path).await {
                Ok(()) => tracing::info!("Deleted folder {}", path.display()),
                Err(e) => tracing::warn!("Failed to delete folder {}: {}", path.display(), e),
            },
            Ok(_) => tracing::warn!("Not a folder, leaving it alone: {}", path.display()),
            Err(_) => tracing::debug!("Folder already gone: {}", path.display()),
        }
    }

    /// Launch the entry's player; returns the entry with updated statistics
    pub async fn play_video(&self, id: &str) -> Result<VideoEntry> {
        let settings = self.load_settings().await?;
        self.inner.playback.play(id, &settings).await
    }

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<VideoEntry> {
        self.inner
            .store
            .set_favorite(id, favorite)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub async fn load_settings(&self) -> Result<Settings> {
        self.inner.store.load_settings(&self.inner.first_run).await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.inner.store.save_settings(settings).await
    }
}

/// Publishes the running scan's token for `cancel_scan` while alive
struct ActiveScan<'a> {
    library: &'a Library,
}

impl<'a> ActiveScan<'a> {
    fn start(library: &'a Library, token: CancellationToken) -> Self {
        library.set_active_scan(Some(token));
        Self { library }
    }
}

impl Drop for ActiveScan<'_> {
    fn drop(&mut self) {
        self.library.set_active_scan(None);
    }
}
