// Library scanner: walks roots, classifies folders, extracts and stores new videos

pub mod classifier;
pub mod filename;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::db::CatalogStore;
use crate::error::{Error, Result};
use crate::models::{video_id, ScanReport, Settings, SkippedItem, VideoEntry};
use crate::services::mediainfo::MediaProbe;
use crate::services::metadata::{MetadataExtractor, ScanItem};
use crate::services::thumbnail::ThumbnailResolver;
use crate::services::tmdb::TmdbEndpoints;
use classifier::{ChildEntry, Classification, PathClassifier};

/// What the walk found before any extraction work
#[derive(Default)]
struct Discovery {
    items: Vec<(String, ScanItem)>,
    skipped: Vec<SkippedItem>,
    visited: HashSet<PathBuf>,
    seen_ids: HashSet<String>,
}

impl Discovery {
    fn skip(&mut self, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Skipping {}: {}", path.display(), reason);
        self.skipped.push(SkippedItem {
            path: path.to_string_lossy().into_owned(),
            reason,
        });
    }

    /// Queue a video under its canonical path; the first route to a file wins
    async fn push(&mut self, item: ScanItem) {
        let canonical = fs::canonicalize(item.path())
            .await
            .unwrap_or_else(|_| item.path().to_path_buf());
        let item = match item {
            ScanItem::Movie(_) => ScanItem::Movie(canonical),
            ScanItem::Episode(mut episode) => {
                episode.path = canonical;
                ScanItem::Episode(episode)
            }
        };

        let id = video_id(item.path());
        if self.seen_ids.insert(id.clone()) {
            self.items.push((id, item));
        } else {
            tracing::debug!("Already queued via another path: {}", item.path().display());
        }
    }
}

/// Runs scan passes against the catalog
pub struct Scanner {
    store: CatalogStore,
    classifier: PathClassifier,
    probe: MediaProbe,
    thumbnails: ThumbnailResolver,
    tmdb_endpoints: TmdbEndpoints,
    request_timeout: Duration,
    workers: usize,
}

impl Scanner {
    pub fn new(
        store: CatalogStore,
        classifier: PathClassifier,
        probe: MediaProbe,
        thumbnails: ThumbnailResolver,
        tmdb_endpoints: TmdbEndpoints,
        request_timeout: Duration,
        workers: usize,
    ) -> Self {
        Self {
            store,
            classifier,
            probe,
            thumbnails,
            tmdb_endpoints,
            request_timeout,
            workers: workers.max(1),
        }
    }

    pub fn thumbnails(&self) -> &ThumbnailResolver {
        &self.thumbnails
    }

    pub fn from_config(store: CatalogStore, config: &AppConfig) -> Self {
        Self::new(
            store,
            PathClassifier::new(&config.scanner.video_extensions),
            MediaProbe::new(config.ffprobe_path.clone(), config.scanner.probe_timeout()),
            ThumbnailResolver::new(
                config.paths.thumbnail_dir(),
                config.request_timeout,
                config.scanner.thumbnail_grace(),
            ),
            config.tmdb_endpoints.clone(),
            config.request_timeout,
            config.scanner.effective_workers(),
        )
    }

    /// Scan `roots` and store every video not yet catalogued.
    ///
    /// A missing or unreadable root fails the whole pass. Anything below a
    /// root that cannot be read or extracted lands in `skipped`. Entries
    /// stored before a cancellation stay stored.
    pub async fn scan(
        &self,
        roots: &[PathBuf],
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        let started = std::time::Instant::now();
        let mut report = ScanReport::default();
        let mut discovery = Discovery::default();

        let mut root_kinds = Vec::with_capacity(roots.len());
        for root in roots {
            let metadata = fs::metadata(root).await.map_err(|e| Error::io(root, e))?;
            if metadata.is_file() && !self.classifier.is_video(root) {
                return Err(Error::InvalidArgument(format!(
                    "{} is neither a folder nor a video file",
                    root.display()
                )));
            }
            root_kinds.push(metadata.is_dir());
        }

        for (root, is_dir) in roots.iter().zip(root_kinds) {
            tracing::info!("Scanning {}", root.display());
            if is_dir {
                Box::pin(self.walk(root, true, &mut discovery, cancel)).await?;
            } else {
                discovery.push(ScanItem::Movie(root.clone())).await;
            }
        }

        report.skipped = std::mem::take(&mut discovery.skipped);

        if cancel.is_cancelled() {
            tracing::info!("Scan cancelled during discovery");
            report.cancelled = true;
            return Ok(report);
        }

        let mut pending = Vec::new();
        for (id, item) in discovery.items {
            if self.store.exists(&id).await? {
                report.unchanged += 1;
            } else {
                pending.push(item);
            }
        }

        tracing::info!(
            "Discovered {} new and {} known videos",
            pending.len(),
            report.unchanged
        );

        self.extract_and_store(pending, settings, cancel, &mut report)
            .await?;

        tracing::info!(
            "Scan finished in {:.1}s: {} added, {} skipped, {} unchanged{}",
            started.elapsed().as_secs_f64(),
            report.added.len(),
            report.skipped.len(),
            report.unchanged,
            if report.cancelled { " (cancelled)" } else { "" }
        );

        Ok(report)
    }

    /// Depth-first, name-ordered walk of one directory
    async fn walk(
        &self,
        dir: &Path,
        is_root: bool,
        discovery: &mut Discovery,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let canonical = match fs::canonicalize(dir).await {
            Ok(path) => path,
            Err(e) if is_root => return Err(Error::io(dir, e)),
            Err(e) => {
                discovery.skip(dir, e.to_string());
                return Ok(());
            }
        };
        if !discovery.visited.insert(canonical) {
            tracing::debug!("Already visited, not following: {}", dir.display());
            return Ok(());
        }

        if fs::try_exists(dir.join(".ignore")).await.unwrap_or(false) {
            tracing::debug!("Skipping ignored folder: {}", dir.display());
            return Ok(());
        }

        let children = match read_children(dir).await {
            Ok(children) => children,
            Err(e) if is_root => return Err(Error::io(dir, e)),
            Err(e) => {
                discovery.skip(dir, e.to_string());
                return Ok(());
            }
        };

        let classification = self.classifier.classify(dir, true, &children);
        let owns_subfolders = classifier::owns_subfolders(dir, &classification);
        match classification {
            Classification::SeriesFolder { episodes, .. } => {
                tracing::debug!("Series folder with {} episodes: {}", episodes.len(), dir.display());
                for episode in episodes {
                    discovery.push(ScanItem::Episode(episode)).await;
                }
            }
            Classification::SingleVideo { path } => {
                tracing::debug!("Movie folder: {}", dir.display());
                discovery.push(ScanItem::Movie(path)).await;
            }
            Classification::NotVideo => {
                for child in children.iter().filter(|c| !c.is_dir) {
                    if let Classification::SingleVideo { path } =
                        self.classifier.classify(&child.path, false, &[])
                    {
                        discovery.push(ScanItem::Movie(path)).await;
                    }
                }
            }
        }

        for child in children.iter().filter(|c| c.is_dir) {
            let Some(name) = child.path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if filename::should_skip_folder(name) {
                tracing::debug!("Skipping special folder: {}", name);
                continue;
            }
            // Below a titled movie or series folder only seasons are separate units
            if owns_subfolders && filename::season_folder_number(name).is_none() {
                tracing::info!(
                    "Treating {} as extras of {}, not scanning it",
                    child.path.display(),
                    dir.display()
                );
                continue;
            }
            Box::pin(self.walk(&child.path, false, discovery, cancel)).await?;
        }

        Ok(())
    }

    /// Extract in parallel, store in discovery order
    async fn extract_and_store(
        &self,
        pending: Vec<ScanItem>,
        settings: &Settings,
        cancel: &CancellationToken,
        report: &mut ScanReport,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let extractor = MetadataExtractor::new(
            self.probe.clone(),
            settings,
            &self.tmdb_endpoints,
            self.request_timeout,
        );
        let download = settings.tmdb_enabled && settings.tmdb_download_posters;

        let mut results = futures::stream::iter(pending)
            .map(|item| {
                let extractor = &extractor;
                async move {
                    let built = self.build_entry(extractor, &item, download).await;
                    (item, built)
                }
            })
            .buffered(self.workers);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Scan cancelled, keeping {} stored entries", report.added.len());
                    report.cancelled = true;
                    break;
                }
                next = results.next() => {
                    let Some((item, built)) = next else {
                        break;
                    };
                    match built {
                        Ok(entry) => {
                            let stored = self.store.upsert(&entry).await?;
                            tracing::debug!("Added {} ({})", stored.title, stored.path);
                            report.added.push(stored);
                        }
                        Err(e) => {
                            tracing::warn!("{}", e);
                            report.skipped.push(SkippedItem {
                                path: item.path().to_string_lossy().into_owned(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn build_entry(
        &self,
        extractor: &MetadataExtractor,
        item: &ScanItem,
        download: bool,
    ) -> Result<VideoEntry> {
        let extracted = extractor.extract(item).await?;
        let mut entry = extracted.entry;
        entry.thumbnail = self
            .thumbnails
            .resolve(&entry, extracted.poster_url.as_deref(), download)
            .await;
        Ok(entry)
    }
}

/// Direct children sorted by name. Symlinks are followed; dangling ones are dropped.
async fn read_children(dir: &Path) -> std::io::Result<Vec<ChildEntry>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut children = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match fs::metadata(&path).await {
            Ok(metadata) => children.push(ChildEntry {
                path,
                is_dir: metadata.is_dir(),
            }),
            Err(e) => tracing::debug!("Ignoring unreadable entry {}: {}", path.display(), e),
        }
    }

    children.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PLACEHOLDER_THUMBNAIL;
    use crate::services::tmdb::tests::fixture_server;
    use tempfile::TempDir;

    async fn scanner(cache: &Path) -> Scanner {
        scanner_with(cache, TmdbEndpoints::default(), Duration::from_secs(1), 2).await
    }

    async fn scanner_with(
        cache: &Path,
        endpoints: TmdbEndpoints,
        request_timeout: Duration,
        workers: usize,
    ) -> Scanner {
        let store = crate::db::memory_store().await;
        Scanner::new(
            store,
            PathClassifier::new(["mkv", "mp4"]),
            MediaProbe::new(Some(cache.join("no-such-ffprobe")), Duration::from_secs(5)),
            ThumbnailResolver::new(cache.join("thumbnails"), request_timeout, Duration::from_secs(5)),
            endpoints,
            request_timeout,
            workers,
        )
    }

    fn online_settings() -> Settings {
        Settings {
            tmdb_enabled: true,
            tmdb_api_key: Some("test-key".to_string()),
            ..Settings::default()
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"not really video").unwrap();
    }

    async fn scan(scanner: &Scanner, root: &Path) -> ScanReport {
        scanner
            .scan(&[root.to_path_buf()], &Settings::default(), &CancellationToken::new())
            .await
            .unwrap()
    }

    fn names(report: &ScanReport) -> Vec<String> {
        report
            .added
            .iter()
            .map(|e| {
                Path::new(&e.path)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_scan_twice_is_idempotent() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Heat (1995)/Heat.1995.1080p.mkv"));
        touch(&root.path().join("clips/birthday.mp4"));
        touch(&root.path().join("clips/holiday.mp4"));

        let scanner = scanner(cache.path()).await;
        let first = scan(&scanner, root.path()).await;
        assert_eq!(first.added.len(), 3);
        assert!(first.skipped.is_empty());

        let second = scan(&scanner, root.path()).await;
        assert!(second.added.is_empty());
        assert_eq!(second.unchanged, 3);
        assert_eq!(scanner.store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_series_folder_becomes_episodes() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Show Name/Show.Name.S01E02.mkv"));
        touch(&root.path().join("Show Name/Show.Name.S01E01.mkv"));

        let report = scan(&scanner(cache.path()).await, root.path()).await;

        assert_eq!(names(&report), vec!["Show.Name.S01E01.mkv", "Show.Name.S01E02.mkv"]);
        assert!(report.added.iter().all(|e| e.is_series && e.season == 1));
        assert_eq!(report.added[0].episode, 1);
        assert_eq!(report.added[1].episode, 2);
        assert_eq!(report.added[0].series_title, "Show Name");
    }

    #[tokio::test]
    async fn test_movie_folder_is_not_descended() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Heat (1995)/Heat.1995.mkv"));
        touch(&root.path().join("Heat (1995)/Featurette/behind.mkv"));

        let report = scan(&scanner(cache.path()).await, root.path()).await;
        assert_eq!(names(&report), vec!["Heat.1995.mkv"]);
        assert_eq!(report.added[0].title, "Heat");
    }

    #[tokio::test]
    async fn test_movie_folder_as_root_is_not_descended() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let movie = root.path().join("Heat (1995)");
        touch(&movie.join("Heat.1995.mkv"));
        touch(&movie.join("Featurette/behind.mkv"));

        let report = scan(&scanner(cache.path()).await, &movie).await;
        assert_eq!(names(&report), vec!["Heat.1995.mkv"]);
    }

    #[tokio::test]
    async fn test_stray_video_does_not_hide_movie_folders() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Movies/intro.mp4"));
        touch(&root.path().join("Movies/Heat (1995)/Heat.mkv"));
        touch(&root.path().join("Movies/Ronin (1998)/Ronin.mkv"));

        let report = scan(&scanner(cache.path()).await, root.path()).await;
        assert_eq!(names(&report), vec!["intro.mp4", "Heat.mkv", "Ronin.mkv"]);
        assert!(report.skipped.is_empty());

        let movies = root.path().join("Movies");
        let report = scan(&scanner(cache.path()).await, &movies).await;
        assert_eq!(report.added.len(), 3);
    }

    #[tokio::test]
    async fn test_bare_episodes_do_not_hide_subfolders() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Downloads/第01集.mkv"));
        touch(&root.path().join("Downloads/第02集.mkv"));
        touch(&root.path().join("Downloads/Heat (1995)/Heat.mkv"));

        let report = scan(&scanner(cache.path()).await, root.path()).await;
        assert_eq!(names(&report), vec!["第01集.mkv", "第02集.mkv", "Heat.mkv"]);
    }

    #[tokio::test]
    async fn test_series_with_season_folders() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Show/Season 1/Show.S01E01.mkv"));
        touch(&root.path().join("Show/Season 2/Show.S02E01.mkv"));

        let report = scan(&scanner(cache.path()).await, root.path()).await;
        let seasons: Vec<_> = report.added.iter().map(|e| (e.season, e.episode)).collect();
        assert_eq!(seasons, vec![(1, 1), (2, 1)]);
    }

    #[tokio::test]
    async fn test_placeholder_and_sibling_posters() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Heat (1995)/Heat.mkv"));
        touch(&root.path().join("Heat (1995)/poster.jpg"));
        touch(&root.path().join("Ronin (1998)/Ronin.mkv"));

        let report = scan(&scanner(cache.path()).await, root.path()).await;
        let heat = report.added.iter().find(|e| e.path.ends_with("Heat.mkv")).unwrap();
        let ronin = report.added.iter().find(|e| e.path.ends_with("Ronin.mkv")).unwrap();
        assert!(heat.thumbnail.ends_with("poster.jpg"));
        assert_eq!(ronin.thumbnail, PLACEHOLDER_THUMBNAIL);
    }

    #[tokio::test]
    async fn test_single_file_root() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let file = root.path().join("Heat.mkv");
        touch(&file);

        let report = scan(&scanner(cache.path()).await, &file).await;
        assert_eq!(report.added.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_io_error() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let err = scanner(cache.path())
            .await
            .scan(
                &[root.path().join("nope")],
                &Settings::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[tokio::test]
    async fn test_non_video_file_root_is_rejected() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let file = root.path().join("notes.txt");
        touch(&file);

        let err = scanner(cache.path())
            .await
            .scan(&[file], &Settings::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_rename_creates_new_entry() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let file = root.path().join("a.mkv");
        touch(&file);

        let scanner = scanner(cache.path()).await;
        let first = scan(&scanner, root.path()).await;
        std::fs::rename(&file, root.path().join("b.mkv")).unwrap();
        let second = scan(&scanner, root.path()).await;

        assert_eq!(second.added.len(), 1);
        assert_ne!(first.added[0].id, second.added[0].id);
        assert_eq!(scanner.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_scan_adds_nothing() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("a.mkv"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let scanner = scanner(cache.path()).await;
        let report = scanner
            .scan(&[root.path().to_path_buf()], &Settings::default(), &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.added.is_empty());
        assert_eq!(scanner.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cached_poster_unused_when_lookup_is_off() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let file = root.path().join("Heat.mkv");
        touch(&file);

        let scanner = scanner(cache.path()).await;
        let id = video_id(&std::fs::canonicalize(&file).unwrap());
        touch(&scanner.thumbnails().cache_path(&id));

        let report = scan(&scanner, root.path()).await;
        assert_eq!(report.added[0].id, id);
        assert_eq!(report.added[0].thumbnail, PLACEHOLDER_THUMBNAIL);
    }

    #[tokio::test]
    async fn test_lookup_and_poster_download() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Heat (1995)/Heat.1995.mkv"));

        let scanner =
            scanner_with(cache.path(), fixture_server().await, Duration::from_secs(5), 2).await;
        let report = scanner
            .scan(&[root.path().to_path_buf()], &online_settings(), &CancellationToken::new())
            .await
            .unwrap();

        let heat = &report.added[0];
        assert_eq!(heat.category, "Action, Crime");
        assert_eq!(PathBuf::from(&heat.thumbnail), scanner.thumbnails().cache_path(&heat.id));
    }

    #[tokio::test]
    async fn test_cancel_mid_extraction_keeps_stored_entries() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("Heat.mkv"));
        touch(&root.path().join("Slow.mkv"));

        // One worker: Slow's lookup starts only once Heat is stored, then hangs
        let scanner =
            scanner_with(cache.path(), fixture_server().await, Duration::from_secs(30), 1).await;
        let cancel = CancellationToken::new();
        let store = scanner.store.clone();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            while store.count().await.unwrap_or(0) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            trigger.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            scanner.scan(&[root.path().to_path_buf()], &online_settings(), &cancel),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(names(&report), vec!["Heat.mkv"]);
        assert_eq!(scanner.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ignore_marker_and_skip_folders() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("keep/a.mkv"));
        touch(&root.path().join("keep/b.mkv"));
        touch(&root.path().join("private/.ignore"));
        touch(&root.path().join("private/c.mkv"));
        touch(&root.path().join("Extras/d.mkv"));

        let report = scan(&scanner(cache.path()).await, root.path()).await;
        assert_eq!(names(&report), vec!["a.mkv", "b.mkv"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_and_duplicate_routes() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        touch(&root.path().join("a/one.mkv"));
        touch(&root.path().join("a/two.mkv"));
        std::os::unix::fs::symlink(root.path(), root.path().join("a/loop")).unwrap();
        std::fs::create_dir_all(root.path().join("b")).unwrap();
        std::os::unix::fs::symlink(root.path().join("a/one.mkv"), root.path().join("b/link.mkv"))
            .unwrap();

        let report = scan(&scanner(cache.path()).await, root.path()).await;
        assert_eq!(names(&report), vec!["one.mkv", "two.mkv"]);
    }
}
