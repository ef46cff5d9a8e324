use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};

use super::mediainfo::MediaProbe;
use super::tmdb::{EpisodeInfo, TitleMetadata, TmdbClient, TmdbEndpoints};
use crate::error::{Error, Result};
use crate::models::{Settings, VideoEntry};
use crate::scanner::classifier::Episode;
use crate::scanner::filename;

/// What the orchestrator hands the extractor for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Movie(PathBuf),
    Episode(Episode),
}

impl ScanItem {
    pub fn path(&self) -> &Path {
        match self {
            ScanItem::Movie(path) => path,
            ScanItem::Episode(episode) => &episode.path,
        }
    }
}

/// A built entry plus the remote poster it could use, if any
#[derive(Debug, Clone)]
pub struct Extracted {
    pub entry: VideoEntry,
    pub poster_url: Option<String>,
}

type SeriesCache = Mutex<HashMap<String, Arc<OnceCell<Option<TitleMetadata>>>>>;
type SeasonCache = Mutex<HashMap<(i64, u32), Arc<OnceCell<Vec<EpisodeInfo>>>>>;

/// TMDB client with per-scan caches, so a season of episodes costs one
/// search and one season request no matter how many workers ask.
struct TmdbLookup {
    client: TmdbClient,
    series: SeriesCache,
    seasons: SeasonCache,
}

impl TmdbLookup {
    async fn series(&self, name: &str) -> Option<TitleMetadata> {
        let cell = {
            let mut series = self.series.lock().await;
            series
                .entry(name.to_lowercase())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_init(|| async {
            match self.client.find_series(name).await {
                Ok(found) => {
                    if found.is_none() {
                        tracing::debug!("No TMDB match for series: {}", name);
                    }
                    found
                }
                Err(e) => {
                    tracing::warn!("{}", Error::ExternalLookup(format!("series '{}': {:#}", name, e)));
                    None
                }
            }
        })
        .await
        .clone()
    }

    async fn episode(&self, tv_id: i64, season: u32, episode: u32) -> Option<EpisodeInfo> {
        let cell = {
            let mut seasons = self.seasons.lock().await;
            seasons
                .entry((tv_id, season))
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let episodes = cell
            .get_or_init(|| async {
                match self.client.get_season_details(tv_id, season).await {
                    Ok(details) => details.episodes,
                    Err(e) => {
                        tracing::warn!(
                            "{}",
                            Error::ExternalLookup(format!("TMDB {} season {}: {:#}", tv_id, season, e))
                        );
                        Vec::new()
                    }
                }
            })
            .await;

        episodes
            .iter()
            .find(|e| u32::try_from(e.episode_number).ok() == Some(episode))
            .cloned()
    }
}

/// Builds catalog entries from files: names, probe results, and TMDB
pub struct MetadataExtractor {
    probe: MediaProbe,
    tmdb: Option<TmdbLookup>,
}

impl MetadataExtractor {
    /// Extractor that never goes online
    pub fn offline(probe: MediaProbe) -> Self {
        Self { probe, tmdb: None }
    }

    /// TMDB lookups are enabled when the settings carry an active key
    pub fn new(
        probe: MediaProbe,
        settings: &Settings,
        endpoints: &TmdbEndpoints,
        request_timeout: Duration,
    ) -> Self {
        let tmdb = settings.active_tmdb_key().and_then(|key| {
            match TmdbClient::new(
                key.to_string(),
                settings.tmdb_language.clone(),
                endpoints.clone(),
                request_timeout,
            ) {
                Ok(client) => Some(TmdbLookup {
                    client,
                    series: Mutex::new(HashMap::new()),
                    seasons: Mutex::new(HashMap::new()),
                }),
                Err(e) => {
                    tracing::warn!("TMDB disabled for this scan: {:#}", e);
                    None
                }
            }
        });

        Self { probe, tmdb }
    }

    /// Build the entry for one file. Lookup and probe failures only leave
    /// fields at their defaults; a missing or nameless file is an error.
    pub async fn extract(&self, item: &ScanItem) -> Result<Extracted> {
        let path = item.path();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| Error::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(Error::Extraction {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Extraction {
                path: path.to_path_buf(),
                reason: "file has no name".to_string(),
            })?;

        let mut entry = VideoEntry::new(path, chrono::Utc::now().timestamp());
        entry.original_title = stem.clone();

        let poster_url = match item {
            ScanItem::Movie(_) => self.fill_movie(&mut entry, &stem).await,
            ScanItem::Episode(episode) => self.fill_episode(&mut entry, episode, &stem).await,
        };

        match self.probe.probe(path).await {
            Ok(info) => {
                entry.duration = info.formatted_duration();
                entry.tags = info.tags();
            }
            Err(e) => tracing::debug!("No media info for {}: {:#}", path.display(), e),
        }

        Ok(Extracted { entry, poster_url })
    }

    async fn fill_movie(&self, entry: &mut VideoEntry, stem: &str) -> Option<String> {
        let parsed = filename::parse_movie(stem);
        entry.title = if parsed.title.is_empty() {
            stem.to_string()
        } else {
            parsed.title.clone()
        };

        let tmdb = self.tmdb.as_ref()?;
        if parsed.title.is_empty() {
            return None;
        }

        match tmdb.client.find_movie(&parsed.title, parsed.year).await {
            Ok(Some(meta)) => {
                tracing::debug!("TMDB match for '{}': {} ({})", stem, meta.title, meta.tmdb_id);
                apply_title_metadata(entry, &meta);
                meta.poster_url
            }
            Ok(None) => {
                tracing::debug!("No TMDB match for movie: {}", parsed.title);
                None
            }
            Err(e) => {
                tracing::warn!(
                    "{}",
                    Error::ExternalLookup(format!("movie '{}': {:#}", parsed.title, e))
                );
                None
            }
        }
    }

    async fn fill_episode(&self, entry: &mut VideoEntry, episode: &Episode, stem: &str) -> Option<String> {
        entry.is_series = true;
        entry.season = episode.season;
        entry.episode = episode.episode;
        entry.episode_title = episode.episode_title.clone();
        entry.series_title = episode.series_title.clone();
        entry.title = if episode.series_title.is_empty() {
            let cleaned = filename::clean_title(stem);
            if cleaned.is_empty() {
                stem.to_string()
            } else {
                cleaned
            }
        } else {
            episode.series_title.clone()
        };

        let tmdb = self.tmdb.as_ref()?;
        if episode.series_title.is_empty() {
            return None;
        }

        let meta = tmdb.series(&episode.series_title).await?;
        apply_title_metadata(entry, &meta);

        if let Some(info) = tmdb.episode(meta.tmdb_id, episode.season, episode.episode).await {
            if !info.name.trim().is_empty() {
                entry.episode_title = info.name;
            }
            entry.episode_overview = info.overview.unwrap_or_default();
        }

        meta.poster_url
    }
}

fn apply_title_metadata(entry: &mut VideoEntry, meta: &TitleMetadata) {
    if !meta.title.trim().is_empty() {
        entry.title = meta.title.clone();
    }
    entry.description = meta.overview.clone().unwrap_or_default();
    entry.category = meta.genres.join(", ");
}
