// Poster resolution: local artwork first, then a cached or downloaded copy

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::models::{VideoEntry, PLACEHOLDER_THUMBNAIL};
use crate::scanner::filename;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const GENERIC_POSTER_NAMES: &[&str] = &["poster", "folder", "cover", "thumb"];

pub struct ThumbnailResolver {
    thumbnail_dir: PathBuf,
    client: Client,
    grace: Duration,
}

impl ThumbnailResolver {
    pub fn new(thumbnail_dir: PathBuf, request_timeout: Duration, grace: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            thumbnail_dir,
            client,
            grace,
        }
    }

    /// Where a downloaded poster for `id` lives
    pub fn cache_path(&self, id: &str) -> PathBuf {
        self.thumbnail_dir.join(format!("{}.jpg", id))
    }

    /// Thumbnail reference for an entry. Never fails; the placeholder is
    /// the answer of last resort.
    ///
    /// With `download` off, nothing from the poster cache is used either.
    pub async fn resolve(&self, entry: &VideoEntry, poster_url: Option<&str>, download: bool) -> String {
        if let Some(local) = find_local_poster(entry).await {
            return local.to_string_lossy().into_owned();
        }
        if !download {
            return PLACEHOLDER_THUMBNAIL.to_string();
        }

        let cached = self.cache_path(&entry.id);
        if tokio::fs::try_exists(&cached).await.unwrap_or(false) {
            return cached.to_string_lossy().into_owned();
        }

        let Some(url) = poster_url else {
            return PLACEHOLDER_THUMBNAIL.to_string();
        };

        match tokio::time::timeout(self.grace, self.download(url, &cached)).await {
            Ok(Ok(())) => cached.to_string_lossy().into_owned(),
            Ok(Err(e)) => {
                tracing::warn!("Poster download failed for {}: {:#}", entry.path, e);
                PLACEHOLDER_THUMBNAIL.to_string()
            }
            Err(_) => {
                tracing::warn!(
                    "Poster download for {} exceeded {:?}, using placeholder",
                    entry.path,
                    self.grace
                );
                PLACEHOLDER_THUMBNAIL.to_string()
            }
        }
    }

    /// Drop the cached poster of a forgotten entry, if there is one
    pub async fn remove_cached(&self, id: &str) {
        let cached = self.cache_path(id);
        match tokio::fs::remove_file(&cached).await {
            Ok(()) => tracing::debug!("Removed cached poster {}", cached.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove cached poster {}: {}", cached.display(), e),
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Image request failed with status {}", response.status());
        }

        let bytes = response.bytes().await.context("Failed to read image body")?;
        if bytes.is_empty() {
            anyhow::bail!("Empty image body");
        }

        tokio::fs::create_dir_all(&self.thumbnail_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.thumbnail_dir.display()))?;

        // Write beside the target and rename, so readers never see half a file
        let partial = dest.with_extension("jpg.part");
        tokio::fs::write(&partial, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        tokio::fs::rename(&partial, dest)
            .await
            .with_context(|| format!("Failed to move poster into {}", dest.display()))?;

        tracing::debug!("Downloaded poster to {}", dest.display());
        Ok(())
    }
}

/// Image files in `dir`, keyed by lowercase file name
async fn list_images(dir: &Path) -> HashMap<String, PathBuf> {
    let mut images = HashMap::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return images;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                images.insert(name.to_lowercase(), path);
            }
        }
    }
    images
}

fn pick(images: &HashMap<String, PathBuf>, bases: &[String]) -> Option<PathBuf> {
    bases.iter().find_map(|base| {
        IMAGE_EXTENSIONS
            .iter()
            .find_map(|ext| images.get(&format!("{}.{}", base, ext)).cloned())
    })
}

/// Artwork next to the video: `<stem>-poster`, `<stem>`, then the generic
/// names. Episodes in a season folder also look in the show folder.
pub async fn find_local_poster(entry: &VideoEntry) -> Option<PathBuf> {
    let video = entry.file_path();
    let dir = video.parent()?;
    let stem = video.file_stem()?.to_string_lossy().to_lowercase();

    let mut bases = vec![format!("{}-poster", stem), stem];
    bases.extend(GENERIC_POSTER_NAMES.iter().map(|n| n.to_string()));

    if let Some(found) = pick(&list_images(dir).await, &bases) {
        return Some(found);
    }

    let in_season_folder = dir
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(filename::season_folder_number)
        .is_some();
    if entry.is_series && in_season_folder {
        let show_dir = dir.parent()?;
        let generic: Vec<String> = GENERIC_POSTER_NAMES.iter().map(|n| n.to_string()).collect();
        return pick(&list_images(show_dir).await, &generic);
    }

    None
}
