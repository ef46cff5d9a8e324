// Path classification: movie file, series folder, or neither

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use super::filename::{self, extract_year_from_name, parse_episode};
use crate::services::tmdb::title_matches;

/// One child of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl ChildEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub path: PathBuf,
    pub series_title: String,
    pub season: u32,
    pub episode: u32,
    pub episode_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    NotVideo,
    SingleVideo { path: PathBuf },
    /// Episodes ordered by (season, episode, file name)
    SeriesFolder {
        path: PathBuf,
        episodes: Vec<Episode>,
    },
}

/// Decides what a filesystem entry is, based on names alone
#[derive(Debug, Clone)]
pub struct PathClassifier {
    extensions: HashSet<String>,
}

impl PathClassifier {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Classify a file, or a directory given its direct children
    pub fn classify(&self, path: &Path, is_dir: bool, children: &[ChildEntry]) -> Classification {
        if !is_dir {
            return if self.is_video(path) {
                Classification::SingleVideo {
                    path: path.to_path_buf(),
                }
            } else {
                Classification::NotVideo
            };
        }

        let mut videos: Vec<&Path> = children
            .iter()
            .filter(|c| !c.is_dir && self.is_video(&c.path))
            .map(|c| c.path.as_path())
            .collect();
        videos.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        match videos.as_slice() {
            [] => Classification::NotVideo,
            [only] => match self.series_folder(path, &videos) {
                Some(series) => series,
                None => Classification::SingleVideo {
                    path: only.to_path_buf(),
                },
            },
            _ => self
                .series_folder(path, &videos)
                .unwrap_or(Classification::NotVideo),
        }
    }

    /// Build a series folder when enough names carry an episode marker.
    /// A lone video needs one marker, anything larger needs two.
    fn series_folder(&self, dir: &Path, videos: &[&Path]) -> Option<Classification> {
        let season_hint = dir_name(dir).and_then(filename::season_folder_number);
        let parsed: Vec<_> = videos
            .iter()
            .map(|v| (*v, parse_episode(&file_stem(v))))
            .collect();

        let matched = parsed.iter().filter(|(_, p)| p.is_some()).count();
        let needed = if videos.len() == 1 { 1 } else { 2 };
        if matched < needed {
            return None;
        }

        let series_title = parsed
            .iter()
            .filter_map(|(_, p)| p.as_ref())
            .map(|p| p.show_name.clone())
            .find(|name| !name.is_empty())
            .unwrap_or_else(|| folder_series_title(dir));

        let default_season = season_hint.unwrap_or(1);
        let mut episodes = Vec::with_capacity(parsed.len());
        let mut unmatched = Vec::new();

        for (path, parsed) in parsed {
            match parsed {
                Some(p) => episodes.push(Episode {
                    path: path.to_path_buf(),
                    series_title: series_title.clone(),
                    season: p.season.unwrap_or(default_season),
                    episode: p.episode,
                    episode_title: p.episode_title,
                }),
                None => unmatched.push(path),
            }
        }

        // Unmatched files fill the lowest free numbers, in file-name order
        let mut taken: BTreeSet<u32> = episodes
            .iter()
            .filter(|e| e.season == default_season)
            .map(|e| e.episode)
            .collect();
        let mut next = 1;
        for path in unmatched {
            while taken.contains(&next) {
                next += 1;
            }
            taken.insert(next);
            tracing::debug!(
                "No episode marker in {}, assigning S{:02}E{:02}",
                path.display(),
                default_season,
                next
            );
            episodes.push(Episode {
                path: path.to_path_buf(),
                series_title: series_title.clone(),
                season: default_season,
                episode: next,
                episode_title: filename::clean_title(&file_stem(path)),
            });
        }

        episodes.sort_by(|a, b| {
            (a.season, a.episode, a.path.file_name()).cmp(&(b.season, b.episode, b.path.file_name()))
        });

        Some(Classification::SeriesFolder {
            path: dir.to_path_buf(),
            episodes,
        })
    }
}

/// Whether a movie or series folder owns its non-season subfolders, so they
/// hold its extras rather than titles of their own.
///
/// A folder owns them when the name of the title it holds matches the folder
/// name: `Heat (1995)/Heat.1995.mkv` does, `Movies/intro.mp4` does not.
/// Season folders always belong to their series.
pub fn owns_subfolders(dir: &Path, classification: &Classification) -> bool {
    let Some(name) = dir_name(dir) else {
        return false;
    };
    if filename::season_folder_number(name).is_some() {
        return matches!(classification, Classification::SeriesFolder { .. });
    }
    let folder_title = extract_year_from_name(name).0;

    match classification {
        Classification::NotVideo => false,
        Classification::SingleVideo { path } => {
            title_matches(&folder_title, &filename::parse_movie(&file_stem(path)).title, None)
        }
        Classification::SeriesFolder { episodes, .. } => episodes
            .iter()
            .filter_map(|e| parse_episode(&file_stem(&e.path)))
            .map(|p| p.show_name)
            .find(|show| !show.is_empty())
            .is_some_and(|show| title_matches(&folder_title, &show, None)),
    }
}

/// Series title from the folder, or from its parent for season folders
pub fn folder_series_title(dir: &Path) -> String {
    let name = match dir_name(dir) {
        Some(name) if filename::season_folder_number(name).is_some() => {
            dir.parent().and_then(dir_name).unwrap_or(name)
        }
        Some(name) => name,
        None => return String::new(),
    };
    extract_year_from_name(name).0
}

fn dir_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
