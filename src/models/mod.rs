use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Thumbnail reference used when no poster could be found or fetched
pub const PLACEHOLDER_THUMBNAIL: &str = "/assets/no-poster.png";

/// A catalogued video file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: String,
    pub path: String,
    pub original_title: String,
    pub title: String,
    /// `HH:MM:SS`, absent until a probe succeeds
    pub duration: Option<String>,
    pub thumbnail: String,
    pub category: String,
    pub tags: Vec<String>,
    pub description: String,
    /// Unix seconds
    pub create_time: i64,
    /// Unix seconds, 0 until first played
    pub last_play_time: i64,
    pub play_count: i64,
    pub favorite: bool,
    pub is_series: bool,
    pub series_title: String,
    pub season: u32,
    pub episode: u32,
    pub episode_title: String,
    pub episode_overview: String,
}

impl VideoEntry {
    /// Blank entry for a path; the extractor fills in the rest
    pub fn new(path: &Path, created: i64) -> Self {
        Self {
            id: video_id(path),
            path: path.to_string_lossy().into_owned(),
            original_title: String::new(),
            title: String::new(),
            duration: None,
            thumbnail: PLACEHOLDER_THUMBNAIL.to_string(),
            category: String::new(),
            tags: Vec::new(),
            description: String::new(),
            create_time: created,
            last_play_time: 0,
            play_count: 0,
            favorite: false,
            is_series: false,
            series_title: String::new(),
            season: 0,
            episode: 0,
            episode_title: String::new(),
            episode_overview: String::new(),
        }
    }

    pub fn file_path(&self) -> &Path {
        Path::new(&self.path)
    }
}

/// Stable entry id: UUIDv5 over the path string.
///
/// Callers pass canonical paths so that two routes to one file share an id.
pub fn video_id(path: &Path) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes()).to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerType {
    /// OS default handler
    #[default]
    System,
    Mpv,
    Vlc,
    PotPlayer,
    Custom,
}

impl PlayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerType::System => "system",
            PlayerType::Mpv => "mpv",
            PlayerType::Vlc => "vlc",
            PlayerType::PotPlayer => "potplayer",
            PlayerType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "mpv" => PlayerType::Mpv,
            "vlc" => PlayerType::Vlc,
            "potplayer" => PlayerType::PotPlayer,
            "custom" => PlayerType::Custom,
            _ => PlayerType::System,
        }
    }
}

/// User settings, always read and written as a whole record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub player_path: Option<String>,
    pub player_type: PlayerType,
    pub subtitle_auto_load: bool,
    pub subtitle_language: String,
    pub tmdb_enabled: bool,
    pub tmdb_download_posters: bool,
    pub tmdb_api_key: Option<String>,
    pub tmdb_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            player_path: None,
            player_type: PlayerType::System,
            subtitle_auto_load: true,
            subtitle_language: "zh".to_string(),
            tmdb_enabled: false,
            tmdb_download_posters: true,
            tmdb_api_key: None,
            tmdb_language: "zh-CN".to_string(),
        }
    }
}

impl Settings {
    /// First-run record; TMDB is switched on only when a key is available
    pub fn first_run(tmdb_api_key: Option<String>) -> Self {
        Self {
            tmdb_enabled: tmdb_api_key.is_some(),
            tmdb_api_key,
            ..Self::default()
        }
    }

    /// Key to use for lookups, if lookups are enabled at all
    pub fn active_tmdb_key(&self) -> Option<&str> {
        if !self.tmdb_enabled {
            return None;
        }
        self.tmdb_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Something a scan could not turn into an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub path: String,
    pub reason: String,
}

/// Outcome of one scan pass. `added` is the delta, not the full catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub added: Vec<VideoEntry>,
    pub skipped: Vec<SkippedItem>,
    /// Discovered videos that were already catalogued
    pub unchanged: usize,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_is_stable() {
        let a = video_id(Path::new("/media/Movies/Heat (1995).mkv"));
        let b = video_id(Path::new("/media/Movies/Heat (1995).mkv"));
        assert_eq!(a, b);
        assert_ne!(a, video_id(Path::new("/media/Movies/Heat.mkv")));
    }

    #[test]
    fn test_player_type_roundtrip_names() {
        assert_eq!(PlayerType::parse("PotPlayer"), PlayerType::PotPlayer);
        assert_eq!(PlayerType::parse("unknown"), PlayerType::System);
        assert_eq!(
            serde_json::to_string(&PlayerType::PotPlayer).unwrap(),
            "\"potplayer\""
        );
    }

    #[test]
    fn test_first_run_settings() {
        let settings = Settings::first_run(None);
        assert!(!settings.tmdb_enabled);
        assert_eq!(settings.player_type, PlayerType::System);

        let settings = Settings::first_run(Some("abc".into()));
        assert!(settings.tmdb_enabled);
        assert_eq!(settings.active_tmdb_key(), Some("abc"));
    }

    #[test]
    fn test_blank_key_is_inactive() {
        let settings = Settings {
            tmdb_enabled: true,
            tmdb_api_key: Some("  ".into()),
            ..Settings::default()
        };
        assert_eq!(settings.active_tmdb_key(), None);
    }
}
