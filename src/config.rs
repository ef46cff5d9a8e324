// Configuration for media-shelf
// XDG-style directories, an optional config.toml, and environment overrides

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::tmdb::{TmdbEndpoints, TMDB_API_BASE, TMDB_IMAGE_BASE};

const APP_NAME: &str = "media-shelf";
const CONFIG_FILENAME: &str = "config.toml";
const DATABASE_FILENAME: &str = "media-shelf.db";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    pub metadata: MetadataConfig,

    pub tools: ToolsConfig,

    pub scanner: ScannerConfig,

    /// Folders scanned in the background after startup
    pub libraries: Vec<LibraryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Command API port (default: 7878)
    pub port: u16,

    /// Bind address (default: 127.0.0.1, the API is meant for a local UI)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7878,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// TMDB API key used for the first-run settings record
    pub tmdb_api_key: Option<String>,

    /// Per-request timeout for metadata and poster downloads
    pub request_timeout_secs: u64,

    /// TMDB API root, e.g. for a caching proxy
    pub tmdb_api_base: String,

    /// Prefix for poster paths returned by TMDB
    pub tmdb_image_base: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            request_timeout_secs: 10,
            tmdb_api_base: TMDB_API_BASE.to_string(),
            tmdb_image_base: TMDB_IMAGE_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Path to ffprobe binary (falls back to `ffprobe` on PATH)
    pub ffprobe_path: Option<PathBuf>,
}

/// A folder to keep in the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Video file extensions to recognise (lowercase, without dots)
    pub video_extensions: Vec<String>,

    /// Concurrent extraction workers per scan (0 = derive from CPU cores)
    pub workers: usize,

    /// Upper bound for a single media probe
    pub probe_timeout_secs: u64,

    /// Upper bound for a single poster download, after which the placeholder is used
    pub thumbnail_grace_secs: u64,

    /// Scan configured libraries once the server is up (default: true)
    pub scan_on_startup: bool,

    /// Rescan configured libraries every N minutes (default: 30, 0 to disable)
    pub rescan_interval_minutes: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            video_extensions: [
                "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts",
                "m2ts", "mts", "vob", "ogv", "rmvb", "rm", "asf", "3gp", "f4v",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            workers: 0,
            probe_timeout_secs: 20,
            thumbnail_grace_secs: 15,
            scan_on_startup: true,
            rescan_interval_minutes: 30,
        }
    }
}

impl ScannerConfig {
    /// Worker count actually used by a scan
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
            .clamp(2, 8)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn thumbnail_grace(&self) -> Duration {
        Duration::from_secs(self.thumbnail_grace_secs.max(1))
    }
}

/// Application paths following the XDG Base Directory layout on Unix
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// $XDG_CONFIG_HOME/media-shelf
    pub config_dir: PathBuf,

    /// $XDG_DATA_HOME/media-shelf (database)
    pub data_dir: PathBuf,

    /// $XDG_CACHE_HOME/media-shelf (thumbnails)
    pub cache_dir: PathBuf,
}

impl AppPaths {
    /// Resolve paths: environment, then config file, then platform dirs, then cwd
    pub fn new(overrides: &PathsConfig) -> Self {
        Self {
            config_dir: resolve_dir(
                "MEDIA_SHELF_CONFIG_DIR",
                &overrides.config_dir,
                dirs::config_dir(),
                None,
            ),
            data_dir: resolve_dir(
                "MEDIA_SHELF_DATA_DIR",
                &overrides.data_dir,
                dirs::data_dir(),
                None,
            ),
            cache_dir: resolve_dir(
                "MEDIA_SHELF_CACHE_DIR",
                &overrides.cache_dir,
                dirs::cache_dir(),
                Some("cache"),
            ),
        }
    }

    /// Everything under the current directory (portable mode)
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd.clone(),
            cache_dir: cwd.join("cache"),
        }
    }

    /// All paths below a single root, used by tests and embedders
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILENAME)
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Poster cache, one `<id>.jpg` per entry
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.cache_dir.join("thumbnails")
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILENAME)
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(self.thumbnail_dir()).await?;
        Ok(())
    }

    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::info!("Cache directory: {}", self.cache_dir.display());
        tracing::debug!("Database path: {}", self.database_path().display());
    }
}

fn resolve_dir(
    env_var: &str,
    config_override: &Option<PathBuf>,
    platform: Option<PathBuf>,
    cwd_suffix: Option<&str>,
) -> PathBuf {
    if let Ok(path) = std::env::var(env_var) {
        return PathBuf::from(path);
    }
    if let Some(path) = config_override {
        return path.clone();
    }
    if let Some(dir) = platform {
        return dir.join(APP_NAME);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match cwd_suffix {
        Some(suffix) => cwd.join(suffix),
        None => cwd,
    }
}

/// Effective configuration: TOML file with environment overrides applied
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: AppPaths,
    pub port: u16,
    pub bind_address: String,
    pub tmdb_api_key: Option<String>,
    pub tmdb_endpoints: TmdbEndpoints,
    pub request_timeout: Duration,
    pub ffprobe_path: Option<PathBuf>,
    pub libraries: Vec<LibraryConfig>,
    pub scanner: ScannerConfig,
}

impl AppConfig {
    /// Load configuration (environment > config.toml > defaults)
    pub fn load() -> Self {
        let portable_mode = env_flag("MEDIA_SHELF_PORTABLE");

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            let mut config = Self::build(ConfigFile::default());
            config.paths = AppPaths::current_dir();
            return config;
        }

        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        Self::build(config_file)
    }

    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("MEDIA_SHELF_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn load_config_file(config_dir: &Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Apply environment overrides on top of a parsed config file
    pub fn build(config_file: ConfigFile) -> Self {
        let port = std::env::var("MEDIA_SHELF_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(config_file.server.port);

        let bind_address = std::env::var("MEDIA_SHELF_BIND_ADDRESS")
            .unwrap_or_else(|_| config_file.server.bind_address.clone());

        let tmdb_api_key = std::env::var("TMDB_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or(config_file.metadata.tmdb_api_key);

        let ffprobe_path = std::env::var("FFPROBE_PATH")
            .ok()
            .map(PathBuf::from)
            .or(config_file.tools.ffprobe_path);

        Self {
            paths: AppPaths::new(&config_file.paths),
            port,
            bind_address,
            tmdb_api_key,
            tmdb_endpoints: TmdbEndpoints {
                api_base: config_file.metadata.tmdb_api_base,
                image_base: config_file.metadata.tmdb_image_base,
            },
            request_timeout: Duration::from_secs(config_file.metadata.request_timeout_secs.max(1)),
            ffprobe_path,
            libraries: config_file.libraries,
            scanner: config_file.scanner,
        }
    }

    /// Database URL, with override from DATABASE_URL
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Command API on {}:{}", self.bind_address, self.port);

        if self.tmdb_api_key.is_some() {
            tracing::info!("TMDB key configured");
        } else {
            tracing::info!("No TMDB key: titles come from filenames only");
            tracing::info!("Hint: Add tmdb_api_key to config.toml or set TMDB_API_KEY env var");
        }

        tracing::debug!(
            "Scanner: {} extensions, {} workers",
            self.scanner.video_extensions.len(),
            self.scanner.effective_workers()
        );

        if let Some(ref path) = self.ffprobe_path {
            tracing::debug!("FFprobe: {}", path.display());
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_dir_paths() {
        let paths = AppPaths::current_dir();
        assert!(paths.cache_dir.ends_with("cache"));
    }

    #[test]
    fn test_database_url_format() {
        let paths = AppPaths::under(Path::new("/srv/shelf"));
        let url = paths.database_url();
        assert_eq!(url, "sqlite:/srv/shelf/data/media-shelf.db?mode=rwc");
        assert_eq!(paths.thumbnail_dir(), PathBuf::from("/srv/shelf/cache/thumbnails"));
    }

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();
        assert_eq!(config.server.port, 7878);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.metadata.request_timeout_secs, 10);
        assert!(config.scanner.video_extensions.contains(&"mkv".to_string()));
        assert!(config.libraries.is_empty());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[server]
port = 9000

[metadata]
tmdb_api_key = "test_key"
request_timeout_secs = 3
tmdb_api_base = "http://localhost:8080/3"

[scanner]
video_extensions = ["mkv", "mp4"]
workers = 2
rescan_interval_minutes = 0

[tools]
ffprobe_path = "/usr/bin/ffprobe"

[[libraries]]
name = "Movies"
path = "/media/movies"
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.metadata.tmdb_api_key, Some("test_key".to_string()));
        assert_eq!(config.metadata.request_timeout_secs, 3);
        assert_eq!(config.metadata.tmdb_api_base, "http://localhost:8080/3");
        assert_eq!(config.metadata.tmdb_image_base, TMDB_IMAGE_BASE);
        assert_eq!(config.scanner.video_extensions, vec!["mkv", "mp4"]);
        assert_eq!(config.scanner.effective_workers(), 2);
        assert_eq!(config.scanner.rescan_interval_minutes, 0);
        assert_eq!(config.scanner.probe_timeout_secs, 20);
        assert_eq!(
            config.tools.ffprobe_path,
            Some(PathBuf::from("/usr/bin/ffprobe"))
        );
        assert_eq!(config.libraries.len(), 1);
        assert_eq!(config.libraries[0].path, PathBuf::from("/media/movies"));
    }

    #[test]
    fn test_effective_workers_bounds() {
        let scanner = ScannerConfig::default();
        let workers = scanner.effective_workers();
        assert!((2..=8).contains(&workers));
    }
}
