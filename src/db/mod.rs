use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;
use crate::models::{PlayerType, Settings, VideoEntry};

/// Open the process-wide pool. Every component shares this one handle.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        // WAL lets the UI read while a scan writes
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                use sqlx::Executor;
                conn.execute("PRAGMA cache_size = -8000").await?;
                conn.execute("PRAGMA temp_store = MEMORY").await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await?;

    tracing::info!("SQLite configured: WAL mode, 8MB cache");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            original_title TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            duration TEXT,
            thumbnail TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            description TEXT NOT NULL DEFAULT '',
            create_time INTEGER NOT NULL DEFAULT 0,
            last_play_time INTEGER NOT NULL DEFAULT 0,
            play_count INTEGER NOT NULL DEFAULT 0,
            favorite INTEGER NOT NULL DEFAULT 0,
            is_series INTEGER NOT NULL DEFAULT 0,
            series_title TEXT NOT NULL DEFAULT '',
            season INTEGER NOT NULL DEFAULT 0,
            episode INTEGER NOT NULL DEFAULT 0,
            episode_title TEXT NOT NULL DEFAULT '',
            episode_overview TEXT NOT NULL DEFAULT ''
        );

        -- Singleton settings record
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            player_path TEXT,
            player_type TEXT NOT NULL DEFAULT 'system',
            subtitle_auto_load INTEGER NOT NULL DEFAULT 1,
            subtitle_language TEXT NOT NULL DEFAULT 'zh',
            tmdb_enabled INTEGER NOT NULL DEFAULT 0,
            tmdb_download_posters INTEGER NOT NULL DEFAULT 1,
            tmdb_api_key TEXT,
            tmdb_language TEXT NOT NULL DEFAULT 'zh-CN'
        );
        "#,
    )
    .execute(pool)
    .await?;

    create_indexes(pool).await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = [
        // Same path, same row
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_videos_path ON videos(path)",
        // Series grouping in the UI
        "CREATE INDEX IF NOT EXISTS idx_videos_series ON videos(series_title, season, episode) WHERE is_series = 1",
        "CREATE INDEX IF NOT EXISTS idx_videos_favorite ON videos(favorite) WHERE favorite = 1",
    ];

    for sql in indexes {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

#[derive(sqlx::FromRow)]
struct VideoRow {
    id: String,
    path: String,
    original_title: String,
    title: String,
    duration: Option<String>,
    thumbnail: String,
    category: String,
    tags: String,
    description: String,
    create_time: i64,
    last_play_time: i64,
    play_count: i64,
    favorite: bool,
    is_series: bool,
    series_title: String,
    season: i64,
    episode: i64,
    episode_title: String,
    episode_overview: String,
}

impl From<VideoRow> for VideoEntry {
    fn from(row: VideoRow) -> Self {
        let tags = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
            tracing::warn!("Unreadable tags for {}: {}", row.id, e);
            Vec::new()
        });

        VideoEntry {
            id: row.id,
            path: row.path,
            original_title: row.original_title,
            title: row.title,
            duration: row.duration,
            thumbnail: row.thumbnail,
            category: row.category,
            tags,
            description: row.description,
            create_time: row.create_time,
            last_play_time: row.last_play_time,
            play_count: row.play_count,
            favorite: row.favorite,
            is_series: row.is_series,
            series_title: row.series_title,
            season: u32::try_from(row.season).unwrap_or(0),
            episode: u32::try_from(row.episode).unwrap_or(0),
            episode_title: row.episode_title,
            episode_overview: row.episode_overview,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    player_path: Option<String>,
    player_type: String,
    subtitle_auto_load: bool,
    subtitle_language: String,
    tmdb_enabled: bool,
    tmdb_download_posters: bool,
    tmdb_api_key: Option<String>,
    tmdb_language: String,
}

impl From<SettingsRow> for Settings {
    fn from(row: SettingsRow) -> Self {
        Settings {
            player_path: row.player_path,
            player_type: PlayerType::parse(&row.player_type),
            subtitle_auto_load: row.subtitle_auto_load,
            subtitle_language: row.subtitle_language,
            tmdb_enabled: row.tmdb_enabled,
            tmdb_download_posters: row.tmdb_download_posters,
            tmdb_api_key: row.tmdb_api_key,
            tmdb_language: row.tmdb_language,
        }
    }
}

const VIDEO_COLUMNS: &str = "id, path, original_title, title, duration, thumbnail, category, tags, \
     description, create_time, last_play_time, play_count, favorite, is_series, series_title, \
     season, episode, episode_title, episode_overview";

/// Owner of the persisted video table and the settings record
#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert, or replace everything except play statistics and the favorite flag
    pub async fn upsert(&self, entry: &VideoEntry) -> Result<VideoEntry> {
        let tags = serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO videos (
                id, path, original_title, title, duration, thumbnail, category, tags,
                description, create_time, last_play_time, play_count, favorite,
                is_series, series_title, season, episode, episode_title, episode_overview
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                original_title = excluded.original_title,
                title = excluded.title,
                duration = excluded.duration,
                thumbnail = excluded.thumbnail,
                category = excluded.category,
                tags = excluded.tags,
                description = excluded.description,
                create_time = excluded.create_time,
                is_series = excluded.is_series,
                series_title = excluded.series_title,
                season = excluded.season,
                episode = excluded.episode,
                episode_title = excluded.episode_title,
                episode_overview = excluded.episode_overview
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.path)
        .bind(&entry.original_title)
        .bind(&entry.title)
        .bind(&entry.duration)
        .bind(&entry.thumbnail)
        .bind(&entry.category)
        .bind(&tags)
        .bind(&entry.description)
        .bind(entry.create_time)
        .bind(entry.is_series)
        .bind(&entry.series_title)
        .bind(i64::from(entry.season))
        .bind(i64::from(entry.episode))
        .bind(&entry.episode_title)
        .bind(&entry.episode_overview)
        .execute(&self.pool)
        .await?;

        let stored = self.get(&entry.id).await?;
        Ok(stored.unwrap_or_else(|| entry.clone()))
    }

    pub async fn get(&self, id: &str) -> Result<Option<VideoEntry>> {
        let row: Option<VideoRow> =
            sqlx::query_as(&format!("SELECT {} FROM videos WHERE id = ?", VIDEO_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(VideoEntry::from))
    }

    pub async fn get_all(&self) -> Result<Vec<VideoEntry>> {
        let rows: Vec<VideoRow> = sqlx::query_as(&format!(
            "SELECT {} FROM videos ORDER BY create_time DESC, path ASC",
            VIDEO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(VideoEntry::from).collect())
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Idempotent: a missing id is not an error
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            tracing::debug!("Delete of unknown video {} ignored", id);
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM videos")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Count one successful playback. `last_play_time` never moves backwards.
    pub async fn record_play(&self, id: &str, now: i64) -> Result<Option<VideoEntry>> {
        sqlx::query(
            r#"
            UPDATE videos SET
                play_count = play_count + 1,
                last_play_time = MAX(last_play_time, ?)
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.get(id).await
    }

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<Option<VideoEntry>> {
        sqlx::query("UPDATE videos SET favorite = ? WHERE id = ?")
            .bind(favorite)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get(id).await
    }

    /// Read the settings record, creating it from `defaults` on first run
    pub async fn load_settings(&self, defaults: &Settings) -> Result<Settings> {
        let row: Option<SettingsRow> = sqlx::query_as(
            r#"
            SELECT player_path, player_type, subtitle_auto_load, subtitle_language,
                   tmdb_enabled, tmdb_download_posters, tmdb_api_key, tmdb_language
            FROM settings WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                tracing::info!("No settings stored yet, writing defaults");
                self.save_settings(defaults).await?;
                Ok(defaults.clone())
            }
        }
    }

    /// Replace the whole settings record
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO settings (
                id, player_path, player_type, subtitle_auto_load, subtitle_language,
                tmdb_enabled, tmdb_download_posters, tmdb_api_key, tmdb_language
            )
            VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&settings.player_path)
        .bind(settings.player_type.as_str())
        .bind(settings.subtitle_auto_load)
        .bind(&settings.subtitle_language)
        .bind(settings.tmdb_enabled)
        .bind(settings.tmdb_download_posters)
        .bind(&settings.tmdb_api_key)
        .bind(&settings.tmdb_language)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> CatalogStore {
    // One connection: each in-memory connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    CatalogStore::new(pool)
}
