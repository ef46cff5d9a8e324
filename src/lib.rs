pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod models;
pub mod scanner;
pub mod services;

pub use error::{Error, LaunchError, Result};
pub use library::Library;

pub struct AppState {
    pub library: Library,
}

#[cfg(test)]
pub(crate) async fn test_state(cache: &std::path::Path) -> std::sync::Arc<AppState> {
    use crate::models::Settings;
    use crate::scanner::classifier::PathClassifier;
    use crate::scanner::Scanner;
    use crate::services::mediainfo::MediaProbe;
    use crate::services::playback::{tests::FakeLauncher, PlaybackDispatcher};
    use crate::services::thumbnail::ThumbnailResolver;
    use crate::services::tmdb::TmdbEndpoints;
    use std::time::Duration;

    let store = db::memory_store().await;
    let scanner = Scanner::new(
        store.clone(),
        PathClassifier::new(["mkv", "mp4"]),
        MediaProbe::new(Some(cache.join("no-such-ffprobe")), Duration::from_secs(5)),
        ThumbnailResolver::new(
            cache.join("thumbnails"),
            Duration::from_secs(1),
            Duration::from_secs(1),
        ),
        TmdbEndpoints::default(),
        Duration::from_secs(1),
        2,
    );
    let playback = PlaybackDispatcher::new(store.clone(), std::sync::Arc::new(FakeLauncher::default()));
    let library = Library::new(
        store,
        scanner,
        playback,
        Settings::first_run(None),
        tokio_util::sync::CancellationToken::new(),
    );

    std::sync::Arc::new(AppState { library })
}
