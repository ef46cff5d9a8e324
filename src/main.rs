use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_shelf::config::AppConfig;
use media_shelf::db::{self, CatalogStore};
use media_shelf::models::Settings;
use media_shelf::scanner::Scanner;
use media_shelf::services::playback::{PlaybackDispatcher, SystemLauncher};
use media_shelf::{api, AppState, Error, Library};

/// Tracks all background task handles for graceful shutdown
struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    async fn shutdown(self) {
        tracing::info!("Initiating graceful shutdown...");

        // Also cancels any scan in flight: scan tokens are children of this one
        self.shutdown.cancel();

        for (name, handle) in self.handles {
            tracing::debug!("Waiting for {} to finish...", name);
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(())) => tracing::debug!("{} finished cleanly", name),
                Ok(Err(e)) => tracing::warn!("{} panicked: {}", name, e),
                Err(_) => tracing::warn!("{} timed out during shutdown", name),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

/// One pass over the configured library folders
async fn scan_libraries(library: &Library, config: &AppConfig) {
    let mut roots = Vec::new();
    for lib in &config.libraries {
        if tokio::fs::try_exists(&lib.path).await.unwrap_or(false) {
            roots.push(lib.path.clone());
        } else {
            tracing::warn!(
                "Skipping library '{}': path does not exist: {}",
                lib.name,
                lib.path.display()
            );
        }
    }
    if roots.is_empty() {
        return;
    }

    match library.scan_roots(&roots).await {
        Ok(report) => tracing::info!(
            "Library scan: {} added, {} skipped, {} unchanged",
            report.added.len(),
            report.skipped.len(),
            report.unchanged
        ),
        Err(Error::ScanInProgress) => {
            tracing::info!("Library scan skipped, another scan is running")
        }
        Err(e) => tracing::error!("Library scan failed: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_shelf=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config.paths.ensure_dirs().await?;

    config.log_config();

    let database_url = config.database_url();
    tracing::debug!("Database URL: {}", database_url);

    let pool = db::connect(&database_url).await?;
    db::migrate(&pool).await?;

    let store = CatalogStore::new(pool.clone());
    tracing::info!("Catalog has {} videos", store.count().await?);

    let mut bg_tasks = BackgroundTasks::new();
    let shutdown_token = bg_tasks.token();

    let library = Library::new(
        store.clone(),
        Scanner::from_config(store.clone(), &config),
        PlaybackDispatcher::new(store, Arc::new(SystemLauncher)),
        Settings::first_run(config.tmdb_api_key.clone()),
        shutdown_token.clone(),
    );

    let state = Arc::new(AppState {
        library: library.clone(),
    });

    if !config.libraries.is_empty() {
        let bg_library = library.clone();
        let bg_config = config.clone();
        let cancel = shutdown_token.clone();
        bg_tasks.spawn("library-scanner", async move {
            // Small delay to let the server fully start
            tokio::time::sleep(Duration::from_millis(500)).await;

            tracing::info!(
                "Background: {} configured libraries",
                bg_config.libraries.len()
            );

            if bg_config.scanner.scan_on_startup {
                scan_libraries(&bg_library, &bg_config).await;
            }

            let minutes = bg_config.scanner.rescan_interval_minutes;
            if minutes == 0 {
                tracing::info!("Periodic rescans disabled (interval set to 0)");
                return;
            }

            let interval = Duration::from_secs(minutes * 60);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Library scanner received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        scan_libraries(&bg_library, &bg_config).await;
                    }
                }
            }
        });
    }

    let app = api::router(state);

    let ip: std::net::IpAddr = config.bind_address.parse().unwrap_or_else(|_| {
        tracing::warn!(
            "Invalid bind address '{}', falling back to 127.0.0.1",
            config.bind_address
        );
        std::net::IpAddr::from([127, 0, 0, 1])
    });
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!("Starting server on {}", addr);

    let signal_token = shutdown_token.clone();
    let shutdown_signal = async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }

        // Stop a running scan so in-flight requests can drain
        signal_token.cancel();
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    bg_tasks.shutdown().await;

    pool.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}
