// Handing a catalogued video to an external player

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use super::subtitles;
use crate::db::CatalogStore;
use crate::error::{Error, LaunchError, Result};
use crate::models::{PlayerType, Settings, VideoEntry};

/// A fully resolved player invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Starts a player process without waiting for it to exit
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command: &PlayerCommand) -> std::result::Result<(), LaunchError>;
}

/// Launches real OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, command: &PlayerCommand) -> std::result::Result<(), LaunchError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LaunchError::PlayerNotFound(command.program.clone()),
                _ => LaunchError::Spawn {
                    program: command.program.clone(),
                    source: e,
                },
            })?;

        // Reap the player when it exits
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

fn default_program(player: PlayerType) -> Option<&'static str> {
    match player {
        PlayerType::Mpv => Some("mpv"),
        PlayerType::Vlc => Some("vlc"),
        PlayerType::PotPlayer => Some("PotPlayerMini64.exe"),
        PlayerType::System | PlayerType::Custom => None,
    }
}

fn system_opener(video: &str) -> PlayerCommand {
    if cfg!(target_os = "windows") {
        PlayerCommand {
            program: "cmd".to_string(),
            args: vec![
                "/C".to_string(),
                "start".to_string(),
                String::new(),
                video.to_string(),
            ],
        }
    } else if cfg!(target_os = "macos") {
        PlayerCommand {
            program: "open".to_string(),
            args: vec![video.to_string()],
        }
    } else {
        PlayerCommand {
            program: "xdg-open".to_string(),
            args: vec![video.to_string()],
        }
    }
}

fn subtitle_arg(player: PlayerType, subtitle: &Path) -> Option<String> {
    match player {
        PlayerType::Mpv | PlayerType::Vlc => Some(format!("--sub-file={}", subtitle.display())),
        PlayerType::PotPlayer => Some(format!("/sub={}", subtitle.display())),
        PlayerType::System | PlayerType::Custom => None,
    }
}

/// Whether the configured player accepts a subtitle argument
pub fn supports_subtitles(player: PlayerType) -> bool {
    matches!(player, PlayerType::Mpv | PlayerType::Vlc | PlayerType::PotPlayer)
}

/// Work out the command for `entry`. A configured player path always wins;
/// otherwise the player type picks a program, falling back to the OS opener.
pub fn build_command(
    entry: &VideoEntry,
    settings: &Settings,
    subtitle: Option<&Path>,
) -> std::result::Result<PlayerCommand, LaunchError> {
    let player_path = settings
        .player_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let program = match (player_path, default_program(settings.player_type)) {
        (Some(path), _) => path.to_string(),
        (None, Some(program)) => program.to_string(),
        (None, None) if settings.player_type == PlayerType::Custom => {
            return Err(LaunchError::PlayerNotFound(
                "custom player selected but no player path is set".to_string(),
            ))
        }
        (None, None) => return Ok(system_opener(&entry.path)),
    };

    let mut args = vec![entry.path.clone()];
    if let Some(arg) = subtitle.and_then(|s| subtitle_arg(settings.player_type, s)) {
        args.push(arg);
    }

    Ok(PlayerCommand { program, args })
}

/// Launches players and records plays that actually started
#[derive(Clone)]
pub struct PlaybackDispatcher {
    store: CatalogStore,
    launcher: Arc<dyn ProcessLauncher>,
}

impl PlaybackDispatcher {
    pub fn new(store: CatalogStore, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { store, launcher }
    }

    /// Launch the video with id `id`. Statistics change only after the
    /// player process started.
    pub async fn play(&self, id: &str, settings: &Settings) -> Result<VideoEntry> {
        let entry = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let path = PathBuf::from(&entry.path);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => {}
            _ => return Err(LaunchError::PathInaccessible(path).into()),
        }

        let subtitle = if settings.subtitle_auto_load && supports_subtitles(settings.player_type) {
            let lookup = entry.clone();
            let language = settings.subtitle_language.clone();
            tokio::task::spawn_blocking(move || subtitles::find_best_subtitle(&lookup, &language))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Subtitle lookup task failed: {}", e);
                    None
                })
        } else {
            None
        };

        let command = build_command(&entry, settings, subtitle.as_deref())?;
        tracing::info!("Playing {} with {} {:?}", entry.path, command.program, command.args);
        self.launcher.launch(&command)?;

        self.store
            .record_play(id, chrono::Utc::now().timestamp())
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
