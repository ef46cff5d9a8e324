// Lightweight media probing: ffprobe first, native Matroska header reader as fallback

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::matroska;

/// What a probe could learn about a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_seconds: Option<f64>,
    /// Video codec (e.g., "hevc", "h264")
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaInfo {
    /// Technical tags for the catalog: resolution class and codec
    pub fn tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        if let Some(tag) = resolution_tag(self.width, self.height) {
            tags.push(tag.to_string());
        }
        if let Some(codec) = &self.video_codec {
            tags.push(codec.to_lowercase());
        }
        tags
    }

    pub fn formatted_duration(&self) -> Option<String> {
        self.duration_seconds
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(format_duration)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Runs probes under a deadline, off the async runtime
#[derive(Debug, Clone)]
pub struct MediaProbe {
    ffprobe: PathBuf,
    timeout: Duration,
}

impl MediaProbe {
    pub fn new(ffprobe_path: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffprobe: ffprobe_path.unwrap_or_else(|| PathBuf::from("ffprobe")),
            timeout,
        }
    }

    /// Best-effort probe. ffprobe first; Matroska/WebM files fall back to
    /// reading the EBML header directly when ffprobe is missing or fails.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let ffprobe = self.ffprobe.clone();
        let target = path.to_path_buf();
        let probed = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || run_ffprobe(&ffprobe, &target)),
        )
        .await;

        let error = match probed {
            Ok(Ok(Ok(info))) if info.duration_seconds.is_some() => return Ok(info),
            Ok(Ok(Ok(info))) => {
                tracing::debug!("ffprobe found no duration for {}", path.display());
                return self.with_native_duration(path, info).await;
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(e)) => anyhow::Error::new(e).context("ffprobe task panicked"),
            Err(_) => anyhow::anyhow!("ffprobe timed out after {:?}", self.timeout),
        };

        if !matroska::is_matroska_path(path) {
            return Err(error);
        }

        tracing::debug!(
            "ffprobe failed for {} ({:#}), reading Matroska header",
            path.display(),
            error
        );
        self.with_native_duration(path, MediaInfo::default()).await
    }

    async fn with_native_duration(&self, path: &Path, mut info: MediaInfo) -> Result<MediaInfo> {
        if !matroska::is_matroska_path(path) {
            return Ok(info);
        }

        let target = path.to_path_buf();
        let seconds = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || matroska::read_duration_file(&target)),
        )
        .await
        .context("Matroska header read timed out")?
        .context("Task join error")??;

        info.duration_seconds = Some(seconds);
        Ok(info)
    }
}

fn run_ffprobe(ffprobe: &Path, path: &Path) -> Result<MediaInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .with_context(|| {
            format!(
                "Failed to run ffprobe at '{}'. Is ffmpeg installed?",
                ffprobe.display()
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffprobe failed: {}", stderr.trim());
    }

    parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
}

fn parse_ffprobe_json(json: &str) -> Result<MediaInfo> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe output")?;

    let mut info = MediaInfo::default();

    if let Some(format) = probe.format {
        info.duration_seconds = format.duration.and_then(|d| d.parse::<f64>().ok());
    }

    let video = probe
        .streams
        .unwrap_or_default()
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    if let Some(stream) = video {
        info.video_codec = stream.codec_name;
        info.width = stream.width;
        info.height = stream.height;
    }

    Ok(info)
}

/// Format seconds as `HH:MM:SS`
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.round().max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Resolution class from frame size, judged by the larger of width or height band
pub fn resolution_tag(width: Option<u32>, height: Option<u32>) -> Option<&'static str> {
    let (w, h) = (width.unwrap_or(0), height.unwrap_or(0));
    if w == 0 && h == 0 {
        return None;
    }
    Some(if w >= 3200 || h >= 2000 {
        "2160p"
    } else if w >= 1800 || h >= 1000 {
        "1080p"
    } else if w >= 1200 || h >= 700 {
        "720p"
    } else {
        "SD"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration((3600 + 30 * 60 + 45) as f64), "01:30:45");
        assert_eq!(format_duration(330.4), "00:05:30");
        assert_eq!(format_duration(0.0), "00:00:00");
    }

    #[test]
    fn test_resolution_tag() {
        assert_eq!(resolution_tag(Some(3840), Some(2160)), Some("2160p"));
        assert_eq!(resolution_tag(Some(1920), Some(800)), Some("1080p"));
        assert_eq!(resolution_tag(Some(1280), Some(720)), Some("720p"));
        assert_eq!(resolution_tag(Some(640), Some(480)), Some("SD"));
        assert_eq!(resolution_tag(None, None), None);
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "audio", "codec_name": "aac"},
                {"index": 1, "codec_type": "video", "codec_name": "HEVC", "width": 1920, "height": 1080}
            ],
            "format": {"duration": "5400.250000", "format_name": "matroska,webm"}
        }"#;
        let info = parse_ffprobe_json(json).unwrap();
        assert_eq!(info.formatted_duration().as_deref(), Some("01:30:00"));
        assert_eq!(info.tags(), vec!["1080p", "hevc"]);
    }

    #[tokio::test]
    async fn test_missing_ffprobe_non_matroska_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"not really a video").unwrap();

        let probe = MediaProbe::new(
            Some(dir.path().join("no-such-ffprobe")),
            Duration::from_secs(5),
        );
        assert!(probe.probe(&file).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_ffprobe_falls_back_to_matroska() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mkv");
        std::fs::write(&file, matroska::tests::sample_file(1_000_000, 5000.0)).unwrap();

        let probe = MediaProbe::new(
            Some(dir.path().join("no-such-ffprobe")),
            Duration::from_secs(5),
        );
        let info = probe.probe(&file).await.unwrap();
        assert_eq!(info.formatted_duration().as_deref(), Some("00:00:05"));
    }
}
