// External subtitle discovery for playback

use std::path::{Path, PathBuf};

use crate::models::VideoEntry;

const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

/// Subfolders next to a video that commonly hold its subtitles
const SUBTITLE_FOLDERS: &[&str] = &["字幕", "Subs", "Subtitles", "subs", "subtitles"];

/// Keywords that mark a Chinese track, the default preference
const CHINESE_KEYWORDS: &[&str] = &["zh", "chs", "cht", "cn", "chinese", "简体", "简中", "繁中"];

fn language_keywords(language: &str) -> Vec<String> {
    let language = language.trim().to_lowercase();
    if language.is_empty() || language.starts_with("zh") {
        CHINESE_KEYWORDS.iter().map(|k| k.to_string()).collect()
    } else {
        vec![language]
    }
}

fn is_subtitle(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUBTITLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Subtitle files beside the video and in its subtitle subfolders, sorted
pub fn list_subtitles(video: &Path) -> Vec<PathBuf> {
    let Some(dir) = video.parent() else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = std::iter::once(dir.to_path_buf())
        .chain(SUBTITLE_FOLDERS.iter().map(|f| dir.join(f)))
        .filter_map(|d| std::fs::read_dir(d).ok())
        .flat_map(|entries| entries.flatten())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_subtitle(p))
        .collect();

    found.sort();
    found.dedup();
    found
}

/// Score a candidate: exact stem 3, episode tag plus language (or language
/// alone for movies) 2, anything else 1.
fn score(subtitle: &Path, video_stem: &str, entry: &VideoEntry, keywords: &[String]) -> u8 {
    let Some(stem) = subtitle.file_stem().and_then(|s| s.to_str()) else {
        return 0;
    };

    if stem == video_stem {
        return 3;
    }

    // "Show.S01E02.zh.srt" has stem "Show.S01E02.zh"
    if let Some((base, _)) = stem.rsplit_once('.') {
        if base == video_stem && has_language(stem, keywords) {
            return 3;
        }
    }

    let lower = stem.to_lowercase();
    let language = has_language(&lower, keywords);
    if entry.is_series {
        let tag = format!("s{:02}e{:02}", entry.season, entry.episode);
        if lower.contains(&tag) && language {
            return 2;
        }
        return 1;
    }

    if language {
        2
    } else {
        1
    }
}

fn has_language(stem: &str, keywords: &[String]) -> bool {
    let lower = stem.to_lowercase();
    keywords.iter().any(|k| lower.contains(k.as_str()))
}

/// Pick the best subtitle for a video, first in name order among equals
pub fn find_best_subtitle(entry: &VideoEntry, language: &str) -> Option<PathBuf> {
    let video = entry.file_path();
    let video_stem = video.file_stem()?.to_string_lossy().into_owned();
    let keywords = language_keywords(language);

    let mut best: Option<(u8, PathBuf)> = None;
    for candidate in list_subtitles(video) {
        let s = score(&candidate, &video_stem, entry, &keywords);
        if best.as_ref().map_or(true, |(top, _)| s > *top) {
            best = Some((s, candidate));
        }
    }

    let (_, path) = best?;
    tracing::debug!("Subtitle for {}: {}", video.display(), path.display());
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_for(path: &Path) -> VideoEntry {
        VideoEntry::new(path, 0)
    }

    #[test]
    fn test_exact_stem_wins() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("Heat.mkv");
        std::fs::write(&video, b"").unwrap();
        std::fs::write(dir.path().join("Another.chs.srt"), b"").unwrap();
        std::fs::write(dir.path().join("Heat.en.srt"), b"").unwrap();
        std::fs::write(dir.path().join("Heat.srt"), b"").unwrap();

        let best = find_best_subtitle(&entry_for(&video), "zh").unwrap();
        assert_eq!(best, dir.path().join("Heat.srt"));
    }

    #[test]
    fn test_equal_scores_keep_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("Heat.mkv");
        std::fs::write(&video, b"").unwrap();
        std::fs::write(dir.path().join("Heat.srt"), b"").unwrap();
        std::fs::write(dir.path().join("Heat.chs.srt"), b"").unwrap();

        let best = find_best_subtitle(&entry_for(&video), "zh").unwrap();
        assert_eq!(best, dir.path().join("Heat.chs.srt"));
    }

    #[test]
    fn test_episode_tag_and_language_in_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("[Group] Show - 02.mkv");
        std::fs::write(&video, b"").unwrap();
        let subs = dir.path().join("字幕");
        std::fs::create_dir(&subs).unwrap();
        std::fs::write(subs.join("Show.S01E01.chs.ass"), b"").unwrap();
        std::fs::write(subs.join("Show.S01E02.chs.ass"), b"").unwrap();
        std::fs::write(subs.join("Show.S01E02.en.ass"), b"").unwrap();

        let mut entry = entry_for(&video);
        entry.is_series = true;
        entry.season = 1;
        entry.episode = 2;

        let best = find_best_subtitle(&entry, "zh").unwrap();
        assert!(best.ends_with("Show.S01E02.chs.ass"));
    }

    #[test]
    fn test_movie_prefers_language() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mp4");
        std::fs::write(&video, b"").unwrap();
        std::fs::write(dir.path().join("a.en.srt"), b"").unwrap();
        std::fs::write(dir.path().join("b.简体.srt"), b"").unwrap();

        let best = find_best_subtitle(&entry_for(&video), "zh").unwrap();
        assert!(best.ends_with("b.简体.srt"));
    }

    #[test]
    fn test_no_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mp4");
        std::fs::write(&video, b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        assert!(find_best_subtitle(&entry_for(&video), "zh").is_none());
    }
}
