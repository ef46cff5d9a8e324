// Filename and folder-name parsing for movies and episodes

use regex::Regex;
use std::sync::LazyLock;

static RE_SEASON_EP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])s(\d{1,2})[\s._-]*e(\d{1,3})(?:[^0-9]|$)").unwrap()
});
static RE_CROSS_EP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(\d{1,2})x(\d{2,3})(?:[^a-z0-9]|$)").unwrap()
});
static RE_CN_SEASON_EP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第\s*(\d{1,2})\s*季\s*第\s*(\d{1,3})\s*[集话話]").unwrap()
});
static RE_CN_EP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*(\d{1,3})\s*[集话話]").unwrap());
static RE_BARE_EP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])ep?\.?\s?(\d{1,3})(?:[^0-9]|$)").unwrap()
});
static RE_ANIME_EP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s-\s*(\d{1,3})(?:v\d)?(?:[\s\[\(]|$)").unwrap());
static RE_GROUP_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s*[\[【][^\]】]*[\]】]\s*-?)+\s*").unwrap());
static RE_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\[【][^\]】]*[\]】]").unwrap());
static RE_RELEASE_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:2160p|1080p|1080i|720p|576p|480p|4k|uhd|bluray|blu-ray|bdrip|brrip|webrip|web-dl|webdl|hdtv|dvdrip|hdrip|x264|x265|h\.?264|h\.?265|hevc|avc|aac\d?(?:\.\d)?|ac3|eac3|flac|opus|dts|atmos|truehd|10bit|8bit|hdr10|hdr|sdr|remux|proper|repack|multi|dual|dubbed|subbed|nf|amzn|dsnp|hmax)\b.*$",
    )
    .unwrap()
});
static RE_PAREN_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*[\(\[]((?:19|20)\d{2})[\)\]]").unwrap());
static RE_BARE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)[\s\-]+((?:19|20)\d{2})(?:\s|$)").unwrap());
static RE_TRAILING_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[\(\[]?(?:19|20)\d{2}[\)\]]?$").unwrap());
static RE_SEASON_INFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+S\d{1,2}(?:-S?\d{1,2})?(?:\s|$).*$").unwrap());
static RE_GROUP_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-[A-Za-z0-9]+$").unwrap());
static RE_SEASON_FOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:season|series|staffel|saison|s)[\s._-]*(\d{1,2})$").unwrap()
});
static RE_CN_SEASON_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^第\s*(\d{1,2})\s*季$").unwrap());
static RE_SPACE_COLLAPSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Season/episode information recovered from a file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEpisode {
    /// Show name before the episode marker, possibly empty
    pub show_name: String,
    /// `None` when the pattern only carries an episode number
    pub season: Option<u32>,
    pub episode: u32,
    /// Text after the episode marker, release tokens removed
    pub episode_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMovie {
    pub title: String,
    pub year: Option<i32>,
}

/// Parse an episode marker out of a file stem (no extension).
///
/// Tried in order: `S01E02`, `1x02`, `第1季第2集`, `第2集`, `E02`/`EP02`,
/// and the anime-style `Show - 02`.
pub fn parse_episode(stem: &str) -> Option<ParsedEpisode> {
    if let Some(caps) = RE_SEASON_EP.captures(stem) {
        let season = caps.get(1)?.as_str().parse().ok()?;
        let episode = caps.get(2)?;
        return Some(build_episode(
            stem,
            caps.get(0)?.start(),
            episode.end(),
            Some(season),
            episode.as_str().parse().ok()?,
        ));
    }

    if let Some(caps) = RE_CROSS_EP.captures(stem) {
        let season: u32 = caps.get(1)?.as_str().parse().ok()?;
        let episode = caps.get(2)?;
        if (1..=30).contains(&season) {
            return Some(build_episode(
                stem,
                caps.get(0)?.start(),
                episode.end(),
                Some(season),
                episode.as_str().parse().ok()?,
            ));
        }
    }

    if let Some(caps) = RE_CN_SEASON_EP.captures(stem) {
        let season = caps.get(1)?.as_str().parse().ok()?;
        let whole = caps.get(0)?;
        return Some(build_episode(
            stem,
            whole.start(),
            whole.end(),
            Some(season),
            caps.get(2)?.as_str().parse().ok()?,
        ));
    }

    if let Some(caps) = RE_CN_EP.captures(stem) {
        let whole = caps.get(0)?;
        return Some(build_episode(
            stem,
            whole.start(),
            whole.end(),
            None,
            caps.get(1)?.as_str().parse().ok()?,
        ));
    }

    if let Some(caps) = RE_BARE_EP.captures(stem) {
        let episode = caps.get(1)?;
        return Some(build_episode(
            stem,
            caps.get(0)?.start(),
            episode.end(),
            None,
            episode.as_str().parse().ok()?,
        ));
    }

    if let Some(caps) = RE_ANIME_EP.captures(stem) {
        let episode = caps.get(1)?;
        let number: u32 = episode.as_str().parse().ok()?;
        if number >= 1 {
            return Some(build_episode(
                stem,
                caps.get(0)?.start(),
                episode.end(),
                None,
                number,
            ));
        }
    }

    None
}

fn build_episode(
    stem: &str,
    marker_start: usize,
    number_end: usize,
    season: Option<u32>,
    episode: u32,
) -> ParsedEpisode {
    ParsedEpisode {
        show_name: extract_show_name(&stem[..marker_start]),
        season,
        episode,
        episode_title: extract_episode_title(&stem[number_end..]),
    }
}

fn extract_show_name(prefix: &str) -> String {
    let name = RE_GROUP_TAGS.replace(prefix, "");
    let name = name.replace(['.', '_'], " ");
    let name = RE_RELEASE_INFO.replace(&name, "");
    let name = RE_SPACE_COLLAPSE.replace_all(name.trim(), " ");
    let name = name.trim_end_matches(['-', ' ', '_']);
    let name = RE_TRAILING_YEAR.replace(name, "");
    name.trim_end_matches(['-', ' ']).trim().to_string()
}

fn extract_episode_title(suffix: &str) -> String {
    let title = suffix.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '.' | '_' | '-' | ']' | ')')
    });
    let title = RE_BRACKETS.replace_all(title, " ");
    let title = title.replace(['.', '_'], " ");
    let title = RE_RELEASE_INFO.replace(&title, "");
    let title = RE_SPACE_COLLAPSE.replace_all(title.trim(), " ");
    title.trim_matches(['-', ' ']).to_string()
}

/// Movie title and year from a file stem
pub fn parse_movie(stem: &str) -> ParsedMovie {
    let name = RE_GROUP_TAGS.replace(stem, "");
    let name = name.replace(['.', '_'], " ");
    let name = RE_SPACE_COLLAPSE.replace_all(name.trim(), " ").to_string();

    let (title, year) = if let Some(caps) = RE_PAREN_YEAR.captures(&name) {
        (
            caps.get(1).map_or("", |m| m.as_str()).to_string(),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        )
    } else if let Some(caps) = RE_BARE_YEAR.captures(&name) {
        (
            caps.get(1).map_or("", |m| m.as_str()).to_string(),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        )
    } else {
        (name.clone(), None)
    };

    let title = RE_RELEASE_INFO.replace(&title, "");
    let title = RE_BRACKETS.replace_all(&title, " ");
    let title = RE_SPACE_COLLAPSE.replace_all(title.trim(), " ");
    let title = title.trim_matches(['-', ' ', '(', '[']).to_string();

    if title.is_empty() {
        return ParsedMovie {
            title: stem.to_string(),
            year,
        };
    }

    ParsedMovie { title, year }
}

/// Display title for a file stem; never empty unless the stem is
pub fn clean_title(stem: &str) -> String {
    parse_movie(stem).title
}

/// Clean a release-style folder name
/// e.g. "Himouto.Umaru.chan.S01.1080p.BluRay.x265-smol" -> "Himouto Umaru chan"
pub fn clean_folder_name(name: &str) -> String {
    let name = RE_GROUP_TAGS.replace(name, "");
    let name = name.replace(['.', '_'], " ");
    let name = RE_SEASON_INFO.replace(&name, "");
    let name = RE_RELEASE_INFO.replace(&name, "");
    let name = RE_GROUP_SUFFIX.replace(name.trim_end(), "");
    let name = RE_SPACE_COLLAPSE.replace_all(&name, " ");
    name.trim().to_string()
}

/// Folder name without a trailing `(YYYY)`, plus the year
pub fn extract_year_from_name(name: &str) -> (String, Option<i32>) {
    let cleaned = clean_folder_name(name);

    if let Some(paren_start) = cleaned.rfind('(') {
        let potential_year =
            cleaned[paren_start..].trim_matches(|c| c == '(' || c == ')' || c == ' ');
        if potential_year.len() == 4 {
            if let Ok(year) = potential_year.parse::<i32>() {
                if (1900..=2100).contains(&year) {
                    return (cleaned[..paren_start].trim().to_string(), Some(year));
                }
            }
        }
    }
    (cleaned, None)
}

/// Season number for folders like `Season 2`, `S02`, `第2季`; `Specials` is season 0
pub fn season_folder_number(name: &str) -> Option<u32> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("specials") || name.eq_ignore_ascii_case("special") {
        return Some(0);
    }
    RE_SEASON_FOLDER
        .captures(name)
        .or_else(|| RE_CN_SEASON_FOLDER.captures(name))
        .and_then(|caps| caps.get(1)?.as_str().parse().ok())
}

/// Folders never scanned (case-insensitive)
const SKIP_FOLDER_NAMES: &[&str] = &[
    "extras",
    "extra",
    "bonus",
    "featurettes",
    "trailers",
    "sample",
    "samples",
    "behind the scenes",
    "deleted scenes",
    "interviews",
    "shorts",
    "subs",
    "subtitles",
];

pub fn should_skip_folder(folder_name: &str) -> bool {
    if folder_name.starts_with('.') {
        return true;
    }

    let name_lower = folder_name.to_lowercase();

    if SKIP_FOLDER_NAMES.contains(&name_lower.as_str()) {
        return true;
    }

    if name_lower.starts_with("ncop") || name_lower.starts_with("nced") {
        return true;
    }

    name_lower.contains("creditless") || name_lower.contains("textless")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_episode() {
        let parsed = parse_episode("Breaking Bad S01E05").unwrap();
        assert_eq!(parsed.show_name, "Breaking Bad");
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episode, 5);
        assert_eq!(parsed.episode_title, "");
    }

    #[test]
    fn test_parse_dotted_episode_with_title() {
        let parsed = parse_episode("Breaking.Bad.S01E05.Gray.Matter.720p.WEB-DL").unwrap();
        assert_eq!(parsed.show_name, "Breaking Bad");
        assert_eq!((parsed.season, parsed.episode), (Some(1), 5));
        assert_eq!(parsed.episode_title, "Gray Matter");
    }

    #[test]
    fn test_parse_separated_season_episode() {
        let parsed = parse_episode("Show_Name_s02_e10").unwrap();
        assert_eq!(parsed.show_name, "Show Name");
        assert_eq!((parsed.season, parsed.episode), (Some(2), 10));

        let parsed = parse_episode("Show Name S03 E07").unwrap();
        assert_eq!((parsed.season, parsed.episode), (Some(3), 7));
    }

    #[test]
    fn test_parse_cross_episode() {
        let parsed = parse_episode("Firefly 1x03 Bushwhacked").unwrap();
        assert_eq!(parsed.show_name, "Firefly");
        assert_eq!((parsed.season, parsed.episode), (Some(1), 3));
        assert_eq!(parsed.episode_title, "Bushwhacked");
    }

    #[test]
    fn test_resolution_is_not_an_episode() {
        assert!(parse_episode("Some Movie 1920x1080").is_none());
        assert!(parse_episode("Heat.1995.1080p.BluRay.x264").is_none());
    }

    #[test]
    fn test_parse_chinese_patterns() {
        let parsed = parse_episode("庆余年第2季第3集").unwrap();
        assert_eq!(parsed.show_name, "庆余年");
        assert_eq!((parsed.season, parsed.episode), (Some(2), 3));

        let parsed = parse_episode("三体 第12集").unwrap();
        assert_eq!(parsed.show_name, "三体");
        assert_eq!((parsed.season, parsed.episode), (None, 12));
    }

    #[test]
    fn test_parse_bare_episode() {
        let parsed = parse_episode("Planet Earth EP04").unwrap();
        assert_eq!(parsed.show_name, "Planet Earth");
        assert_eq!((parsed.season, parsed.episode), (None, 4));

        let parsed = parse_episode("Planet.Earth.E05.Deserts").unwrap();
        assert_eq!(parsed.episode, 5);
        assert_eq!(parsed.episode_title, "Deserts");
    }

    #[test]
    fn test_parse_anime_episode() {
        let parsed = parse_episode("[SubsPlease] Frieren - 07 (1080p) [ABCD1234]").unwrap();
        assert_eq!(parsed.show_name, "Frieren");
        assert_eq!((parsed.season, parsed.episode), (None, 7));
    }

    #[test]
    fn test_parse_anime_episode_with_e_prefix() {
        let parsed = parse_episode(
            "[Reaktor] BECK - Mongolian Chop Squad - E01 [1080p][x265][10-bit][Dual-Audio]",
        )
        .unwrap();
        assert_eq!(parsed.show_name, "BECK - Mongolian Chop Squad");
        assert_eq!(parsed.episode, 1);
    }

    #[test]
    fn test_plain_name_is_not_episode() {
        assert!(parse_episode("Home Video").is_none());
        assert!(parse_episode("The Matrix (1999)").is_none());
        assert!(parse_episode("Heat - 1995").is_none());
    }

    #[test]
    fn test_parse_movie() {
        let parsed = parse_movie("The Matrix (1999)");
        assert_eq!(parsed.title, "The Matrix");
        assert_eq!(parsed.year, Some(1999));

        let parsed = parse_movie("The.Matrix.1999.1080p.BluRay.x264");
        assert_eq!(parsed.title, "The Matrix");
        assert_eq!(parsed.year, Some(1999));

        let parsed = parse_movie("Blade Runner 2049 (2017)");
        assert_eq!(parsed.title, "Blade Runner 2049");
        assert_eq!(parsed.year, Some(2017));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("[YTS] Heat (1995) [1080p]"), "Heat");
        assert_eq!(clean_title("Movie.Name.720p.WEB-DL"), "Movie Name");
        assert_eq!(clean_title("Some_Home_Video"), "Some Home Video");
        assert_eq!(clean_title("Octopus Garden"), "Octopus Garden");
        // Nothing left after cleaning: keep the raw stem
        assert_eq!(clean_title("1080p"), "1080p");
    }

    #[test]
    fn test_clean_folder_name() {
        assert_eq!(
            clean_folder_name("Himouto.Umaru.chan.S01.1080p.BluRay.x265-smol"),
            "Himouto Umaru chan"
        );
        assert_eq!(
            clean_folder_name("Re.ZERO.Starting.Life.in.Another.World."),
            "Re ZERO Starting Life in Another World"
        );
        assert_eq!(clean_folder_name("Link Click (2021)"), "Link Click (2021)");
    }

    #[test]
    fn test_extract_year_from_name() {
        let (name, year) = extract_year_from_name("My Happy Marriage (2023)");
        assert_eq!(name, "My Happy Marriage");
        assert_eq!(year, Some(2023));

        let (name, year) = extract_year_from_name("Show (Reboot) (2024)");
        assert_eq!(name, "Show (Reboot)");
        assert_eq!(year, Some(2024));

        let (name, year) = extract_year_from_name("Show (abc)");
        assert_eq!(name, "Show (abc)");
        assert_eq!(year, None);
    }

    #[test]
    fn test_season_folder_number() {
        assert_eq!(season_folder_number("Season 2"), Some(2));
        assert_eq!(season_folder_number("season_01"), Some(1));
        assert_eq!(season_folder_number("S03"), Some(3));
        assert_eq!(season_folder_number("第4季"), Some(4));
        assert_eq!(season_folder_number("Specials"), Some(0));
        assert_eq!(season_folder_number("Seasonal Specials"), None);
        assert_eq!(season_folder_number("Breaking Bad"), None);
    }

    #[test]
    fn test_should_skip_folder() {
        assert!(should_skip_folder("Extras"));
        assert!(should_skip_folder("NCOP1"));
        assert!(should_skip_folder("Creditless Openings"));
        assert!(should_skip_folder(".git"));
        assert!(!should_skip_folder("Season 1"));
        assert!(!should_skip_folder("Specials"));
    }
}
