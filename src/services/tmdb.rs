// TMDB metadata provider
// API Documentation: https://developer.themoviedb.org/reference/intro/getting-started

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

pub const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
pub const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";

/// Where the API and poster images are served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmdbEndpoints {
    pub api_base: String,
    pub image_base: String,
}

impl Default for TmdbEndpoints {
    fn default() -> Self {
        Self {
            api_base: TMDB_API_BASE.to_string(),
            image_base: TMDB_IMAGE_BASE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults<T> {
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvSearchResult {
    pub id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieSearchResult {
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
pub struct TvDetails {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
pub struct SeasonDetails {
    pub season_number: i32,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeInfo {
    pub name: String,
    pub overview: Option<String>,
    pub episode_number: i32,
    pub season_number: i32,
    pub still_path: Option<String>,
}

/// Title-level metadata, shared by movies and series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleMetadata {
    pub tmdb_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
    pub genres: Vec<String>,
}

/// TMDB API client
pub struct TmdbClient {
    client: Client,
    api_key: String,
    language: String,
    endpoints: TmdbEndpoints,
}

impl TmdbClient {
    pub fn new(
        api_key: String,
        language: String,
        endpoints: TmdbEndpoints,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key,
            language,
            endpoints: TmdbEndpoints {
                api_base: endpoints.api_base.trim_end_matches('/').to_string(),
                image_base: endpoints.image_base.trim_end_matches('/').to_string(),
            },
        })
    }

    // The URL carries the API key, so it is stripped from every error
    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to request TMDB {}", what))?;

        if !response.status().is_success() {
            anyhow::bail!("TMDB {} request failed with status {}", what, response.status());
        }

        response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to parse TMDB {} response", what))
    }

    pub async fn search_tv(&self, query: &str) -> Result<Vec<TvSearchResult>> {
        let url = format!(
            "{}/search/tv?api_key={}&language={}&query={}&include_adult=false",
            self.endpoints.api_base,
            self.api_key,
            self.language,
            urlencoding::encode(query)
        );
        let response: SearchResults<TvSearchResult> = self.get_json(&url, "TV search").await?;
        Ok(response.results)
    }

    pub async fn search_movie(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<Vec<MovieSearchResult>> {
        let mut url = format!(
            "{}/search/movie?api_key={}&language={}&query={}&include_adult=false",
            self.endpoints.api_base,
            self.api_key,
            self.language,
            urlencoding::encode(query)
        );

        if let Some(y) = year {
            url.push_str(&format!("&year={}", y));
        }

        let response: SearchResults<MovieSearchResult> =
            self.get_json(&url, "movie search").await?;
        Ok(response.results)
    }

    pub async fn get_movie_details(&self, tmdb_id: i64) -> Result<MovieDetails> {
        let url = format!(
            "{}/movie/{}?api_key={}&language={}",
            self.endpoints.api_base, tmdb_id, self.api_key, self.language
        );
        self.get_json(&url, "movie details").await
    }

    pub async fn get_tv_details(&self, tmdb_id: i64) -> Result<TvDetails> {
        let url = format!(
            "{}/tv/{}?api_key={}&language={}",
            self.endpoints.api_base, tmdb_id, self.api_key, self.language
        );
        self.get_json(&url, "TV details").await
    }

    pub async fn get_season_details(&self, tv_id: i64, season_number: u32) -> Result<SeasonDetails> {
        let url = format!(
            "{}/tv/{}/season/{}?api_key={}&language={}",
            self.endpoints.api_base, tv_id, season_number, self.api_key, self.language
        );
        self.get_json(&url, "season details").await
    }

    /// Search a movie and fetch its details.
    ///
    /// Prefers a title match released in `year`, then any title match, then
    /// the first result.
    pub async fn find_movie(&self, title: &str, year: Option<i32>) -> Result<Option<TitleMetadata>> {
        let results = self.search_movie(title, year).await?;

        let matches =
            |r: &MovieSearchResult| title_matches(title, &r.title, r.original_title.as_deref());
        let best = year
            .and_then(|target| {
                results
                    .iter()
                    .find(|&r| matches(r) && release_year(r.release_date.as_deref()) == Some(target))
            })
            .or_else(|| results.iter().find(|&r| matches(r)))
            .or_else(|| {
                if !results.is_empty() {
                    tracing::debug!("No close TMDB match for '{}', taking first result", title);
                }
                results.first()
            });

        let Some(best) = best else {
            return Ok(None);
        };

        let details = self.get_movie_details(best.id).await?;
        Ok(Some(TitleMetadata {
            tmdb_id: details.id,
            title: details.title,
            overview: details.overview.filter(|o| !o.is_empty()),
            poster_url: details.poster_path.as_deref().map(|p| self.poster_url(p)),
            genres: details.genres.into_iter().map(|g| g.name).collect(),
        }))
    }

    /// Search a series by name and fetch its details
    pub async fn find_series(&self, name: &str) -> Result<Option<TitleMetadata>> {
        let results = self.search_tv(name).await?;

        let best = results
            .iter()
            .find(|r| title_matches(name, &r.name, r.original_name.as_deref()))
            .or_else(|| results.first());

        let Some(best) = best else {
            return Ok(None);
        };

        let details = self.get_tv_details(best.id).await?;
        Ok(Some(TitleMetadata {
            tmdb_id: details.id,
            title: details.name,
            overview: details.overview.filter(|o| !o.is_empty()),
            poster_url: details.poster_path.as_deref().map(|p| self.poster_url(p)),
            genres: details.genres.into_iter().map(|g| g.name).collect(),
        }))
    }

    /// Full image URL for a TMDB image path
    pub fn poster_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.image_base, path)
    }
}

fn release_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.split('-').next())
        .and_then(|y| y.parse().ok())
}

fn clean_for_match(s: &str) -> String {
    s.to_lowercase()
        .trim_end_matches(|c: char| c == ')' || c.is_ascii_digit() || c == '(' || c == ' ')
        .trim()
        .to_string()
}

/// Whether a search result plausibly names the same work as the query:
/// exact, substring with a length ratio above 0.4, or enough shared words.
pub fn title_matches(query: &str, title: &str, original: Option<&str>) -> bool {
    let query_clean = clean_for_match(query);
    if query_clean.is_empty() {
        return false;
    }

    let candidates = std::iter::once(clean_for_match(title))
        .chain(original.map(clean_for_match))
        .filter(|c| !c.is_empty());

    for candidate in candidates {
        if candidate == query_clean {
            return true;
        }

        if candidate.contains(&query_clean) || query_clean.contains(&candidate) {
            let shorter = query_clean.chars().count().min(candidate.chars().count());
            let longer = query_clean.chars().count().max(candidate.chars().count());
            if shorter as f64 / longer as f64 > 0.4 {
                return true;
            }
        }

        let query_words: HashSet<&str> = query_clean.split_whitespace().collect();
        let title_words: HashSet<&str> = candidate.split_whitespace().collect();
        let common_words = query_words.intersection(&title_words).count();

        if !query_words.is_empty() && !title_words.is_empty() {
            let match_ratio = common_words as f64 / query_words.len().min(title_words.len()) as f64;
            if match_ratio >= 0.6 || (common_words >= 2 && match_ratio >= 0.4) {
                return true;
            }
        }
    }

    false
}
