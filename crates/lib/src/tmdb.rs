//! TMDB v3 API client (https://api.themoviedb.org/3 by default).
//!
//! Responses tolerate absent fields (missing runtime, death date, image paths)
//! by deserializing them as Options; display defaults are applied by `movies`.

use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Client for the TMDB HTTP API.
#[derive(Clone)]
pub struct TmdbClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum TmdbError {
    #[error("tmdb request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("tmdb api error: {0}")]
    Api(String),
}

/// Image url configuration, fetched once at startup and held immutably.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub images: ImageConfiguration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfiguration {
    pub base_url: String,
    #[serde(default)]
    pub poster_sizes: Vec<String>,
    #[serde(default)]
    pub profile_sizes: Vec<String>,
}

impl ImageConfiguration {
    /// Smallest poster url for a path, when both are present.
    pub fn poster_url(&self, path: Option<&str>) -> Option<String> {
        let size = self.poster_sizes.first()?;
        let path = path?;
        Some(format!("{}{}{}", self.base_url, size, path))
    }

    /// Smallest profile url for a path, when both are present.
    pub fn profile_url(&self, path: Option<&str>) -> Option<String> {
        let size = self.profile_sizes.first()?;
        let path = path?;
        Some(format!("{}{}{}", self.base_url, size, path))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// One search hit. Multi-search results carry `media_type`; typed searches
/// leave it empty. Movies have `title`, people and shows have `name`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult {
    pub id: u64,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
    #[serde(default)]
    pub known_for: Vec<KnownFor>,
}

/// A person's known-for credit (subset used for display).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnownFor {
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieDetail {
    pub id: u64,
    pub original_title: String,
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastMember {
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonDetail {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub deathday: Option<String>,
    #[serde(default)]
    pub place_of_birth: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
}

impl TmdbClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(tmdb_api_base);
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TmdbError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TmdbError::Api(format!("{} {} {}", path, status, body)));
        }
        Ok(res.json().await?)
    }

    /// GET /configuration — image base url and sizes.
    pub async fn configuration(&self) -> Result<Configuration, TmdbError> {
        self.get("/configuration", &[]).await
    }

    /// GET /search/multi — movies, people, and shows in one ranked list.
    pub async fn search_multi(&self, query: &str) -> Result<SearchResponse, TmdbError> {
        self.get("/search/multi", &[("query", query)]).await
    }

    /// GET /search/movie — optionally restricted to a release year.
    pub async fn search_movie(
        &self,
        query: &str,
        year: Option<&str>,
    ) -> Result<SearchResponse, TmdbError> {
        match year {
            Some(y) => {
                self.get("/search/movie", &[("query", query), ("year", y)])
                    .await
            }
            None => self.get("/search/movie", &[("query", query)]).await,
        }
    }

    /// GET /search/person.
    pub async fn search_person(&self, query: &str) -> Result<SearchResponse, TmdbError> {
        self.get("/search/person", &[("query", query)]).await
    }

    /// GET /movie/{id}.
    pub async fn movie(&self, id: u64) -> Result<MovieDetail, TmdbError> {
        self.get(&format!("/movie/{id}"), &[]).await
    }

    /// GET /movie/{id}/credits.
    pub async fn movie_credits(&self, id: u64) -> Result<Credits, TmdbError> {
        self.get(&format!("/movie/{id}/credits"), &[]).await
    }

    /// GET /person/{id}.
    pub async fn person(&self, id: u64) -> Result<PersonDetail, TmdbError> {
        self.get(&format!("/person/{id}"), &[]).await
    }
}

/// Resolve the TMDB API base URL (TMDB_API_BASE override for tests).
pub fn tmdb_api_base() -> String {
    std::env::var("TMDB_API_BASE").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}
