//! TMDB-backed metadata provider.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{MetadataProvider, MovieDetails};
use crate::config::MetadataConfig;

#[derive(Debug, Error)]
enum TmdbError {
    #[error("TMDB request failed")]
    Request(#[source] reqwest::Error),
    #[error("TMDB answered with status {0}")]
    Status(StatusCode),
    #[error("TMDB response could not be decoded")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    vote_average: f32,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

/// HTTP client for `GET /movie/{id}` with an in-process cache of successful lookups.
#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    config: Arc<MetadataConfig>,
    token: Arc<str>,
    cache: Arc<DashMap<u64, MovieDetails>>,
}

impl TmdbClient {
    /// Build a client authenticating with the bearer `token`.
    pub fn new(config: MetadataConfig, token: impl Into<Arc<str>>) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
            token: token.into(),
            cache: Arc::new(DashMap::new()),
        }
    }

    async fn fetch(&self, catalog_id: u64) -> Result<MovieDetails, TmdbError> {
        let url = format!(
            "{}/movie/{}",
            self.config.base_url.trim_end_matches('/'),
            catalog_id
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.as_ref())
            .query(&[("language", self.config.language.as_str())])
            .send()
            .await
            .map_err(TmdbError::Request)?;

        if !response.status().is_success() {
            return Err(TmdbError::Status(response.status()));
        }

        let movie = response
            .json::<TmdbMovie>()
            .await
            .map_err(TmdbError::Decode)?;

        let poster_url = movie.poster_path.as_ref().map(|path| {
            format!("{}{}", self.config.image_base_url.trim_end_matches('/'), path)
        });
        Ok(MovieDetails {
            catalog_id,
            title: movie
                .title
                .or(movie.name)
                .unwrap_or_else(|| MovieDetails::placeholder(catalog_id).title),
            overview: movie.overview,
            poster_path: movie.poster_path,
            poster_url,
            genres: movie.genres.into_iter().map(|genre| genre.name).collect(),
            vote_average: movie.vote_average,
        })
    }
}

impl MetadataProvider for TmdbClient {
    fn lookup(&self, catalog_id: u64) -> BoxFuture<'static, MovieDetails> {
        let provider = self.clone();
        Box::pin(async move {
            if let Some(hit) = provider.cache.get(&catalog_id) {
                return hit.clone();
            }
            match provider.fetch(catalog_id).await {
                Ok(details) => {
                    debug!(catalog_id, "fetched TMDB metadata");
                    provider.cache.insert(catalog_id, details.clone());
                    details
                }
                Err(err) => {
                    warn!(catalog_id, error = %err, "TMDB lookup failed; using placeholder");
                    MovieDetails::placeholder(catalog_id)
                }
            }
        })
    }
}
