//! Movie metadata provider interface.

mod tmdb;

use futures::future::{BoxFuture, ready};
use serde::Serialize;

pub use self::tmdb::TmdbClient;

/// Display data for one catalog title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieDetails {
    /// Catalog identifier.
    pub catalog_id: u64,
    /// Localised title.
    pub title: String,
    /// Plot summary.
    pub overview: String,
    /// Poster path relative to the image CDN.
    pub poster_path: Option<String>,
    /// Absolute poster URL when a path is known.
    pub poster_url: Option<String>,
    /// Genre names.
    pub genres: Vec<String>,
    /// Average rating on a 0-10 scale.
    pub vote_average: f32,
}

impl MovieDetails {
    /// Stand-in returned when the provider cannot describe `catalog_id`.
    pub fn placeholder(catalog_id: u64) -> Self {
        Self {
            catalog_id,
            title: format!("Title #{catalog_id}"),
            overview: String::new(),
            poster_path: None,
            poster_url: None,
            genres: Vec::new(),
            vote_average: 0.0,
        }
    }

    /// Whether this value came from [`MovieDetails::placeholder`].
    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder(self.catalog_id)
    }
}

/// Source of title metadata. Lookups never fail; providers fall back to a placeholder.
pub trait MetadataProvider: Send + Sync {
    /// Describe `catalog_id`.
    fn lookup(&self, catalog_id: u64) -> BoxFuture<'static, MovieDetails>;
}

/// Provider that always answers with placeholders, used when no API token is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderMetadata;

impl MetadataProvider for PlaceholderMetadata {
    fn lookup(&self, catalog_id: u64) -> BoxFuture<'static, MovieDetails> {
        Box::pin(ready(MovieDetails::placeholder(catalog_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_provider_never_fails() {
        let details = PlaceholderMetadata.lookup(603).await;
        assert_eq!(details.catalog_id, 603);
        assert!(details.is_placeholder());
    }
}
