use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// Database used when `MONGO_DB` is not set.
const DEFAULT_DATABASE: &str = "reel_pick";

/// Connection settings for the MongoDB backend.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding the session collections.
    pub database_name: String,
    /// Pings tried before giving up on a connection.
    pub connect_attempts: u32,
    /// Pause after the first failed ping; doubles on each retry.
    pub initial_backoff: Duration,
}

impl MongoConfig {
    /// Parse `uri`; the database defaults to `reel_pick`.
    pub async fn from_uri(uri: &str, database: Option<String>) -> MongoResult<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name: database.unwrap_or_else(|| DEFAULT_DATABASE.to_owned()),
            connect_attempts: 10,
            initial_backoff: Duration::from_millis(250),
        })
    }

    /// Read `MONGO_URI` (required), `MONGO_DB` and `MONGO_CONNECT_ATTEMPTS`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let mut config = Self::from_uri(&uri, std::env::var("MONGO_DB").ok()).await?;
        if let Some(attempts) = std::env::var("MONGO_CONNECT_ATTEMPTS")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            config.connect_attempts = attempts;
        }
        Ok(config)
    }
}
