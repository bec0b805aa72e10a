use std::{env, time::Duration};

use super::error::{CouchDaoError, CouchResult};

/// Basic-auth pair sent with every CouchDB request.
#[derive(Debug, Clone)]
pub struct CouchCredentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Where the CouchDB backend keeps its documents.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding sessions, titles and statuses.
    pub database: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<CouchCredentials>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` (defaults to `reel_pick`)
    /// and the `COUCH_USERNAME`/`COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = env::var("COUCH_BASE_URL").map_err(|_| CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = env::var("COUCH_DB").unwrap_or_else(|_| "reel_pick".to_owned());
        let credentials = match (env::var("COUCH_USERNAME"), env::var("COUCH_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(CouchCredentials { username, password }),
            _ => None,
        };

        Ok(Self {
            base_url,
            database,
            credentials,
            request_timeout: Duration::from_secs(10),
        })
    }
}
