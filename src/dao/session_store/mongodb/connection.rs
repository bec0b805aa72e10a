use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tracing::{debug, info};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// Open the configured database, pinging until it answers or the attempts run out.
pub async fn open_database(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut delay = config.initial_backoff;
    for attempt in 1..=config.connect_attempts {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => {
                info!(database = %config.database_name, attempt, "MongoDB reachable");
                return Ok(database);
            }
            Err(source) if attempt == config.connect_attempts => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                debug!(attempt, error = %err, "MongoDB ping failed; retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }
    }

    Err(MongoDaoError::NoConnectAttempts)
}

const MAX_BACKOFF: Duration = Duration::from_secs(5);
