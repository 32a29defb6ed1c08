use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "quiz_live";
const APP_NAME: &str = "quiz-live-back";

/// Parsed connection settings for the live-session database.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding the live collections.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`, tagging the client with the service name. `database` falls back to
    /// [`DEFAULT_DATABASE`] when the configuration leaves it out.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());

        Ok(Self {
            options,
            database_name: database
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_DATABASE)
                .to_owned(),
        })
    }
}
