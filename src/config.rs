//! Application-level configuration loading: listener port, token validation and storage backend.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::GroupMembershipEntity;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_LIVE_CONFIG_PATH";
const DEFAULT_PORT: u16 = 8080;
/// Buffered events per group notification channel before slow subscribers lag.
const DEFAULT_NOTIFICATION_CAPACITY: usize = 16;

/// Persistence backend selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local store, lost on restart.
    Memory,
    /// MongoDB reachable at `uri`.
    Mongo {
        /// Connection string.
        uri: String,
        /// Database name; the backend default when absent.
        database: Option<String>,
    },
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    port: u16,
    jwt_secret: Option<String>,
    jwt_issuer: Option<String>,
    notification_capacity: usize,
    storage: StorageBackend,
    group_memberships: Vec<GroupMembershipEntity>,
}

impl AppConfig {
    /// Load the configuration from disk and the environment, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let from_file = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        from_file.with_overrides(|key| env::var(key).ok())
    }

    /// Parse the JSON configuration format.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Apply environment-style overrides looked up through `lookup`.
    ///
    /// `MONGO_URI` switches the backend to MongoDB; `MONGO_DB` alone only renames the database
    /// of an already configured MongoDB backend.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("PORT")
            .or_else(|| lookup("SERVER_PORT"))
            .and_then(|value| value.parse::<u16>().ok())
        {
            self.port = port;
        }

        if let Some(secret) = lookup("JWT_SECRET_KEY").filter(|value| !value.is_empty()) {
            self.jwt_secret = Some(secret);
        }

        let database = lookup("MONGO_DB").filter(|value| !value.is_empty());
        if let Some(uri) = lookup("MONGO_URI").filter(|value| !value.is_empty()) {
            let database = database.or_else(|| match &self.storage {
                StorageBackend::Mongo { database, .. } => database.clone(),
                StorageBackend::Memory => None,
            });
            self.storage = StorageBackend::Mongo { uri, database };
        } else if let (Some(database), StorageBackend::Mongo { database: current, .. }) =
            (database, &mut self.storage)
        {
            *current = Some(database);
        }

        self
    }

    /// Replace the token signing secret.
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    /// Port the HTTP listener binds to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shared HS256 secret used to verify access tokens, if configured.
    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref()
    }

    /// Expected `iss` claim, if any.
    pub fn jwt_issuer(&self) -> Option<&str> {
        self.jwt_issuer.as_deref()
    }

    /// Buffer size of each group notification channel.
    pub fn notification_capacity(&self) -> usize {
        self.notification_capacity
    }

    /// Selected persistence backend.
    pub fn storage(&self) -> &StorageBackend {
        &self.storage
    }

    /// Memberships seeded into the in-memory group directory.
    pub fn group_memberships(&self) -> &[GroupMembershipEntity] {
        &self.group_memberships
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            jwt_secret: None,
            jwt_issuer: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            storage: StorageBackend::Memory,
            group_memberships: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    jwt_secret: Option<String>,
    #[serde(default)]
    jwt_issuer: Option<String>,
    #[serde(default)]
    notification_capacity: Option<usize>,
    #[serde(default)]
    storage: Option<RawStorage>,
    #[serde(default)]
    group_memberships: Vec<GroupMembershipEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RawStorage {
    Memory,
    Mongo {
        uri: String,
        #[serde(default)]
        database: Option<String>,
    },
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        let storage = match value.storage {
            Some(RawStorage::Mongo { uri, database }) => StorageBackend::Mongo { uri, database },
            Some(RawStorage::Memory) | None => StorageBackend::Memory,
        };

        Self {
            port: value.port.unwrap_or(defaults.port),
            jwt_secret: value.jwt_secret.filter(|secret| !secret.is_empty()),
            jwt_issuer: value.jwt_issuer,
            notification_capacity: value
                .notification_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.notification_capacity),
            storage,
            group_memberships: value.group_memberships,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::dao::models::MembershipStatus;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_full_config_file() {
        let config = AppConfig::from_json(
            r#"{
                "port": 9000,
                "jwt_secret": "s3cret",
                "jwt_issuer": "quiz-auth",
                "notification_capacity": 32,
                "storage": {"kind": "mongo", "uri": "mongodb://db:27017", "database": "live"},
                "group_memberships": [
                    {"group_id": "g1", "user_id": "u1", "status": "joined"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.port(), 9000);
        assert_eq!(config.jwt_secret(), Some("s3cret"));
        assert_eq!(config.jwt_issuer(), Some("quiz-auth"));
        assert_eq!(config.notification_capacity(), 32);
        assert_eq!(
            config.storage(),
            &StorageBackend::Mongo {
                uri: "mongodb://db:27017".into(),
                database: Some("live".into()),
            }
        );
        assert_eq!(config.group_memberships()[0].status, MembershipStatus::Joined);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.jwt_secret(), None);
        assert_eq!(config.notification_capacity(), DEFAULT_NOTIFICATION_CAPACITY);
        assert_eq!(config.storage(), &StorageBackend::Memory);
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = AppConfig::default().with_overrides(lookup(&[
            ("SERVER_PORT", "7000"),
            ("JWT_SECRET_KEY", "from-env"),
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("MONGO_DB", "quiz"),
        ]));

        assert_eq!(config.port(), 7000);
        assert_eq!(config.jwt_secret(), Some("from-env"));
        assert_eq!(
            config.storage(),
            &StorageBackend::Mongo {
                uri: "mongodb://localhost:27017".into(),
                database: Some("quiz".into()),
            }
        );
    }

    #[test]
    fn database_override_alone_keeps_memory_backend() {
        let config = AppConfig::default().with_overrides(lookup(&[("MONGO_DB", "quiz")]));
        assert_eq!(config.storage(), &StorageBackend::Memory);
    }
}
