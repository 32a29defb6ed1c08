use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result of a MongoDB store operation.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB live store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Rejected connection string.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Client options were rejected by the driver.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered during startup.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Number of pings attempted.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic health check ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Target collection.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Answer upsert failed.
    #[error("failed to save answer of `{username}` for question `{question_id}`")]
    SaveAnswer {
        /// Author of the answer.
        username: String,
        /// Question identifier.
        question_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Answer aggregation failed.
    #[error("failed to load answers for question `{question_id}`")]
    LoadAnswers {
        /// Question identifier.
        question_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Chat insert failed.
    #[error("failed to save chat message in room `{room_id}`")]
    SaveChat {
        /// Room identifier.
        room_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Chat transcript query failed.
    #[error("failed to load chat transcript of room `{room_id}`")]
    LoadChat {
        /// Room identifier.
        room_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Audience question write failed.
    #[error("failed to save audience question `{id}`")]
    SaveQuestion {
        /// Question identifier.
        id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Audience question query failed.
    #[error("failed to load audience questions of room `{room_id}`")]
    LoadQuestions {
        /// Room identifier.
        room_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored document does not decode.
    #[error("document `{id}` in collection `{collection}` is malformed")]
    MalformedDocument {
        /// Collection holding the document.
        collection: &'static str,
        /// Identifier of the document.
        id: String,
    },
    /// Membership query failed.
    #[error("failed to query memberships of user `{user_id}`")]
    LoadMemberships {
        /// Member whose groups were requested.
        user_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
