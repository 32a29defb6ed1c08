/// Persistence collaborators consumed by the live-session engine.
pub mod live_store;
/// Persisted record definitions.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
