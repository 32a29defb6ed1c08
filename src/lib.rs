//! Library crate for quiz-live-back, exposing modules for binaries and integration tests.

/// Environment driven configuration.
pub mod config;
/// Persistence collaborators and their records.
pub mod dao;
/// Wire payloads.
pub mod dto;
/// Errors surfaced to clients.
pub mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Room logic, relays and socket gateways.
pub mod services;
/// Shared state: live rooms, presence and group channels.
pub mod state;
