/// Answer submission and statistics broadcast.
pub mod answer_service;
/// Audience question relay, upvotes and the answered marker.
pub mod audience_service;
/// Bearer token validation.
pub mod auth;
/// Outbound event names and fan-out helpers.
pub mod broadcast;
/// Chat relay and history.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Group notification channel sockets.
pub mod notification_service;
/// Role and membership checks.
pub mod permission;
/// Room lifecycle: host, join, step, cancel and leave.
pub mod room_service;
/// Storage connection supervisor driving degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
