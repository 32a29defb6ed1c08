use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health endpoint payloads.
pub mod health;
/// Answer, chat and audience question payloads.
pub mod live;
/// Room snapshots and presence payloads.
pub mod room;
/// Field validators shared by inbound payloads.
pub mod validation;
/// Socket frames and the commands they decode to.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
