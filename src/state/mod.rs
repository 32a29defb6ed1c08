/// Group to room bindings.
pub mod binding;
mod notifications;
/// Participant presence transitions.
pub mod presence;
/// Live room registry.
pub mod registry;
/// Room and participant records.
pub mod room;

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::live_store::{Collaborators, GroupDirectory, LiveStore},
    error::ServiceError,
    services::auth::{JwtTokenValidator, TokenValidator},
};

pub use self::notifications::NotificationHub;
pub use self::registry::SessionRegistry;

/// Shared handle to [`AppState`].
pub type SharedState = Arc<AppState>;

#[derive(Debug, Clone)]
/// Handle used to push frames to one connected socket.
pub struct ConnectionHandle {
    /// Identity of the socket, fresh per connection.
    pub id: Uuid,
    /// Outbound queue drained by the writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Wrap `tx` under a new connection id.
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }
}

/// What a connection knows about itself once it hosted or joined a room.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Room the session belongs to.
    pub room_id: String,
    /// Username acquired by host or join.
    pub username: String,
    /// Acquired through `host`.
    pub is_host: bool,
    /// Socket that owns the session.
    pub connection: ConnectionHandle,
}

impl SessionContext {
    /// Session of `username` in `room_id`, bound to `connection`.
    pub fn new(room_id: &str, username: &str, is_host: bool, connection: ConnectionHandle) -> Self {
        Self {
            room_id: room_id.to_string(),
            username: username.to_string(),
            is_host,
            connection,
        }
    }
}

/// Central application state: live rooms, notification channels and collaborator handles.
pub struct AppState {
    config: AppConfig,
    registry: SessionRegistry,
    notifications: NotificationHub,
    tokens: Arc<dyn TokenValidator>,
    collaborators: RwLock<Option<Collaborators>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until collaborators are installed.
    pub fn new(config: AppConfig) -> SharedState {
        let tokens = Arc::new(JwtTokenValidator::from_config(&config));
        Self::with_token_validator(config, tokens)
    }

    /// Same as [`AppState::new`] with a custom token validator.
    pub fn with_token_validator(
        config: AppConfig,
        tokens: Arc<dyn TokenValidator>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            notifications: NotificationHub::new(config.notification_capacity()),
            config,
            registry: SessionRegistry::new(),
            tokens,
            collaborators: RwLock::new(None),
            degraded: degraded_tx,
        })
    }

    /// Configuration the state was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Live rooms, their participants and group bindings.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Group notification channels.
    pub fn notifications(&self) -> &NotificationHub {
        &self.notifications
    }

    /// Validator for access tokens.
    pub fn tokens(&self) -> &dyn TokenValidator {
        self.tokens.as_ref()
    }

    /// Obtain the installed collaborators, if any.
    pub async fn collaborators(&self) -> Option<Collaborators> {
        self.collaborators.read().await.clone()
    }

    /// Persistence collaborator, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn LiveStore>, ServiceError> {
        self.collaborators()
            .await
            .map(|collaborators| collaborators.store)
            .ok_or(ServiceError::Degraded)
    }

    /// Group directory, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_groups(&self) -> Result<Arc<dyn GroupDirectory>, ServiceError> {
        self.collaborators()
            .await
            .map(|collaborators| collaborators.groups)
            .ok_or(ServiceError::Degraded)
    }

    /// Install collaborators and leave degraded mode.
    pub async fn install_collaborators(&self, collaborators: Collaborators) {
        *self.collaborators.write().await = Some(collaborators);
        self.update_degraded(false);
    }

    /// Remove the collaborators and enter degraded mode.
    pub async fn clear_collaborators(&self) {
        self.collaborators.write().await.take();
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::live_store::memory::{InMemoryGroupDirectory, InMemoryLiveStore};

    #[tokio::test]
    async fn degraded_until_collaborators_installed() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_collaborators(Collaborators::new(
                Arc::new(InMemoryLiveStore::new()),
                Arc::new(InMemoryGroupDirectory::new()),
            ))
            .await;

        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_groups().await.is_ok());

        state.clear_collaborators().await;
        assert!(state.is_degraded());
    }
}
