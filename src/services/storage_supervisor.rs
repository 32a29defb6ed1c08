use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{live_store::Collaborators, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep the persistence collaborators connected, switching the shared state in and out of
/// degraded mode as the backend comes and goes.
///
/// Live rooms are untouched by storage outages; only collaborator-backed events fail.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Collaborators, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(collaborators) => {
                state.install_collaborators(collaborators.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    if collaborators.store.health_check().await.is_ok() {
                        if state.is_degraded() {
                            info!("storage healthy again; leaving degraded mode");
                            state.install_collaborators(collaborators.clone()).await;
                        }
                        sleep(HEALTH_POLL_INTERVAL).await;
                        continue;
                    }

                    if reconnect(&state, &collaborators).await {
                        state.install_collaborators(collaborators.clone()).await;
                        sleep(HEALTH_POLL_INTERVAL).await;
                    } else {
                        warn!("exhausted storage reconnect attempts; staying in degraded mode");
                        break;
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Retry the existing connection with exponential backoff. Enters degraded mode after the
/// first failed attempt.
async fn reconnect(state: &SharedState, collaborators: &Collaborators) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match collaborators.store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.clear_collaborators().await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}
