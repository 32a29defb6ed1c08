use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::{MongoDaoError, MongoResult};

const PING_ATTEMPTS: u32 = 5;
const FIRST_PING_DELAY: Duration = Duration::from_millis(250);
const MAX_PING_DELAY: Duration = Duration::from_secs(5);

/// Open a client on `database_name` and wait for the server to answer a ping.
///
/// Gives up after [`PING_ATTEMPTS`] pings; the storage supervisor retries from scratch later.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut delay = FIRST_PING_DELAY;
    let mut attempt = 1;
    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => {
                debug!(database = database_name, attempt, "mongodb ping answered");
                return Ok((client, database));
            }
            Err(source) if attempt >= PING_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                warn!(database = database_name, attempt, error = %err, "mongodb ping failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_PING_DELAY);
                attempt += 1;
            }
        }
    }
}
