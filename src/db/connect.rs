use super::{DbConfig, StartupError};
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::{error, info};

/// Something that can answer a minimal round-trip without side effects
#[async_trait]
pub trait Liveness {
    async fn ping(&self) -> Result<(), String>;
}

#[async_trait]
impl Liveness for Client {
    async fn ping(&self) -> Result<(), String> {
        self.database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Runs one liveness check, turning a failure into a startup error
pub async fn verify_liveness<L>(target: &L) -> Result<(), StartupError>
where
    L: Liveness + Sync + ?Sized,
{
    target.ping().await.map_err(StartupError::Unreachable)
}

/// A verified client together with the configured database
pub struct Connection {
    client: Client,
    database: Database,
}

impl Connection {
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Closes the client and waits for its background tasks to finish
    pub async fn close(self) {
        self.client.shutdown().await;
    }
}

/// Connects to the cluster and returns a handle only after a successful ping
pub async fn connect(config: &DbConfig) -> Result<Connection, StartupError> {
    info!(cluster = %config.cluster_address, database = %config.db_name, "Trying to connect to db");

    let mut options = ClientOptions::parse(config.connection_uri())
        .await
        .map_err(StartupError::InvalidOptions)?;
    options.server_selection_timeout = Some(config.server_selection_timeout);
    let client = Client::with_options(options).map_err(StartupError::InvalidOptions)?;

    if let Err(e) = verify_liveness(&client).await {
        error!(error = %e, "Connection failed");
        client.shutdown().await;
        return Err(e);
    }

    info!("Connected successfully to server");
    let database = client.database(&config.db_name);
    Ok(Connection { client, database })
}

/// Connects, pings once and closes the client again
pub async fn probe(config: &DbConfig) -> Result<(), StartupError> {
    let connection = connect(config).await?;
    connection.close().await;
    info!("Liveness check passed, connection closed");
    Ok(())
}
