use crate::{EchoError, Result};

/// Common trait for echo servers
///
/// This trait defines the interface an echo server exposes to the binary
/// and to tests.
pub trait EchoServerTrait {
    /// Binds the configured address and serves until shut down
    async fn run(&self) -> Result<()>;

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}

/// Common trait for echo clients
pub trait EchoClient {
    /// Sends data to the echo server and returns the echoed payload
    async fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>>;

    /// Sends a string and returns the echoed string
    async fn echo_string(&mut self, data: &str) -> Result<String> {
        let response = self.echo(data.as_bytes()).await?;
        String::from_utf8(response).map_err(EchoError::Utf8)
    }
}
