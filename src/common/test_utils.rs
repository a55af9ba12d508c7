use crate::Result;
use crate::http::{HttpConfig, HttpEchoServer};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Starts an echo server on an ephemeral loopback port for tests
///
/// The listener is bound before this returns, so clients may connect
/// immediately. Abort the handle to stop the server.
pub async fn spawn_test_server() -> Result<(JoinHandle<Result<()>>, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = HttpEchoServer::new(HttpConfig {
        bind_addr: addr,
        ..HttpConfig::default()
    });
    let server_handle = tokio::spawn(async move { server.serve(listener).await });

    Ok((server_handle, addr))
}
