use super::codec::{Frame, HttpCodec, HttpProtocolError, ParsedRequest};
use super::config::HttpConfig;
use super::record::EchoRecord;
use crate::Result;
use crate::common::EchoServerTrait;
use bytes::Bytes;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use http::{Response, StatusCode, header};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::{signal, sync::broadcast};
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, error, info, warn};

/// HTTP server that answers every request with a JSON reflection of it
///
/// Any method and any path are accepted. The response is always `200 OK`
/// with `Content-Type: application/json` and the pretty-printed
/// [`EchoRecord`] as body.
///
/// # Examples
///
/// ```no_run
/// use reqecho::http::{HttpConfig, HttpEchoServer};
/// use reqecho::EchoServerTrait;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = HttpEchoServer::new(HttpConfig::default());
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct HttpEchoServer {
    config: HttpConfig,
    shutdown_signal: broadcast::Sender<()>,
}

impl HttpEchoServer {
    pub fn new(config: HttpConfig) -> Self {
        let (shutdown_signal, _) = broadcast::channel(1);
        Self {
            config,
            shutdown_signal,
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Runs the accept loop on an already bound listener
    ///
    /// Returns once Ctrl-C is received or the shutdown signal fires.
    /// Connections already accepted keep running until their client leaves.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(address = %listener.local_addr()?, "HTTP echo server listening");

        let mut shutdown_rx = self.shutdown_signal.subscribe();
        let buffer_size = self.config.buffer_size;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!(%addr, "Accepted connection");
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, buffer_size).instrument(span).await {
                                    error!(%addr, error = %e, "Error handling connection");
                                }
                                debug!(%addr, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP echo server stopped");
        Ok(())
    }
}

impl EchoServerTrait for HttpEchoServer {
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_signal.clone()
    }
}

/// Serves requests on one connection until it closes or stops being kept alive
async fn handle_connection(stream: TcpStream, addr: SocketAddr, buffer_size: usize) -> Result<()> {
    let mut framed = Framed::with_capacity(stream, HttpCodec::new(), buffer_size);

    while let Some(frame) = framed.next().await {
        let request = match frame {
            Ok(Frame::Continue) => {
                framed.send(continue_response()?).await?;
                continue;
            }
            Ok(Frame::Request(request)) => request,
            Err(e) if e.is_malformed() => {
                warn!(%addr, error = %e, "Rejecting malformed request");
                framed.send(bad_request_response()?).await?;
                return Ok(());
            }
            Err(HttpProtocolError::IncompleteRequest) => {
                debug!(%addr, "Client went away mid-request");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let keep_alive = request.keep_alive();
        let record = EchoRecord::capture(&request);
        info!(%addr, record = %serde_json::to_string(&record)?, "--- request ---");

        let document = record.to_pretty_json()?;
        framed.send(echo_response(&request, document, keep_alive)?).await?;

        if !keep_alive {
            break;
        }
    }

    Ok(())
}

fn echo_response(request: &ParsedRequest, document: String, keep_alive: bool) -> Result<Response<Bytes>> {
    let content_length = document.len();
    let body = if request.is_head() {
        Bytes::new()
    } else {
        Bytes::from(document)
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::DATE, http_date())
        .header(header::CONNECTION, if keep_alive { "keep-alive" } else { "close" })
        .body(body)?)
}

fn continue_response() -> Result<Response<Bytes>> {
    Ok(Response::builder()
        .status(StatusCode::CONTINUE)
        .body(Bytes::new())?)
}

fn bad_request_response() -> Result<Response<Bytes>> {
    Ok(Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header(header::CONTENT_LENGTH, 0)
        .header(header::DATE, http_date())
        .header(header::CONNECTION, "close")
        .body(Bytes::new())?)
}

/// Current time in IMF-fixdate form
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
