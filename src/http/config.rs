use std::net::SocketAddr;

/// Port the echo server listens on
pub const DEFAULT_PORT: u16 = 8080;

/// Configuration for the HTTP echo server
///
/// The binary always runs with [`HttpConfig::default`]; the fields exist so
/// tests and embedders can bind somewhere else.
///
/// # Examples
///
/// ```rust
/// use reqecho::http::HttpConfig;
///
/// let config = HttpConfig {
///     bind_addr: "127.0.0.1:0".parse().unwrap(),
///     ..HttpConfig::default()
/// };
/// assert_eq!(config.buffer_size, 8192);
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Network address to bind to
    pub bind_addr: SocketAddr,
    /// Initial capacity of each connection's read buffer
    pub buffer_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            buffer_size: 8192,
        }
    }
}
