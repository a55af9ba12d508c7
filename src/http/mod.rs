//! HTTP request-echo server
//!
//! Every request, whatever its method or path, is answered with a JSON
//! document describing the request: method, raw target, headers, body and
//! the time it was received.

pub mod client;
pub mod codec;
pub mod config;
pub mod record;
pub mod server;

#[cfg(test)]
mod tests;

pub use client::{EchoResponse, HttpEchoClient};
pub use codec::{Frame, HttpCodec, HttpProtocolError, ParsedRequest};
pub use config::{DEFAULT_PORT, HttpConfig};
pub use record::{EchoRecord, HeaderField};
pub use server::HttpEchoServer;
