use super::codec::HttpProtocolError;
use super::record::EchoRecord;
use crate::Result;
use crate::common::EchoClient;
use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Header slots for parsing echo server responses, which carry only a handful
const RESPONSE_HEADERS: usize = 32;

/// A final response read back from an echo server
#[derive(Debug, Clone)]
pub struct EchoResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EchoResponse {
    /// Decodes the body as an [`EchoRecord`]
    pub fn record(&self) -> Result<EchoRecord> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decodes the body as arbitrary JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

/// HTTP/1.1 client for talking to an echo server over one kept-alive connection
///
/// # Examples
///
/// ```no_run
/// use reqecho::http::HttpEchoClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let addr = "127.0.0.1:8080".parse()?;
///     let mut client = HttpEchoClient::connect(addr).await?;
///
///     let response = client.request("GET", "/hello?x=1", &[("X-Test", "abc")], b"").await?;
///     let record = response.record()?;
///     println!("Server saw {} {}", record.method, record.url);
///     Ok(())
/// }
/// ```
pub struct HttpEchoClient {
    stream: TcpStream,
    buffer: BytesMut,
    host: String,
}

impl HttpEchoClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(8192),
            host: addr.to_string(),
        })
    }

    /// Sends a request with `Host` and `Content-Length` filled in
    pub async fn request(
        &mut self,
        method: &str,
        target: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<EchoResponse> {
        let mut head = format!("{method} {target} HTTP/1.1\r\nHost: {}\r\n", self.host);
        for (name, value) in headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        if !body.is_empty() {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        let mut raw = head.into_bytes();
        raw.extend_from_slice(body);
        self.write_request(&raw).await?;
        self.read_response(method != "HEAD").await
    }

    /// Sends pre-encoded request bytes and reads one final response
    pub async fn send_raw(&mut self, request: &[u8]) -> Result<EchoResponse> {
        self.write_request(request).await?;
        self.read_response(!request.starts_with(b"HEAD ")).await
    }

    async fn write_request(&mut self, request: &[u8]) -> Result<()> {
        self.stream.write_all(request).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads until a final (non-1xx) response is complete
    pub async fn read_response(&mut self, expect_body: bool) -> Result<EchoResponse> {
        loop {
            if let Some(response) = self.parse_buffered(expect_body)? {
                return Ok(response);
            }
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(HttpProtocolError::ConnectionClosed.into());
            }
        }
    }

    fn parse_buffered(&mut self, expect_body: bool) -> Result<Option<EchoResponse>> {
        loop {
            let mut headers = [httparse::EMPTY_HEADER; RESPONSE_HEADERS];
            let mut response = httparse::Response::new(&mut headers);

            let head_len = match response.parse(&self.buffer[..]) {
                Ok(httparse::Status::Complete(head_len)) => head_len,
                Ok(httparse::Status::Partial) => return Ok(None),
                Err(e) => {
                    return Err(HttpProtocolError::HttpParse(format!(
                        "Failed to parse response: {e}"
                    ))
                    .into());
                }
            };

            let code = response
                .code
                .ok_or_else(|| HttpProtocolError::HttpParse("Missing status code".to_string()))?;
            let status = StatusCode::from_u16(code)
                .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid status code: {e}")))?;

            let mut header_map = HeaderMap::new();
            for h in response.headers.iter() {
                let name = HeaderName::from_bytes(h.name.as_bytes())
                    .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid header name: {e}")))?;
                let value = HeaderValue::from_bytes(h.value)
                    .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid header value: {e}")))?;
                header_map.append(name, value);
            }

            if status.is_informational() {
                self.buffer.advance(head_len);
                continue;
            }

            let body_len = if expect_body {
                content_length(&header_map)?
            } else {
                0
            };
            if self.buffer.len() < head_len + body_len {
                return Ok(None);
            }

            self.buffer.advance(head_len);
            let body = self.buffer.split_to(body_len).freeze();
            return Ok(Some(EchoResponse {
                status,
                headers: header_map,
                body,
            }));
        }
    }
}

fn content_length(headers: &HeaderMap) -> Result<usize> {
    match headers.get(header::CONTENT_LENGTH) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .ok_or_else(|| HttpProtocolError::HttpParse("Invalid Content-Length".to_string()).into()),
        None => Ok(0),
    }
}

impl EchoClient for HttpEchoClient {
    /// Posts `data` and returns the body the server reflected back
    ///
    /// The server decodes bodies as UTF-8 text, so invalid sequences come
    /// back as U+FFFD.
    async fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .request("POST", "/", &[("Content-Type", "application/octet-stream")], data)
            .await?;
        Ok(response.record()?.body.into_bytes())
    }
}
