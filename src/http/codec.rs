//! HTTP/1.1 framing for the echo server
//!
//! [`HttpCodec`] turns raw connection bytes into [`Frame`]s and encodes
//! `http::Response<Bytes>` values back onto the wire. Request heads are
//! parsed with `httparse`; bodies are framed by `Content-Length` or by
//! `Transfer-Encoding: chunked` and buffered in full.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Response;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum number of headers accepted in a single request head
pub const MAX_HEADERS: usize = 2000;

/// Header slots tried first; doubled on `TooManyHeaders` up to [`MAX_HEADERS`]
const INITIAL_HEADERS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HttpProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Incomplete request")]
    IncompleteRequest,
    #[error("Connection closed before a complete response was received")]
    ConnectionClosed,
}

impl HttpProtocolError {
    /// Whether the peer sent something that deserves a `400 Bad Request`
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            HttpProtocolError::HttpParse(_) | HttpProtocolError::InvalidRequest(_)
        )
    }
}

/// A fully received request: head plus de-framed body
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// Method exactly as it appeared on the request line
    pub method: String,
    /// Raw request target (path and query), unvalidated
    pub target: String,
    /// HTTP/1.x minor version
    pub version: u8,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ParsedRequest {
    /// Whether the connection stays open after this request is answered
    pub fn keep_alive(&self) -> bool {
        let mut close = false;
        let mut keep_alive = false;
        for value in self.headers.get_all(header::CONNECTION) {
            let Ok(value) = value.to_str() else { continue };
            for token in value.split(',').map(str::trim) {
                if token.eq_ignore_ascii_case("close") {
                    close = true;
                } else if token.eq_ignore_ascii_case("keep-alive") {
                    keep_alive = true;
                }
            }
        }

        if close {
            false
        } else if self.version == 0 {
            keep_alive
        } else {
            true
        }
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }
}

/// One unit produced by the decoder
#[derive(Debug)]
pub enum Frame {
    /// The client sent `Expect: 100-continue` and waits before sending its body
    Continue,
    /// A complete request
    Request(ParsedRequest),
}

#[derive(Debug)]
struct RequestHead {
    method: String,
    target: String,
    version: u8,
    headers: HeaderMap,
}

impl RequestHead {
    fn into_request(self, body: Bytes) -> ParsedRequest {
        ParsedRequest {
            method: self.method,
            target: self.target,
            version: self.version,
            headers: self.headers,
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Size,
    Data(usize),
    DataEnd,
    Trailers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Length(usize),
    Chunked(Chunk),
}

impl BodyFraming {
    fn expects_body(self) -> bool {
        !matches!(self, BodyFraming::Length(0))
    }
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Head,
    Body {
        head: RequestHead,
        framing: BodyFraming,
        body: BytesMut,
    },
}

/// HTTP/1.1 request decoder and response encoder
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use reqecho::http::{Frame, HttpCodec};
/// use tokio_util::codec::Decoder;
///
/// let mut codec = HttpCodec::new();
/// let mut buf = BytesMut::from(&b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n"[..]);
///
/// match codec.decode(&mut buf).unwrap() {
///     Some(Frame::Request(request)) => assert_eq!(request.target, "/ping"),
///     other => panic!("unexpected frame: {other:?}"),
/// }
/// ```
#[derive(Debug, Default)]
pub struct HttpCodec {
    state: DecodeState,
}

impl HttpCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no request is partially decoded
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Head)
    }
}

impl Decoder for HttpCodec {
    type Item = Frame;
    type Error = HttpProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, HttpProtocolError> {
        loop {
            match std::mem::take(&mut self.state) {
                DecodeState::Head => {
                    let Some(head) = parse_head(src)? else {
                        return Ok(None);
                    };
                    let framing = body_framing(&head.headers)?;
                    let expects_continue = head.version == 1
                        && framing.expects_body()
                        && expects_continue(&head.headers);

                    self.state = DecodeState::Body {
                        head,
                        framing,
                        body: BytesMut::new(),
                    };
                    if expects_continue {
                        return Ok(Some(Frame::Continue));
                    }
                }
                DecodeState::Body {
                    head,
                    mut framing,
                    mut body,
                } => {
                    if decode_body(&mut framing, &mut body, src)? {
                        return Ok(Some(Frame::Request(head.into_request(body.freeze()))));
                    }
                    self.state = DecodeState::Body { head, framing, body };
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, HttpProtocolError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && self.is_idle() => Ok(None),
            None => Err(HttpProtocolError::IncompleteRequest),
        }
    }
}

impl Encoder<Response<Bytes>> for HttpCodec {
    type Error = HttpProtocolError;

    fn encode(&mut self, response: Response<Bytes>, dst: &mut BytesMut) -> Result<(), HttpProtocolError> {
        let (parts, body) = response.into_parts();
        let reason = parts.status.canonical_reason().unwrap_or("Unknown");

        dst.reserve(64 + parts.headers.len() * 32 + body.len());
        dst.put_slice(b"HTTP/1.1 ");
        dst.put_slice(parts.status.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(reason.as_bytes());
        dst.put_slice(b"\r\n");
        for (name, value) in parts.headers.iter() {
            dst.put_slice(name.as_str().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(&body);
        Ok(())
    }
}

fn parse_head(src: &mut BytesMut) -> Result<Option<RequestHead>, HttpProtocolError> {
    let mut slots = INITIAL_HEADERS;
    loop {
        let mut headers = vec![httparse::EMPTY_HEADER; slots];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_len = match req.parse(&src[..]) {
            Ok(httparse::Status::Complete(parsed_len)) => parsed_len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(httparse::Error::TooManyHeaders) if slots < MAX_HEADERS => {
                slots = (slots * 2).min(MAX_HEADERS);
                continue;
            }
            Err(e) => {
                return Err(HttpProtocolError::HttpParse(format!(
                    "Failed to parse headers: {e}"
                )));
            }
        };

        let (Some(method), Some(target), Some(version)) = (req.method, req.path, req.version)
        else {
            return Err(HttpProtocolError::HttpParse("Incomplete request line".to_string()));
        };

        let mut header_map = HeaderMap::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(|e| {
                HttpProtocolError::InvalidRequest(format!("Invalid header name {:?}: {e}", h.name))
            })?;
            let value = HeaderValue::from_bytes(h.value).map_err(|e| {
                HttpProtocolError::InvalidRequest(format!("Invalid value for header {name}: {e}"))
            })?;
            header_map.append(name, value);
        }

        let head = RequestHead {
            method: method.to_string(),
            target: target.to_string(),
            version,
            headers: header_map,
        };
        src.advance(parsed_len);
        return Ok(Some(head));
    }
}

fn body_framing(headers: &HeaderMap) -> Result<BodyFraming, HttpProtocolError> {
    if let Some(coding) = headers.get_all(header::TRANSFER_ENCODING).iter().last() {
        let coding = coding.to_str().map_err(|_| {
            HttpProtocolError::InvalidRequest("Transfer-Encoding is not valid text".to_string())
        })?;
        let last = coding.rsplit(',').next().map(str::trim).unwrap_or_default();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyFraming::Chunked(Chunk::Size));
        }
        return Err(HttpProtocolError::InvalidRequest(format!(
            "Unsupported transfer coding: {coding}"
        )));
    }

    let mut length: Option<usize> = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let value = value.to_str().map_err(|_| {
            HttpProtocolError::InvalidRequest("Content-Length is not valid text".to_string())
        })?;
        for part in value.split(',').map(str::trim) {
            let parsed = part
                .parse::<usize>()
                .ok()
                .filter(|_| part.bytes().all(|b| b.is_ascii_digit()))
                .ok_or_else(|| {
                    HttpProtocolError::InvalidRequest(format!("Invalid Content-Length: {part:?}"))
                })?;
            if length.is_some_and(|existing| existing != parsed) {
                return Err(HttpProtocolError::InvalidRequest(
                    "Conflicting Content-Length values".to_string(),
                ));
            }
            length = Some(parsed);
        }
    }

    Ok(BodyFraming::Length(length.unwrap_or(0)))
}

fn expects_continue(headers: &HeaderMap) -> bool {
    headers
        .get(header::EXPECT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
}

/// Moves up to `wanted` bytes from `src` into `body`, returning how many are still owed
fn take_into(body: &mut BytesMut, src: &mut BytesMut, wanted: usize) -> usize {
    let n = wanted.min(src.len());
    body.extend_from_slice(&src[..n]);
    src.advance(n);
    wanted - n
}

/// Advances body decoding; returns true once the body is complete
fn decode_body(
    framing: &mut BodyFraming,
    body: &mut BytesMut,
    src: &mut BytesMut,
) -> Result<bool, HttpProtocolError> {
    loop {
        match *framing {
            BodyFraming::Length(remaining) => {
                let remaining = take_into(body, src, remaining);
                *framing = BodyFraming::Length(remaining);
                return Ok(remaining == 0);
            }
            BodyFraming::Chunked(Chunk::Size) => match httparse::parse_chunk_size(&src[..]) {
                Ok(httparse::Status::Complete((consumed, size))) => {
                    src.advance(consumed);
                    let size = usize::try_from(size).map_err(|_| {
                        HttpProtocolError::HttpParse(format!("Chunk size {size} is too large"))
                    })?;
                    *framing = if size == 0 {
                        BodyFraming::Chunked(Chunk::Trailers)
                    } else {
                        BodyFraming::Chunked(Chunk::Data(size))
                    };
                }
                Ok(httparse::Status::Partial) => return Ok(false),
                Err(_) => {
                    return Err(HttpProtocolError::HttpParse("Invalid chunk size line".to_string()));
                }
            },
            BodyFraming::Chunked(Chunk::Data(remaining)) => {
                let remaining = take_into(body, src, remaining);
                if remaining > 0 {
                    *framing = BodyFraming::Chunked(Chunk::Data(remaining));
                    return Ok(false);
                }
                *framing = BodyFraming::Chunked(Chunk::DataEnd);
            }
            BodyFraming::Chunked(Chunk::DataEnd) => {
                if src.len() < 2 {
                    return Ok(false);
                }
                if &src[..2] != b"\r\n" {
                    return Err(HttpProtocolError::HttpParse(
                        "Missing CRLF after chunk data".to_string(),
                    ));
                }
                src.advance(2);
                *framing = BodyFraming::Chunked(Chunk::Size);
            }
            // Trailer fields are read and discarded up to the terminating empty line.
            BodyFraming::Chunked(Chunk::Trailers) => {
                match src.windows(2).position(|window| window == b"\r\n") {
                    Some(0) => {
                        src.advance(2);
                        return Ok(true);
                    }
                    Some(line_end) => src.advance(line_end + 2),
                    None => return Ok(false),
                }
            }
        }
    }
}
