use super::{EchoRecord, HeaderField, HttpConfig, HttpEchoServer};
use crate::common::{EchoServerTrait, spawn_test_server};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Reads from the stream until the peer closes it
async fn read_to_close(stream: &mut TcpStream) -> String {
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

fn split_response(response: &str) -> (&str, &str) {
    response.split_once("\r\n\r\n").expect("response has a head")
}

#[tokio::test]
async fn test_http_get_is_echoed() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    let request = "GET /hello?x=1 HTTP/1.1\r\nHost: localhost\r\nX-Test: abc\r\nConnection: close\r\n\r\n";
    client_stream.write_all(request.as_bytes()).await.unwrap();

    let response = read_to_close(&mut client_stream).await;
    let (head, body) = split_response(&response);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("content-type: application/json"));
    assert!(head.contains("connection: close"));

    let record: EchoRecord = serde_json::from_str(body).unwrap();
    assert_eq!(record.method, "GET");
    assert_eq!(record.url, "/hello?x=1");
    assert_eq!(record.header("x-test"), Some(&HeaderField::Single("abc".to_string())));
    assert_eq!(record.body, "");

    server_handle.abort();
}

#[tokio::test]
async fn test_http_post_body_is_echoed_verbatim() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    let request = "POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 7\r\nConnection: close\r\n\r\n{\"a\":1}";
    client_stream.write_all(request.as_bytes()).await.unwrap();

    let response = read_to_close(&mut client_stream).await;
    let (_, body) = split_response(&response);
    let value: serde_json::Value = serde_json::from_str(body).unwrap();

    assert_eq!(value["method"], "POST");
    assert_eq!(value["url"], "/submit");
    assert_eq!(value["body"], r#"{"a":1}"#);
    assert_eq!(value["headers"]["content-length"], "7");

    server_handle.abort();
}

#[tokio::test]
async fn test_http_request_with_many_headers_is_echoed() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut request = String::from("GET /many HTTP/1.1\r\nConnection: close\r\n");
    for i in 0..300 {
        request.push_str(&format!("X-H{i}: v{i}\r\n"));
    }
    request.push_str("\r\n");

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    client_stream.write_all(request.as_bytes()).await.unwrap();

    let response = read_to_close(&mut client_stream).await;
    let (head, body) = split_response(&response);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));

    let record: EchoRecord = serde_json::from_str(body).unwrap();
    assert_eq!(record.url, "/many");
    assert_eq!(record.headers.len(), 301);
    assert_eq!(record.header("x-h299").and_then(HeaderField::as_single), Some("v299"));

    server_handle.abort();
}

#[tokio::test]
async fn test_http_response_length_matches_body() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    client_stream
        .write_all(b"PATCH /len HTTP/1.1\r\nConnection: close\r\nContent-Length: 3\r\n\r\nabc")
        .await
        .unwrap();

    let response = read_to_close(&mut client_stream).await;
    let (head, body) = split_response(&response);
    let declared: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length: "))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(declared, body.len());
    assert!(body.starts_with("{\n  \"method\": \"PATCH\""));

    server_handle.abort();
}

#[tokio::test]
async fn test_http_expect_continue() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    let head = "PUT /upload HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nExpect: 100-continue\r\nConnection: close\r\n\r\n";
    client_stream.write_all(head.as_bytes()).await.unwrap();

    let interim = b"HTTP/1.1 100 Continue\r\n\r\n";
    let mut buffer = vec![0u8; interim.len()];
    client_stream.read_exact(&mut buffer).await.unwrap();
    assert_eq!(&buffer[..], &interim[..]);

    client_stream.write_all(b"hello").await.unwrap();
    let response = read_to_close(&mut client_stream).await;
    let (head, body) = split_response(&response);
    assert!(head.starts_with("HTTP/1.1 200 OK"));

    let record: EchoRecord = serde_json::from_str(body).unwrap();
    assert_eq!(record.body, "hello");
    assert_eq!(record.header("expect").and_then(HeaderField::as_single), Some("100-continue"));

    server_handle.abort();
}

#[tokio::test]
async fn test_http_malformed_request_is_rejected() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    client_stream
        .write_all(b"GET /x HTTP/1.1\r\nBad Header: nope\r\n\r\n")
        .await
        .unwrap();

    let response = read_to_close(&mut client_stream).await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(!response.contains("\"method\""));

    server_handle.abort();
}

#[tokio::test]
async fn test_http_head_has_no_body() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    client_stream
        .write_all(b"HEAD /probe HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let response = read_to_close(&mut client_stream).await;
    let (head, body) = split_response(&response);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("content-length: "));
    assert!(body.is_empty());

    server_handle.abort();
}

#[tokio::test]
async fn test_http_incomplete_request_gets_no_response() {
    let (server_handle, addr) = spawn_test_server().await.unwrap();

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    client_stream
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhe")
        .await
        .unwrap();
    client_stream.shutdown().await.unwrap();

    let response = read_to_close(&mut client_stream).await;
    assert!(response.is_empty());

    server_handle.abort();
}

#[tokio::test]
async fn test_http_server_shutdown_signal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpEchoServer::new(HttpConfig {
        bind_addr: addr,
        ..HttpConfig::default()
    });
    let shutdown = server.shutdown_signal();

    let server_handle = tokio::spawn(async move { server.serve(listener).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    shutdown.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server_handle)
        .await
        .expect("server stops after shutdown signal")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_http_server_run_binds_configured_address() {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let server = HttpEchoServer::new(HttpConfig {
        bind_addr: addr,
        ..HttpConfig::default()
    });
    assert_eq!(server.config().bind_addr, addr);
    let shutdown = server.shutdown_signal();
    let server_handle = tokio::spawn(async move { server.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client_stream = TcpStream::connect(addr).await.unwrap();
    client_stream
        .write_all(b"OPTIONS * HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let response = read_to_close(&mut client_stream).await;
    let (_, body) = split_response(&response);
    let record: EchoRecord = serde_json::from_str(body).unwrap();
    assert_eq!(record.method, "OPTIONS");
    assert_eq!(record.url, "*");

    shutdown.send(()).unwrap();
    server_handle.await.unwrap().unwrap();
}

#[test]
fn test_default_config_listens_on_8080() {
    let config = HttpConfig::default();
    assert_eq!(config.bind_addr.port(), 8080);
    assert!(config.bind_addr.ip().is_unspecified());
}
