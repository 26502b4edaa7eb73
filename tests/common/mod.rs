//! Shared utilities for integration tests: a raw-TCP mock origin and a
//! relay started on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use s3_relay::config::{RelayConfig, RouteConfig};
use s3_relay::http::AppState;
use s3_relay::{RelayServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A programmable origin. Each connection gets its request head read, then
/// whatever bytes `respond` returns, then EOF.
pub struct MockOrigin {
    pub addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let (a, r) = (accepts.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                a.fetch_add(1, Ordering::SeqCst);
                let (respond, requests) = (respond.clone(), r.clone());
                tokio::spawn(async move {
                    let head = read_head(&mut socket).await;
                    let response = respond(&head);
                    requests.lock().unwrap().push(head);
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, accepts, requests }
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Build a raw HTTP/1.1 response.
pub fn response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status_line}\r\n").into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn relay_config(origin: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.origin.host = origin.ip().to_string();
    config.origin.port = origin.port();
    config.origin.access_key_id = "AKIDEXAMPLE".to_string();
    config.origin.secret_access_key = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY".to_string();
    config.routes.push(RouteConfig {
        name: "objects".to_string(),
        mount: "/bucket/objects".to_string(),
        bucket: "reports".to_string(),
    });
    config.lifecycle.shutdown_grace_secs = 2;
    config
}

pub struct TestRelay {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
}

impl TestRelay {
    pub async fn start(config: RelayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::new(config);
        let state = server.state();
        let shutdown = Shutdown::new();
        let (_updates_tx, updates) = mpsc::unbounded_channel();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _updates_tx = _updates_tx;
            server.run(listener, updates, rx).await.unwrap();
        });
        Self { addr, state, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Send `request` verbatim and read until the relay closes.
    pub async fn raw(&self, request: &[u8]) -> RawResponse {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut bytes = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut bytes))
            .await
            .expect("relay did not close the connection")
            .unwrap();
        RawResponse::parse(bytes)
    }

    pub async fn get(&self, path: &str) -> RawResponse {
        self.raw(format!("GET {path} HTTP/1.1\r\nhost: relay\r\n\r\n").as_bytes()).await
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[derive(Debug)]
pub struct RawResponse {
    pub head: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn parse(bytes: Vec<u8>) -> Self {
        match bytes.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(idx) => Self {
                head: String::from_utf8_lossy(&bytes[..idx]).into_owned(),
                body: bytes[idx + 4..].to_vec(),
            },
            None => Self {
                head: String::from_utf8_lossy(&bytes).into_owned(),
                body: Vec::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.body.is_empty()
    }

    pub fn status_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode a chunked body.
    pub fn dechunked(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut rest = &self.body[..];
        loop {
            let line_end = rest.windows(2).position(|w| w == b"\r\n").unwrap();
            let size = usize::from_str_radix(std::str::from_utf8(&rest[..line_end]).unwrap().trim(), 16).unwrap();
            rest = &rest[line_end + 2..];
            if size == 0 {
                return out;
            }
            out.extend_from_slice(&rest[..size]);
            rest = &rest[size + 2..];
        }
    }
}
