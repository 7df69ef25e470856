//! Query server tests over real TCP connections.
//!
//! Binds to an ephemeral port, sends raw HTTP requests and checks the
//! plain-text responses.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use logtally_core::config::{ServerConfig, StartPosition};
use logtally_daemon::query_server::QueryServer;
use logtally_monitor::{FileMonitor, MonitorRegistry, Rule, Scheduler};

struct TestServer {
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    registry: Arc<MonitorRegistry>,
}

impl TestServer {
    async fn stop(self) {
        self.cancel.cancel();
        self.task.await.expect("server task should not panic");
        self.registry.shutdown().await;
    }
}

async fn start_server(request_timeout_secs: u64) -> TestServer {
    let scheduler = Scheduler::new(Duration::from_secs(3600)).expect("valid interval");
    let registry = Arc::new(MonitorRegistry::new(scheduler, 1024));

    let monitor = FileMonitor::new("app", "/nonexistent/app.log", 1024, StartPosition::End)
        .expect("valid monitor");
    monitor
        .push_rule(
            Rule::new(
                r"error: (.*)$",
                vec!["errors".to_owned()],
                vec!["errors".to_owned()],
                false,
            )
            .expect("valid rule"),
        )
        .await;
    monitor
        .push_rule(
            Rule::new(
                "disk",
                vec!["disk errors".to_owned()],
                vec!["disk errors".to_owned()],
                false,
            )
            .expect("valid rule"),
        )
        .await;
    monitor.line_read("error: disk full").await;
    monitor.line_read("error: fan failure").await;
    registry.add(monitor).await;

    let config = ServerConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_owned(),
        port: 0,
        max_connections: 8,
        request_timeout_secs,
    };
    let server = QueryServer::bind(&config, Arc::clone(&registry))
        .await
        .expect("should bind ephemeral port");
    let addr = server.local_addr().expect("local addr");

    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            server.run(cancel).await.expect("server should run");
        })
    };

    TestServer {
        addr,
        cancel,
        task,
        registry,
    }
}

async fn send(addr: std::net::SocketAddr, request: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("should connect");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("should send request");

    let mut raw = String::new();
    stream
        .read_to_string(&mut raw)
        .await
        .expect("should read response");

    let (head, body) = raw.split_once("\r\n\r\n").expect("response has a head");
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    (status, body.to_owned())
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n")
}

#[tokio::test]
async fn test_lists_monitors() {
    let server = start_server(5).await;

    let (status, body) = send(server.addr, &get("/monitors")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "app:/nonexistent/app.log\n");

    server.stop().await;
}

#[tokio::test]
async fn test_counter_and_store_queries() {
    let server = start_server(5).await;

    let (status, body) = send(server.addr, &get("/monitors/app/counters/errors")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "2\n");

    let (status, body) = send(server.addr, &get("/monitors/app/stores/errors")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "disk full\nfan failure\n");

    let (status, body) = send(server.addr, &get("/monitors/app")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "stores\ncounters\n");

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_names_are_not_found() {
    let server = start_server(5).await;

    let (status, _) = send(server.addr, &get("/monitors/nope")).await;
    assert_eq!(status, 404);

    let (status, _) = send(server.addr, &get("/monitors/app/counters/nope")).await;
    assert_eq!(status, 404);

    let (status, _) = send(server.addr, &get("/elsewhere")).await;
    assert_eq!(status, 404);

    server.stop().await;
}

#[tokio::test]
async fn test_rejects_non_get_methods() {
    let server = start_server(5).await;

    let (status, _) = send(server.addr, "POST /monitors HTTP/1.1\r\n\r\n").await;
    assert_eq!(status, 405);

    server.stop().await;
}

#[tokio::test]
async fn test_names_with_spaces_are_served() {
    let server = start_server(5).await;

    let (status, body) = send(server.addr, &get("/monitors/app/counters")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "disk errors\nerrors\n");

    let (status, body) = send(server.addr, &get("/monitors/app/counters/disk%20errors")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "1\n");

    let (status, body) = send(server.addr, &get("/monitors/app/stores/disk%20errors")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "error: disk full\n");

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_utf8_segment_is_bad_request() {
    let server = start_server(5).await;

    let (status, body) = send(server.addr, &get("/monitors/app/stores/%C3%28")).await;
    assert_eq!(status, 400);
    assert!(body.ends_with('\n'));

    server.stop().await;
}

#[tokio::test]
async fn test_incomplete_request_is_dropped_after_timeout() {
    let server = start_server(1).await;

    let mut stream = TcpStream::connect(server.addr).await.expect("should connect");
    stream
        .write_all(b"GET /monitors HTTP/1.1\r\n")
        .await
        .expect("should send partial head");

    let mut raw = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw)).await;
    assert!(read.is_ok(), "connection should be closed by the server");
    assert!(!raw.starts_with(b"HTTP/1.1 200"));

    server.stop().await;
}

#[tokio::test]
async fn test_server_stops_on_cancel() {
    let server = start_server(5).await;
    let addr = server.addr;
    server.stop().await;

    assert!(TcpStream::connect(addr).await.is_err());
}
