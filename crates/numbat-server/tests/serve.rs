//! Serving a router over a real TCP socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use numbat_core::handler_fn;
use numbat_server::{Router, Server, ServerConfig, ShutdownSignal};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn start(
    router: Router,
    config: ServerConfig,
) -> (SocketAddr, ShutdownSignal, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = Server::new(config, Arc::new(router));
    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        server.serve(listener, signal).await.unwrap();
    });
    (addr, shutdown, task)
}

async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

fn echo_router() -> Router {
    let router = Router::new();
    router.post(
        "/echo",
        handler_fn(|ctx| {
            Box::pin(async move {
                let body = ctx.body().clone();
                ctx.bytes(StatusCode::OK, &body, Some("text/plain"));
            })
        }),
    );
    router.get(
        "/peer",
        handler_fn(|ctx| {
            Box::pin(async move {
                let ip = ctx
                    .remote_addr()
                    .map(|a| a.ip().to_string())
                    .unwrap_or_default();
                ctx.text(StatusCode::OK, ip);
            })
        }),
    );
    router
}

#[tokio::test]
async fn test_serves_requests_and_shuts_down() {
    let (addr, shutdown, task) = start(echo_router(), ServerConfig::default()).await;

    let response = raw_request(
        addr,
        "POST /echo HTTP/1.1\r\nhost: localhost\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("hello"), "{response}");

    let response = raw_request(
        addr,
        "GET /peer HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
    )
    .await;
    assert!(response.ends_with("127.0.0.1"), "{response}");

    let response = raw_request(
        addr,
        "GET /missing HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found"), "{response}");
    assert!(response.ends_with(r#"{"error":"not found"}"#), "{response}");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("server should stop")
        .unwrap();
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let config = ServerConfig::builder().max_body_size(8).build();
    let (addr, shutdown, task) = start(echo_router(), config).await;

    let response = raw_request(
        addr,
        "POST /echo HTTP/1.1\r\nhost: localhost\r\ncontent-length: 16\r\nconnection: close\r\n\r\n0123456789abcdef",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 413 "), "{response}");
    assert!(response.contains("request body too large"), "{response}");

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_head_request_over_the_wire() {
    let router = Router::new();
    router.get(
        "/doc",
        handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "document") })),
    );
    let (addr, shutdown, task) = start(router, ServerConfig::default()).await;

    let response = raw_request(
        addr,
        "HEAD /doc HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("\r\n\r\n"), "{response}");

    shutdown.trigger();
    task.await.unwrap();
}
