//! Static file routes registered on a router.

use std::fs;

use http::StatusCode;
use numbat_middleware::stages::Gzip;
use numbat_server::{Router, StaticFiles};
use numbat_test::TestClient;
use tempfile::TempDir;

fn precompressed() -> Vec<u8> {
    let mut bytes = vec![0x1f, 0x8b];
    bytes.extend_from_slice(&[b'p'; 400]);
    bytes
}

fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::create_dir(dir.path().join("css")).unwrap();
    fs::write(dir.path().join("css/site.css"), "body{margin:0}").unwrap();
    fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
    fs::write(dir.path().join("app.js.gz"), precompressed()).unwrap();
    fs::write(dir.path().join("robots.txt"), "User-agent: *").unwrap();
    dir
}

#[tokio::test]
async fn test_serve_files_under_prefix() {
    let dir = site();
    let router = Router::new();
    router.serve_files("/static/", StaticFiles::new(dir.path()));

    let client = TestClient::new(router);
    client
        .get("/static/css/site.css")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_header("content-type", "text/css; charset=utf-8")
        .assert_body_eq("body{margin:0}");
    client
        .get("/static/")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_body_eq("<h1>home</h1>");
    client
        .get("/static/nope.txt")
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND)
        .assert_json(&serde_json::json!({"error": "not found"}));
}

#[tokio::test]
async fn test_serve_files_refuses_traversal_and_writes() {
    let dir = site();
    let router = Router::new();
    router.serve_files("/static", StaticFiles::new(dir.path().join("css")));

    let client = TestClient::new(router);
    client
        .get("/static/..%2Findex.html")
        .send()
        .await
        .assert_status(StatusCode::FORBIDDEN);
    client
        .post("/static/site.css")
        .send()
        .await
        .assert_status(StatusCode::METHOD_NOT_ALLOWED)
        .assert_header("allow", "GET, HEAD");
}

#[tokio::test]
async fn test_head_and_conditional_requests() {
    let dir = site();
    let router = Router::new();
    router.serve_files("/", StaticFiles::new(dir.path()));

    let client = TestClient::new(router);
    let head = client.head("/robots.txt").send().await;
    head.assert_status(StatusCode::OK)
        .assert_header("content-length", "13");
    assert!(head.body().is_empty());

    let etag = head.header_str("etag").unwrap().to_string();
    client
        .get("/robots.txt")
        .header("if-none-match", &etag)
        .send()
        .await
        .assert_status(StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_range_request() {
    let dir = site();
    let router = Router::new();
    router.serve_files("/", StaticFiles::new(dir.path()));

    TestClient::new(router)
        .get("/robots.txt")
        .header("range", "bytes=0-3")
        .send()
        .await
        .assert_status(StatusCode::PARTIAL_CONTENT)
        .assert_header("content-range", "bytes 0-3/13")
        .assert_body_eq("User");
}

#[tokio::test]
async fn test_precompressed_file_is_not_compressed_twice() {
    let dir = site();
    let router = Router::new();
    router.use_middleware(Gzip::default());
    router.serve_files("/", StaticFiles::new(dir.path()).precompressed_gzip(true));

    let response = TestClient::new(router)
        .get("/app.js")
        .header("accept-encoding", "gzip")
        .send()
        .await;
    response
        .assert_status(StatusCode::OK)
        .assert_header("content-encoding", "gzip");
    assert_eq!(&response.body()[..], &precompressed()[..]);
}

#[tokio::test]
async fn test_single_file_route() {
    let dir = site();
    let router = Router::new();
    router.file("/robots.txt", dir.path().join("robots.txt"));
    router.file("/gone.txt", dir.path().join("gone.txt"));

    let client = TestClient::new(router);
    client
        .get("/robots.txt")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_body_eq("User-agent: *");
    client
        .get("/gone.txt")
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
