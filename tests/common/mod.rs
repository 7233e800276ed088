//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use routekit::config::{ServerConfig, StaticFilesConfig};
use routekit::http::Context;
use routekit::routing::{Dispatcher, StaticFileMatcher};
use routekit::{HttpServer, Shutdown, StaticIndex};

/// A server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

/// Serve `dispatcher` on `127.0.0.1:0`.
pub async fn start_server<C: Context>(dispatcher: Dispatcher<C>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let stopped = shutdown.subscribe();

    let server = HttpServer::new(ServerConfig::default(), dispatcher);
    let handle = tokio::spawn(async move {
        let _ = server.run(listener, stopped).await;
    });

    TestServer { addr, shutdown, handle }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Send a raw HTTP/1.1 request line so the target reaches the server unnormalized.
pub async fn raw_get(addr: SocketAddr, target: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// A small site:
/// `index.html`, `hello.txt`, `app.js` (+ `.br`, `.gz`), `docs/index.html`,
/// `docs/guide.md`, `.env`, `.well-known/security.txt`.
pub fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "index.html", "<h1>home</h1>");
    write(root, "hello.txt", "hello world");
    write(root, "app.js", "console.log('plain')");
    write(root, "app.js.br", "BROTLI");
    write(root, "app.js.gz", "GZIP");
    write(root, "docs/index.html", "<h1>docs</h1>");
    write(root, "docs/guide.md", "# Guide");
    write(root, ".env", "SECRET=1");
    write(root, ".well-known/security.txt", "Contact: ops@example.test");
    dir
}

pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn static_config(root: &Path) -> StaticFilesConfig {
    StaticFilesConfig {
        enabled: true,
        root_dir: root.to_path_buf(),
        ..StaticFilesConfig::default()
    }
}

/// Build and index once, then register the STATIC matcher on `dispatcher`.
pub async fn with_static(dispatcher: &mut Dispatcher, config: &StaticFilesConfig) -> Arc<StaticIndex> {
    let index = Arc::new(StaticIndex::new(config));
    index.start().await.unwrap();
    dispatcher
        .use_type(StaticFileMatcher::new(index.clone(), &config.serve))
        .unwrap();
    index
}
