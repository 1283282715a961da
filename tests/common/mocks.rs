use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use xml_resolve::Locate;
use xml_resolve::error::Result;

/// Source locator stub that counts every lookup and answers from a fixed table
#[derive(Default)]
pub struct CountingLocator {
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
    answers: HashMap<String, Url>,
}

impl CountingLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, identifier: &str, url: Url) -> Self {
        self.answers.insert(identifier.to_string(), url);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Locate for CountingLocator {
    async fn locate(&self, identifier: &str, _base: Option<&Url>) -> Result<Option<Url>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(identifier.to_string());
        Ok(self.answers.get(identifier).cloned())
    }
}

#[derive(Clone, Debug)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn ok(content_type: &str, body: &str) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }
}

/// Minimal HTTP/1.1 server on a random local port. Unknown paths answer 404.
pub struct StubHttpServer {
    port: u16,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl StubHttpServer {
    pub async fn start(routes: Vec<(&str, StubResponse)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let routes: Arc<HashMap<String, StubResponse>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, response)| (path.to_string(), response))
                .collect(),
        );
        let hits = Arc::new(Mutex::new(HashMap::new()));

        let server_hits = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&server_hits);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    loop {
                        let Ok(n) = stream.read(&mut buf).await else {
                            return;
                        };
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&buf[..n]);
                        if request.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let request = String::from_utf8_lossy(&request);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                    let response = routes.get(&path).cloned().unwrap_or(StubResponse {
                        status: 404,
                        content_type: "text/plain".to_string(),
                        body: b"not found".to_vec(),
                    });
                    let reason = if response.status == 200 { "OK" } else { "Not Found" };
                    let head = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        response.status,
                        reason,
                        response.content_type,
                        response.body.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&response.body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { port, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}
