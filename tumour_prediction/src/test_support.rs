use crate::model_service::{Classifier, InputTensor, ModelLoader};
use axum::{
    body::Bytes,
    extract::Query,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const STUB_MAGIC: &[u8] = b"STUB-ONNX";

/// A file the stub loader accepts, padded to `len` bytes.
pub fn stub_model_bytes(len: usize) -> Vec<u8> {
    let mut bytes = STUB_MAGIC.to_vec();
    bytes.resize(len.max(STUB_MAGIC.len()), 0x42);
    bytes
}

#[derive(Clone, Default)]
struct RemoteLog {
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl RemoteLog {
    fn record(&self, query: HashMap<String, String>) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query);
    }
}

/// Local HTTP server standing in for the file-sharing host.
pub struct RemoteStub {
    pub url: String,
    log: RemoteLog,
}

impl RemoteStub {
    pub fn hits(&self) -> usize {
        self.log.hits.load(Ordering::SeqCst)
    }

    pub fn last_query(&self, key: &str) -> Option<String> {
        self.log
            .queries
            .lock()
            .unwrap()
            .last()
            .and_then(|query| query.get(key).cloned())
    }
}

async fn spawn_remote(router: Router, log: RemoteLog) -> RemoteStub {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    RemoteStub {
        url: format!("http://{}/uc?export=download", addr),
        log,
    }
}

pub async fn plain_remote(body: Vec<u8>) -> RemoteStub {
    let log = RemoteLog::default();
    let handler_log = log.clone();
    let body = Bytes::from(body);

    let router = Router::new().route(
        "/uc",
        get(move |Query(query): Query<HashMap<String, String>>| {
            handler_log.record(query);
            let body = body.clone();
            async move { body }
        }),
    );

    spawn_remote(router, log).await
}

/// Answers with an HTML warning page and a `download_warning_<token>` cookie
/// until the request carries `confirm=<token>`.
pub async fn interstitial_remote(token: &'static str, body: Vec<u8>) -> RemoteStub {
    let log = RemoteLog::default();
    let handler_log = log.clone();
    let body = Bytes::from(body);

    let router = Router::new().route(
        "/uc",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let confirmed = query.get("confirm").map(String::as_str) == Some(token);
            handler_log.record(query);
            let body = body.clone();
            async move {
                if confirmed {
                    body.into_response()
                } else {
                    (
                        [(
                            header::SET_COOKIE,
                            format!("download_warning_{}={}; Path=/", token, token),
                        )],
                        Html("<html><body>Google Drive can't scan this file for viruses.</body></html>"),
                    )
                        .into_response()
                }
            }
        }),
    );

    spawn_remote(router, log).await
}

pub async fn status_remote(status: StatusCode) -> RemoteStub {
    let log = RemoteLog::default();
    let handler_log = log.clone();

    let router = Router::new().route(
        "/uc",
        get(move |Query(query): Query<HashMap<String, String>>| {
            handler_log.record(query);
            async move { (status, "<html>Service Unavailable</html>") }
        }),
    );

    spawn_remote(router, log).await
}

/// Declares `declared_len` bytes but closes the connection after `body`.
pub async fn truncated_remote(declared_len: usize, body: Vec<u8>) -> RemoteStub {
    let log = RemoteLog::default();
    let handler_log = log.clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4_096];
            let _ = socket.read(&mut request).await;
            handler_log.record(HashMap::new());

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
                declared_len
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
    });

    RemoteStub {
        url: format!("http://{}/uc?export=download", addr),
        log,
    }
}

#[derive(Clone)]
pub struct StubLoader {
    pub loads: Arc<AtomicUsize>,
    scores: Vec<f32>,
}

impl StubLoader {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            scores,
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for StubLoader {
    type Model = StubModel;

    fn load(&self, path: &Path) -> Result<StubModel, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        if !bytes.starts_with(STUB_MAGIC) {
            return Err("file is not an ONNX model".to_string());
        }
        Ok(StubModel::new(self.scores.clone()))
    }
}

pub struct StubModel {
    scores: Result<Vec<f32>, String>,
    pub seen_shapes: Mutex<Vec<Vec<usize>>>,
}

impl StubModel {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores: Ok(scores),
            seen_shapes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            scores: Err(reason.to_string()),
            seen_shapes: Mutex::new(Vec::new()),
        }
    }
}

impl Classifier for StubModel {
    fn classify(&self, input: &InputTensor) -> Result<Vec<f32>, String> {
        self.seen_shapes.lock().unwrap().push(input.shape().to_vec());
        self.scores.clone()
    }
}
