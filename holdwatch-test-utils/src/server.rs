use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Canned response served for one path.
#[derive(Clone, Debug)]
pub struct MockRoute {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: String,
    pub delay: Option<Duration>,
}

impl MockRoute {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "text/plain".to_string(),
            delay: None,
        }
    }

    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self::ok(body).with_content_type("application/json")
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_type: "text/plain".to_string(),
            delay: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Request observed by the mock server.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub path: String,
    pub user_agent: Option<String>,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, MockRoute>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Minimal HTTP server answering canned responses by path.
///
/// Unknown paths answer 404. The server stops when dropped.
pub struct MockHttpServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockHttpServer {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(MockState::default());
        let service_state = state.clone();
        let make_svc = make_service_fn(move |_conn| {
            let state = service_state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req)))
            }
        });
        let server = Server::try_bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .context("failed to bind mock http server")?
            .serve(make_svc);
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();
        let graceful = server.with_graceful_shutdown(async {
            let _ = rx.await;
        });
        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                debug!(error = %err, "mock http server stopped with error");
            }
        });
        Ok(Self {
            addr,
            state,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    /// Registers (or replaces) the response for `path`. A path with a query string only
    /// matches requests carrying exactly that query.
    pub fn route(&self, path: impl Into<String>, route: MockRoute) {
        if let Ok(mut routes) = self.state.routes.lock() {
            routes.insert(path.into(), route);
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Number of requests received for `path` (ignoring query strings).
    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path.split('?').next() == Some(path))
            .count()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn handle(state: Arc<MockState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if let Ok(mut requests) = state.requests.lock() {
        requests.push(RecordedRequest {
            path: path_and_query.clone(),
            user_agent,
        });
    }
    let route = state.routes.lock().ok().and_then(|routes| {
        routes
            .get(&path_and_query)
            .or_else(|| routes.get(req.uri().path()))
            .cloned()
    });
    let Some(route) = route else {
        return Ok(plain(StatusCode::NOT_FOUND, "not found"));
    };
    if let Some(delay) = route.delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(route.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Body::from(route.body));
    *response.status_mut() = status;
    if let Ok(value) = route.content_type.parse() {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    Ok(response)
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
