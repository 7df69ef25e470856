//! Plain-text query server.
//!
//! Serves read-only snapshots of the [`MonitorRegistry`] over HTTP/1.1.
//! Routing and path extraction go through an axum [`Router`], so monitor,
//! counter and store names are percent-decoded before lookup. Connections
//! are accepted by our own loop, bounded by a semaphore, and each one is
//! driven by hyper with a header read timeout.
//!
//! # Routes
//!
//! | path | body |
//! |---|---|
//! | `/monitors` | one `name:filename` line per monitor |
//! | `/monitors/{m}` | `stores` and `counters` |
//! | `/monitors/{m}/stores` | store names |
//! | `/monitors/{m}/stores/{s}` | the store's lines |
//! | `/monitors/{m}/counters` | counter names |
//! | `/monitors/{m}/counters/{c}` | the counter value |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logtally_core::config::ServerConfig;
use logtally_monitor::{MonitorError, MonitorRegistry};

type Registry = State<Arc<MonitorRegistry>>;

/// A plain-text response body with its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainText {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response body; every line ends with `\n`.
    pub body: String,
}

impl PlainText {
    fn ok(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// One entry per line.
    fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = String::new();
        for line in lines {
            body.push_str(line.as_ref());
            body.push('\n');
        }
        Self::ok(body)
    }

    fn error(status: StatusCode, message: impl std::fmt::Display) -> Self {
        Self {
            status,
            body: format!("{message}\n"),
        }
    }
}

impl IntoResponse for PlainText {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.body,
        )
            .into_response()
    }
}

impl From<MonitorError> for PlainText {
    fn from(err: MonitorError) -> Self {
        if err.is_not_found() {
            Self::error(StatusCode::NOT_FOUND, err)
        } else {
            Self::error(StatusCode::INTERNAL_SERVER_ERROR, err)
        }
    }
}

/// Percent-decoded path segments; a malformed segment answers `400`.
struct Names<T>(T);

impl<S, T> FromRequestParts<S> for Names<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = PlainText;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(names)| Self(names))
            .map_err(|rejection| PlainText::error(rejection.status(), rejection.body_text()))
    }
}

/// Build the query router over `registry`.
///
/// Only `GET` is routed; other methods on a known path answer `405`.
pub fn router(registry: Arc<MonitorRegistry>) -> Router {
    Router::new()
        .route("/monitors", get(list_monitors))
        .route("/monitors/{monitor}", get(monitor_index))
        .route("/monitors/{monitor}/stores", get(list_stores))
        .route("/monitors/{monitor}/stores/{store}", get(store_lines))
        .route("/monitors/{monitor}/counters", get(list_counters))
        .route("/monitors/{monitor}/counters/{counter}", get(counter_value))
        .fallback(no_such_path)
        .with_state(registry)
}

async fn list_monitors(State(registry): Registry) -> PlainText {
    let summaries = registry.summaries().await;
    PlainText::lines(
        summaries
            .iter()
            .map(|s| format!("{}:{}", s.name, s.filename.display())),
    )
}

async fn monitor_index(
    State(registry): Registry,
    Names(monitor): Names<String>,
) -> Result<PlainText, PlainText> {
    registry.get(&monitor).await?;
    Ok(PlainText::lines(["stores", "counters"]))
}

async fn list_stores(
    State(registry): Registry,
    Names(monitor): Names<String>,
) -> Result<PlainText, PlainText> {
    Ok(PlainText::lines(registry.store_names(&monitor).await?))
}

async fn store_lines(
    State(registry): Registry,
    Names((monitor, store)): Names<(String, String)>,
) -> Result<PlainText, PlainText> {
    Ok(PlainText::lines(
        registry.store_lines(&monitor, &store).await?,
    ))
}

async fn list_counters(
    State(registry): Registry,
    Names(monitor): Names<String>,
) -> Result<PlainText, PlainText> {
    Ok(PlainText::lines(registry.counter_names(&monitor).await?))
}

async fn counter_value(
    State(registry): Registry,
    Names((monitor, counter)): Names<(String, String)>,
) -> Result<PlainText, PlainText> {
    let value = registry.counter_value(&monitor, &counter).await?;
    Ok(PlainText::ok(format!("{value}\n")))
}

async fn no_such_path(uri: Uri) -> PlainText {
    PlainText::error(StatusCode::NOT_FOUND, format!("no such path: {}", uri.path()))
}

/// Query server bound to a listening socket.
pub struct QueryServer {
    listener: TcpListener,
    router: Router,
    max_connections: usize,
    request_timeout: Duration,
}

impl QueryServer {
    /// Bind the listening socket described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn bind(config: &ServerConfig, registry: Arc<MonitorRegistry>) -> Result<Self> {
        let addr = format!("{}:{}", config.listen_addr, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind query server to {}: {}", addr, e))?;

        Ok(Self {
            listener,
            router: router(registry),
            max_connections: config.max_connections.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires.
    ///
    /// Connections already accepted run to completion on their own tasks.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(listen_addr = %self.local_addr()?, "query server listening");

        let connection_semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "query server accept error");
                            continue;
                        }
                    };

                    let Ok(permit) = Arc::clone(&connection_semaphore).try_acquire_owned() else {
                        warn!(peer = %addr, "max connections reached, rejecting connection");
                        continue;
                    };

                    let router = self.router.clone();
                    let request_timeout = self.request_timeout;

                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, router, request_timeout).await {
                            debug!(peer = %addr, error = %e, "query connection error");
                        }
                        drop(permit);
                    });
                }
                () = cancel.cancelled() => {
                    info!("query server received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Serve one request on `stream` and close it.
async fn serve_connection(
    stream: TcpStream,
    router: Router,
    request_timeout: Duration,
) -> std::result::Result<(), hyper::Error> {
    http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(request_timeout)
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(router))
        .await
}
