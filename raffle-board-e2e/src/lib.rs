//! Runs the real server on an ephemeral port and talks to it over TCP.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use raffle_board_backend::error::AppError;
use raffle_board_backend::{run_server, AppState};
use raffle_board_config::{Config, StorageConfig};
use raffle_board_lifecycle::content::Unconfigured;
use raffle_board_lifecycle::{Engine, FixedClock, MemoryStore, StaticTokens};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub clock: Arc<FixedClock>,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<std::result::Result<(), AppError>>,
}

fn config(addr: SocketAddr) -> Config {
    Config {
        url: format!("http://{addr}"),
        listen: addr,
        storage: StorageConfig::Memory,
        openidconnect: None,
        dev_tokens: std::collections::HashMap::new(),
        content_generation: None,
        utc_offset_minutes: 0,
    }
}

impl TestServer {
    /// Starts a server backed by memory that accepts `tokens` (token, user)
    /// and believes it is `now` until told otherwise through
    /// [`TestServer::clock`].
    pub async fn start(tokens: &[(&str, &str)], now: DateTime<Utc>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let clock = Arc::new(FixedClock::new(now));
        let identity: StaticTokens = tokens.iter().copied().collect();
        let engine = Engine::new(Arc::new(MemoryStore::new()), Arc::new(identity))
            .with_clock(clock.clone());
        let state = AppState::new(engine, Arc::new(Unconfigured), config(addr));

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(run_server(listener, state, async move {
            shutdown_rx.await.ok();
        }));
        Ok(Self {
            addr,
            clock,
            shutdown,
            server,
        })
    }

    /// Sends one request on a fresh connection and returns the response with
    /// its body still streaming.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> Result<Response<Incoming>> {
        let stream = TcpStream::connect(self.addr).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::task::spawn(async move {
            if let Err(err) = conn.await {
                warn!("client connection failed: {err}");
            }
        });

        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, self.addr.to_string());
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if body.is_some() {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        let request = request.body(Full::new(Bytes::from(body.unwrap_or_default().to_owned())))?;
        Ok(sender.send_request(request).await?)
    }

    /// Sends one request and parses the JSON answer. An empty body becomes
    /// `null`.
    pub async fn json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let response = self.send(method, path, token, body).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        if bytes.is_empty() {
            return Ok((status, Value::Null));
        }
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    /// Asks the server to stop and waits until it has.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.send(()).ok();
        self.server.await??;
        Ok(())
    }
}
