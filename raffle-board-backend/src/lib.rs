//! JSON over HTTP for the raffle lifecycle.
//!
//! hyper serves every connection directly; [`routes::handle`] maps a request
//! onto one [`Engine`] operation and turns the outcome into a response.

pub mod content;
pub mod error;
pub mod routes;
pub mod session;
pub mod telemetry;

use core::convert::Infallible;
use core::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chrono::FixedOffset;
use futures_util::pin_mut;
use http::Request;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use raffle_board_config::{Config, StorageConfig};
use raffle_board_database::PostgresStore;
use raffle_board_lifecycle::content::{ContentGenerator, Unconfigured};
use raffle_board_lifecycle::{Engine, IdentityProvider, MemoryStore, RaffleStore, StaticTokens};
use raffle_board_openidconnect::OpenIdConnectProvider;
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, warn, Instrument as _};

use crate::content::HttpContentGenerator;
use crate::error::AppError;

pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub content: Arc<dyn ContentGenerator>,
    pub config: Arc<Config>,
    /// Cancelled when the server starts shutting down. Ends open event
    /// streams so their connections can close.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Engine, content: Arc<dyn ContentGenerator>, config: Config) -> Self {
        Self {
            engine: Arc::new(engine),
            content,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wires storage, identity and content generation as configured.
    pub async fn from_config(config: Config) -> Result<Self, AppError> {
        let store: Arc<dyn RaffleStore> = match &config.storage {
            StorageConfig::Postgres { database_url } => {
                Arc::new(PostgresStore::connect(database_url).await?)
            }
            StorageConfig::Memory => {
                warn!("raffles are kept in memory and will be lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let identity: Arc<dyn IdentityProvider> = if config.openidconnect.is_some() {
            Arc::new(OpenIdConnectProvider::new(config.clone()))
        } else {
            warn!(
                "openid connect is not configured, accepting {} development tokens",
                config.dev_tokens.len()
            );
            Arc::new(
                config
                    .dev_tokens
                    .iter()
                    .map(|(token, user)| (token.clone(), user.clone()))
                    .collect::<StaticTokens>(),
            )
        };

        let local_offset = FixedOffset::east_opt(config.utc_offset_minutes * 60)
            .ok_or(AppError::UtcOffset(config.utc_offset_minutes))?;

        let content: Arc<dyn ContentGenerator> = match &config.content_generation {
            Some(content_generation) => {
                Arc::new(HttpContentGenerator::from_config(content_generation))
            }
            None => Arc::new(Unconfigured),
        };

        let engine = Engine::new(store, identity).with_local_offset(local_offset);
        Ok(Self::new(engine, content, config))
    }
}

/// Accepts connections on `listener` until `shutdown` completes, then waits
/// for the open connections to finish.
pub async fn run_server(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()>,
) -> Result<(), AppError> {
    // tell the connections to shut down
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let shutdown_tx = Arc::new(shutdown_tx);

    // wait for the connections to finish shutdown
    let (closed_tx, closed_rx) = watch::channel(());

    info!("listening on {}", listener.local_addr()?);
    pin_mut!(shutdown);

    loop {
        select! {
            accept = listener.accept() => {
                let (socket, remote_addr) = match accept {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!("failed to accept connection: {err}");
                        continue;
                    }
                };

                let shutdown_tx = Arc::clone(&shutdown_tx);
                let closed_rx = closed_rx.clone();
                let state = state.clone();

                let serve = async move {
                    let service = service_fn(move |request: Request<Incoming>| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(routes::handle(state, request).await) }
                    });

                    let builder = Builder::new(TokioExecutor::new());
                    let connection =
                        builder.serve_connection_with_upgrades(TokioIo::new(socket), service);
                    pin_mut!(connection);

                    let mut shutting_down = false;
                    loop {
                        select! {
                            connection_result = connection.as_mut() => {
                                if let Err(err) = connection_result {
                                    debug!("connection closed with error: {err:#}");
                                }
                                break;
                            }
                            () = shutdown_tx.closed(), if !shutting_down => {
                                shutting_down = true;
                                connection.as_mut().graceful_shutdown();
                            }
                        }
                    }

                    drop(closed_rx);
                };
                tokio::spawn(serve.instrument(debug_span!("connection", %remote_addr)));
            }
            () = shutdown.as_mut() => {
                info!("shutting down, waiting for open connections");
                state.shutdown.cancel();
                drop(listener);
                drop(shutdown_rx);
                drop(closed_rx);
                closed_tx.closed().await;
                break;
            }
        }
    }

    info!("server stopped");
    Ok(())
}

/// Completes on ctrl-c or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            core::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
