use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _};

/// Used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str =
    "info,raffle_board_backend=debug,raffle_board_lifecycle=debug,hyper=info,h2=info";

/// Logs to stdout, filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into()),
            ),
        )
        .init();
}
