use raffle_board_backend::error::AppError;
use raffle_board_backend::telemetry::setup_tracing;
use raffle_board_backend::{run_server, shutdown_signal, AppState};
use raffle_board_config::get_config;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    setup_tracing();

    let config = get_config()?;
    let listener = TcpListener::bind(config.listen).await?;
    let state = AppState::from_config(config).await?;

    run_server(listener, state, shutdown_signal()).await
}
