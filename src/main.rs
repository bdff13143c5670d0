use tokio::net::TcpListener;
use tracing::info;

use brewlog::api;
use brewlog::app_state::AppState;
use brewlog::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let addr = config.server_address();

    let state = AppState::from_config(config)
        .await
        .map_err(|e| anyhow::anyhow!("startup failed: {}", e))?;
    let app = api::router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("brewlog listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
