use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use docusign_demo::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docusign_demo=info".parse()?)
                .add_directive("anysign_core=info".parse()?)
                .add_directive("docusign_backend=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = Config::from_env();
    info!("Initializing DocuSign demo...");
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::new(config).await?);

    let app = router(state);

    info!("Starting DocuSign demo on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
