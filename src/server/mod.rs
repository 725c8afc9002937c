//! HTTP control surface for the workflow engine

mod error;
mod routes;

pub use routes::router;

use crate::workflow::Engine;
use anyhow::{Context, Result};

/// Bind and serve the API until the process is stopped
pub async fn serve(bind: &str, engine: Engine) -> Result<()> {
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;

    tracing::info!(%bind, "API listening");
    axum::serve(listener, app)
        .await
        .context("serving API")?;

    Ok(())
}
