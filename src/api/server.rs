use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{routes::create_router, state::AppState};
use crate::error::Result;

/// Serve the HTTP API until `shutdown` resolves
pub async fn serve_api<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}
