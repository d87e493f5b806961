//! Run the HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::context::{AppContext, SharedContext};
use crate::error::ServerResult;
use crate::routes::router;
use crate::signals::{shutdown_signal, wait_for};

/// Execute the serve command: build the context, bind, and serve until
/// SIGINT or SIGTERM.
pub async fn serve(config: ServerConfig, bind: Option<String>) -> ServerResult<()> {
    let mut config = config;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let addr = config.server.bind_addr()?;
    let ctx = Arc::new(AppContext::build(&config)?);

    let listener = TcpListener::bind(addr).await?;
    let shutdown = wait_for(shutdown_signal());
    serve_until(ctx, listener, &config.server.cors_origins, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_until<F>(
    ctx: SharedContext,
    listener: TcpListener,
    cors_origins: &[String],
    shutdown: F,
) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local: SocketAddr = listener.local_addr()?;
    let app = router(ctx.clone(), cors_origins);

    info!(addr = %local, "Veritas server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let summary = ctx.orchestrator.executor().book().summary().await;
    info!(
        uptime_secs = ctx.uptime_secs(),
        charges = ?summary,
        "Veritas server stopped"
    );
    Ok(())
}
