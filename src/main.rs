use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use ipad_chatbot::core::config::AppPaths;
use ipad_chatbot::core::logging;
use ipad_chatbot::server;
use ipad_chatbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths, "server.log");

    let state = AppState::initialize(paths).await;
    let state = match state {
        Ok(state) => state,
        Err(e) => return Err(startup_failure(e.into())),
    };
    if let Err(e) = state.preload_retriever().await {
        return Err(startup_failure(e.into()));
    }

    let bind_addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", addr);

    let app: Router = server::router::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn startup_failure(err: anyhow::Error) -> anyhow::Error {
    tracing::error!("Startup failed: {:#}", err);
    logging::flush();
    err
}
