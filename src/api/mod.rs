use crate::progress::{StatusBoard, StatusSnapshot};
use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

pub fn router(board: Arc<StatusBoard>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(get_status))
        .with_state(board)
}

/// Serve the live run status until the process exits.
pub async fn serve(bind_addr: String, board: Arc<StatusBoard>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("status server listening on {}", bind_addr);
    axum::serve(listener, router(board)).await?;
    Ok(())
}

async fn get_status(State(board): State<Arc<StatusBoard>>) -> Json<StatusSnapshot> {
    Json(board.snapshot())
}
