//! Squad Live 서버 실행 파일

use anyhow::Context;
use squad_live::config::Config;
use squad_live::server;
use squad_live::state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::new(config.clone()));
    state.segments.ensure_dir().await.with_context(|| {
        format!(
            "failed to create recordings directory {}",
            state.segments.dir().display()
        )
    })?;

    // 유휴 방송 정리 스케줄러
    if server::spawn_sweeper(state.clone()).is_some() {
        tracing::info!(
            idle_timeout_secs = config.broadcast.idle_timeout_secs,
            "Idle broadcast sweeper started"
        );
    }

    let app = server::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("🚀 Squad Live server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);
    tracing::info!(
        mode = config.broadcast.mode.as_str(),
        recordings = %config.broadcast.recordings_dir.display(),
        turn_realm = %config.turn.realm,
        "Broadcast relay configured"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
