use std::net::SocketAddr;

use axum::http::{header, HeaderValue};
use mood_monitor::classifier;
use mood_monitor::config::Config;
use mood_monitor::device;
use mood_monitor::logging::{init_tracing, LogConfig};
use mood_monitor::response::panic_response;
use mood_monitor::routes::build_router;
use mood_monitor::state::AppState;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting mood-monitor");

    // Panics on unusable backend configuration
    classifier::validate_config(&config.classifier);
    device::validate_config(&config.capture.device);

    let state = AppState::from_config(&config);
    tracing::info!(
        source = ?config.capture.device.source,
        classifier_mock = config.classifier.mock,
        mood_log = %config.mood_log_path,
        "Capture backends configured"
    );

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(4);

    // 关闭时取消进行中的采集，并等待其写完情绪日志
    let sessions = state.sessions().clone();
    let session_drain = tokio::spawn(async move {
        if shutdown_rx.recv().await.is_ok() && sessions.stop().await {
            if let Some(report) = sessions.wait().await {
                tracing::info!(session_id = %report.id, persisted = report.persisted, "Active session drained");
            }
        }
    });

    let app = build_router(state)
        .layer(build_cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    let server_future =
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_tx));

    if let Err(e) = server_future.await {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    if let Err(e) = session_drain.await {
        tracing::error!(error = %e, "Session drain task panicked");
    }
    tracing::info!("Shutdown complete");
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origin.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_credentials(false)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any);
    }

    match config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any),
        Err(e) => {
            panic!(
                "FATAL: Invalid CORS_ORIGIN '{}': {}. \
                 Fix the CORS_ORIGIN environment variable.",
                config.cors_origin, e
            );
        }
    }
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
