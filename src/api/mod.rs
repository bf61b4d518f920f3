//! HTTP 接口层
//!
//! 负责所有与浏览器前端的交互：上传、启动处理、轮询进度、下载产物

pub mod error;
pub mod handlers;
pub mod upload;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::orchestrator::{BatchProcessor, SessionRunner, SessionStore};
use crate::utils::logging;

/// 所有处理函数共享的状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SessionStore>,
    pub pool: BatchProcessor,
}

impl AppState {
    /// 创建状态并启动工作池（需要 tokio 运行时）
    pub fn new(config: Config) -> (Self, JoinHandle<()>) {
        Self::with_runner(SessionRunner::new(config, Arc::new(SessionStore::new())))
    }

    pub fn with_runner(runner: SessionRunner) -> (Self, JoinHandle<()>) {
        let config = Arc::new(runner.config().clone());
        let store = runner.store().clone();
        let (pool, dispatcher) = BatchProcessor::start(runner);
        (Self { config, store, pool }, dispatcher)
    }
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/config", get(handlers::get_config).post(handlers::save_config))
        .route("/api/upload", post(handlers::upload_files))
        .route("/api/process/:session_id", post(handlers::start_processing))
        .route("/api/progress/:session_id", get(handlers::get_progress))
        .route("/api/results/:session_id", get(handlers::get_results))
        .route("/api/cancel/:session_id", post(handlers::cancel_processing))
        .route("/api/download/*path", get(handlers::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动 HTTP 服务，直到收到退出信号
pub async fn run_server(config: Config) -> Result<()> {
    config
        .ensure_dirs()
        .await
        .context("无法创建输出目录")?;
    logging::log_server_startup(&config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("监听地址无效: {}:{}", config.host, config.port))?;

    let (state, _dispatcher) = AppState::new(config);
    let app = router(state);

    info!("🌐 服务监听 http://{}", addr);
    info!("接口:");
    info!("  GET  /health");
    info!("  GET  /api/config          POST /api/config");
    info!("  POST /api/upload          POST /api/process/:id");
    info!("  GET  /api/progress/:id    GET  /api/results/:id");
    info!("  POST /api/cancel/:id      GET  /api/download/*path");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("服务已退出");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C，正在退出..."),
        _ = terminate => info!("收到 SIGTERM，正在退出..."),
    }
}
