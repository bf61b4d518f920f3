//! 路由处理函数

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::path::{Component, Path as FsPath, PathBuf};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::upload;
use crate::api::AppState;
use crate::orchestrator::SessionResults;
use crate::models::SessionSnapshot;
use crate::settings::{self, SettingsUpdate, SettingsView};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> ApiResult<Json<SettingsView>> {
    Ok(Json(settings::load_view(&state.config).await?))
}

/// POST /api/config
pub async fn save_config(
    State(state): State<AppState>,
    body: Result<Json<SettingsUpdate>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(update) = body.map_err(|e| ApiError::BadRequest(format!("请求体无效: {}", e)))?;
    let mode = settings::save(&state.config, update).await?;
    Ok(MessageResponse::ok(format!(
        "Configuration saved successfully (packager mode: {})",
        mode
    )))
}

/// POST /api/upload
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<upload::UploadResponse>> {
    let form = upload::read_form(multipart).await?;
    let (files, mode) = upload::validate(form)?;
    let response = upload::store_upload(&state.store, &state.config.upload_dir, files, mode).await?;
    Ok(Json(response))
}

/// POST /api/process/:session_id
pub async fn start_processing(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.pool.submit(&session_id).await?;
    Ok(MessageResponse::ok("Processing started"))
}

/// GET /api/progress/:session_id
pub async fn get_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.store.get_progress(&session_id).await?))
}

/// GET /api/results/:session_id
pub async fn get_results(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResults>> {
    Ok(Json(state.store.get_results(&session_id).await?))
}

/// POST /api/cancel/:session_id
pub async fn cancel_processing(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = state.store.request_cancel(&session_id).await?;
    info!("⏹ 会话 {} 收到取消请求", session_id);
    Ok(Json(json!({
        "success": true,
        "message": "Cancellation requested",
        "status": status,
    })))
}

/// GET /api/download/*path
pub async fn download(State(state): State<AppState>, Path(path): Path<String>) -> ApiResult<Response> {
    let file_path = resolve_download(&state.config.outputs_dir, &path).await?;
    let data = tokio::fs::read(&file_path).await?;

    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    let content_type = match file_path.extension().and_then(|e| e.to_str()) {
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("xml") => "application/xml",
        _ => "application/octet-stream",
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ),
        ],
        data,
    )
        .into_response())
}

/// 解析下载路径，只允许输出目录内已存在的文件
pub async fn resolve_download(outputs_dir: &FsPath, requested: &str) -> ApiResult<PathBuf> {
    let not_found = || ApiError::NotFound(format!("文件不存在: {}", requested));

    let relative = FsPath::new(requested.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(not_found());
    }

    let root = tokio::fs::canonicalize(outputs_dir).await.map_err(|_| not_found())?;
    let candidate = tokio::fs::canonicalize(root.join(relative))
        .await
        .map_err(|_| not_found())?;

    // 符号链接也不能逃出输出目录
    if !candidate.starts_with(&root) {
        return Err(not_found());
    }
    let metadata = tokio::fs::metadata(&candidate).await.map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }
    Ok(candidate)
}
