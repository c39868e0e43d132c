// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/server.rs - HTTP 服务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # HTTP 服务
//!
//! - `POST /predict-video/`：multipart 表单，文件字段名为 `file`，
//!   返回 `{"prediction": "FAKE" | "REAL"}` 或 `{"error": "..."}`，状态码恒为 200。
//! - `GET /health`：存活探针，返回 `ok`。
//!
//! 上传内容写入临时文件后交给流水线处理，请求结束时临时文件被删除。

use std::{io::Write, path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::{
    DefaultBodyLimit, Multipart, State,
    multipart::{MultipartError, MultipartRejection},
  },
  routing::{get, post},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::{
  aggregate::Aggregate,
  pipeline::{PredictError, PredictResponse, VideoPredictor},
};

pub const DEFAULT_MAX_UPLOAD_MB: usize = 512;
pub const UPLOAD_FIELD: &str = "file";
const DEFAULT_UPLOAD_SUFFIX: &str = ".mp4";
const TEMP_FILE_PREFIX: &str = "jianzhen-";

#[derive(Debug, Clone)]
pub struct ServerConfig {
  /// 请求体上限（字节）
  pub max_upload_bytes: usize,
  /// 临时文件目录，为空时使用系统临时目录
  pub upload_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
      upload_dir: None,
    }
  }
}

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("Invalid upload: {0}")]
  Rejected(#[from] MultipartRejection),
  #[error("Invalid upload: {0}")]
  Multipart(#[from] MultipartError),
  #[error("No file uploaded")]
  MissingFile,
  #[error("Could not store upload: {0}")]
  Io(#[from] std::io::Error),
  #[error("Prediction task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
  #[error(transparent)]
  Predict(#[from] PredictError),
}

#[derive(Clone)]
struct AppState {
  predictor: Arc<dyn VideoPredictor>,
  upload_dir: Option<PathBuf>,
}

pub fn router(predictor: Arc<dyn VideoPredictor>, config: ServerConfig) -> Router {
  let state = AppState {
    predictor,
    upload_dir: config.upload_dir,
  };

  Router::new()
    .route("/predict-video/", post(predict_video))
    .route("/health", get(health))
    .layer(DefaultBodyLimit::max(config.max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::very_permissive())
    .with_state(state)
}

/// 监听直到收到 Ctrl-C
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
  if let Ok(addr) = listener.local_addr() {
    info!("服务监听: http://{}", addr);
  }
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => {
      error!("无法监听中断信号: {}", e);
      std::future::pending::<()>().await;
    }
  }
}

async fn health() -> &'static str {
  "ok"
}

async fn predict_video(
  State(state): State<AppState>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Json<PredictResponse> {
  let response = match handle_upload(state, multipart).await {
    Ok(aggregate) => PredictResponse::from(Ok(aggregate)),
    Err(e) => {
      warn!("预测失败: {}", e);
      PredictResponse::error(e.to_string())
    }
  };
  Json(response)
}

async fn handle_upload(
  state: AppState,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Aggregate, UploadError> {
  let mut multipart = multipart?;

  let (suffix, data) = loop {
    let Some(field) = multipart.next_field().await? else {
      return Err(UploadError::MissingFile);
    };
    if field.name() != Some(UPLOAD_FIELD) {
      debug!("忽略字段: {:?}", field.name());
      continue;
    }
    let suffix = upload_suffix(field.file_name());
    let data = field.bytes().await?;
    break (suffix, data);
  };
  info!("收到上传文件: {} 字节", data.len());

  let AppState {
    predictor,
    upload_dir,
  } = state;
  let aggregate = tokio::task::spawn_blocking(move || -> Result<Aggregate, UploadError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_FILE_PREFIX).suffix(&suffix);
    let mut file = match &upload_dir {
      Some(dir) => builder.tempfile_in(dir)?,
      None => builder.tempfile()?,
    };
    file.write_all(&data)?;
    file.flush()?;
    debug!("临时文件: {}", file.path().display());

    // 临时文件在 file 离开作用域时删除
    let aggregate = predictor.predict_video(file.path())?;
    Ok(aggregate)
  })
  .await??;

  Ok(aggregate)
}

/// 取上传文件名的扩展名作为临时文件后缀，否则使用 `.mp4`
fn upload_suffix(file_name: Option<&str>) -> String {
  file_name
    .and_then(|name| std::path::Path::new(name).extension())
    .and_then(|ext| ext.to_str())
    .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    .map(|ext| format!(".{}", ext.to_lowercase()))
    .unwrap_or_else(|| DEFAULT_UPLOAD_SUFFIX.to_string())
}
