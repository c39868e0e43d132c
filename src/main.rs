// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/main.rs - 深度伪造视频检测服务
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use jianzhen::{
  args::PipelineArgs,
  server::{self, DEFAULT_MAX_UPLOAD_MB, ServerConfig},
};

/// Jianzhen 深度伪造视频检测服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 监听地址
  #[arg(long, env = "JIANZHEN_BIND", default_value = "0.0.0.0:8000", value_name = "ADDR")]
  pub bind: SocketAddr,

  /// 上传文件大小上限（MiB）
  #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_MB, value_name = "MB")]
  pub max_upload_mb: usize,

  /// 临时文件目录
  #[arg(long, value_name = "DIR")]
  pub upload_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("抽帧间隔: {}", args.pipeline.sample_rate);
  info!("判定阈值: {}", args.pipeline.threshold);

  let pipeline = args
    .pipeline
    .build_pipeline()
    .context("模型加载失败")?;

  let config = ServerConfig {
    max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    upload_dir: args.upload_dir,
  };
  let app = server::router(Arc::new(pipeline), config);

  let listener = tokio::net::TcpListener::bind(args.bind)
    .await
    .with_context(|| format!("无法监听 {}", args.bind))?;
  server::serve(listener, app).await?;

  info!("服务已退出");
  Ok(())
}
