// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/bin/predict_oneshot.rs - 本地视频文件检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use jianzhen::{
  args::PipelineArgs,
  pipeline::{PredictResponse, VideoPredictor},
};

/// 对本地视频文件逐个给出判定，每个文件输出一行 JSON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 视频文件
  #[arg(required = true, value_name = "VIDEO")]
  pub videos: Vec<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let pipeline = args.pipeline.build_pipeline()?;

  for video in &args.videos {
    let now = std::time::Instant::now();
    let result = pipeline.predict_video(video);
    if let Ok(aggregate) = &result {
      info!(
        "{}: 推理 {} 帧, 平均伪造概率 {:.4}, 耗时 {:.2?}",
        video.display(),
        aggregate.frames,
        aggregate.mean,
        now.elapsed()
      );
    }
    let response = PredictResponse::from(result);
    println!("{}", serde_json::to_string(&response)?);
  }

  Ok(())
}
