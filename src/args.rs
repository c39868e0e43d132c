// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::num::NonZeroUsize;

use clap::Args;
use url::Url;

use crate::{
  aggregate::{DEFAULT_FAKE_THRESHOLD, EmptyScorePolicy, ScoreAggregator},
  frame::PixelOrder,
  input::DEFAULT_SAMPLE_RATE,
  model::DeviceKind,
  pipeline::INPUT_SIZE,
  task::PredictVideoTask,
};

/// 流水线参数，服务与命令行工具共用
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 模型地址，例如 resnet50:///srv/models/best_deepfake_model.pth
  #[arg(long, env = "JIANZHEN_MODEL", value_name = "MODEL")]
  pub model: Url,

  /// 推理设备: auto、cpu、cuda[:N]、metal[:N]
  #[arg(long, env = "JIANZHEN_DEVICE", default_value = "auto", value_name = "DEVICE")]
  pub device: DeviceKind,

  /// 抽帧间隔，每 N 帧取一帧
  #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE, value_name = "N")]
  pub sample_rate: NonZeroUsize,

  /// 判定阈值，平均伪造概率严格大于该值时判为 FAKE
  #[arg(
    long,
    default_value_t = DEFAULT_FAKE_THRESHOLD,
    value_parser = parse_threshold,
    value_name = "THRESHOLD"
  )]
  pub threshold: f64,

  /// 没有抽取到任何帧时的处理方式
  #[arg(long, value_enum, default_value_t = EmptyScorePolicy::AssumeReal)]
  pub empty_policy: EmptyScorePolicy,

  /// 解码输出的通道顺序
  #[arg(long, value_enum, default_value_t = PixelOrder::Rgb)]
  pub pixel_format: PixelOrder,

  /// 打开视频的超时时间（秒）
  #[arg(long, default_value_t = 10, value_name = "SECONDS")]
  pub open_timeout_secs: u64,
}

impl PipelineArgs {
  pub fn task(&self) -> PredictVideoTask<INPUT_SIZE, INPUT_SIZE> {
    PredictVideoTask::default()
      .with_sample_rate(self.sample_rate)
      .with_aggregator(ScoreAggregator::new(self.threshold))
      .with_empty_policy(self.empty_policy)
  }
}

/// 阈值必须落在 [0, 1] 内
fn parse_threshold(s: &str) -> Result<f64, String> {
  let value: f64 = s.parse().map_err(|e| format!("{}: {}", s, e))?;
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(format!("阈值必须在 0.0 到 1.0 之间, 实际为 {}", s))
  }
}

#[cfg(feature = "gstreamer_input")]
mod build {
  use std::time::Duration;

  use tracing::info;

  use super::PipelineArgs;
  use crate::{
    FromUrl,
    input::GStreamerDecoder,
    model::{ClassifierError, DeepfakeResNet50, ResNet50Builder},
    pipeline::{ClassifierInput, VideoPipeline},
  };

  pub type GStreamerPipeline = VideoPipeline<DeepfakeResNet50<ClassifierInput>, GStreamerDecoder>;

  impl PipelineArgs {
    /// 加载模型并初始化解码器，失败时进程无法启动
    pub fn build_pipeline(&self) -> Result<GStreamerPipeline, ClassifierError> {
      info!("模型地址: {}", self.model);
      let model = ResNet50Builder::from_url(&self.model)?
        .device(self.device)
        .build()?;

      let decoder = GStreamerDecoder::default()
        .with_format(self.pixel_format)
        .with_open_timeout(Duration::from_secs(self.open_timeout_secs));

      Ok(VideoPipeline::new(model, decoder, self.task()))
    }
  }
}

#[cfg(feature = "gstreamer_input")]
pub use self::build::GStreamerPipeline;
