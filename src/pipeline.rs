// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/pipeline.rs - 单个视频的预测流水线
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  aggregate::{Aggregate, Verdict},
  frame::NormalizedNchwFrame,
  input::{InputError, VideoDecoder},
  model::{ClassProbabilities, Model},
  task::{PredictVideoTask, Task},
};

/// 分类器输入边长
pub const INPUT_SIZE: u32 = 224;

pub type ClassifierInput = NormalizedNchwFrame<INPUT_SIZE, INPUT_SIZE>;

#[derive(Error, Debug)]
pub enum PredictError {
  #[error("Could not open video")]
  OpenVideo(#[source] InputError),
  #[error("Inference failed: {0}")]
  Inference(Box<dyn std::error::Error + Send + Sync>),
  #[error("No frames could be sampled from video")]
  NoFrames,
}

/// HTTP 与命令行输出的 JSON 结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictResponse {
  Prediction { prediction: Verdict },
  Error { error: String },
}

impl PredictResponse {
  pub fn error(message: impl Into<String>) -> Self {
    PredictResponse::Error {
      error: message.into(),
    }
  }
}

impl From<Result<Aggregate, PredictError>> for PredictResponse {
  fn from(result: Result<Aggregate, PredictError>) -> Self {
    match result {
      Ok(aggregate) => PredictResponse::Prediction {
        prediction: aggregate.verdict,
      },
      Err(e) => PredictResponse::error(e.to_string()),
    }
  }
}

/// 对一个视频文件给出判定
pub trait VideoPredictor: Send + Sync {
  fn predict_video(&self, path: &Path) -> Result<Aggregate, PredictError>;
}

/// 持有分类器与解码器，串行完成 打开 → 抽帧 → 推理 → 聚合
pub struct VideoPipeline<M, D> {
  model: M,
  decoder: D,
  task: PredictVideoTask<INPUT_SIZE, INPUT_SIZE>,
}

impl<M, D> VideoPipeline<M, D> {
  pub fn new(model: M, decoder: D, task: PredictVideoTask<INPUT_SIZE, INPUT_SIZE>) -> Self {
    Self {
      model,
      decoder,
      task,
    }
  }

  pub fn model(&self) -> &M {
    &self.model
  }
}

impl<M, D> VideoPredictor for VideoPipeline<M, D>
where
  M: Model<Input = ClassifierInput, Output = ClassProbabilities> + Send + Sync,
  M::Error: std::error::Error + Send + Sync + 'static,
  D: VideoDecoder + Send + Sync,
{
  fn predict_video(&self, path: &Path) -> Result<Aggregate, PredictError> {
    info!("处理视频: {}", path.display());
    let frames = self.decoder.decode(path).map_err(|e| {
      warn!("无法打开视频 {}: {}", path.display(), e);
      PredictError::OpenVideo(e)
    })?;

    self.task.run_task(frames, &self.model)
  }
}
