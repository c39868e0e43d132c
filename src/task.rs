// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/task.rs - 抽帧、预处理、推理与聚合任务
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

use std::num::NonZeroUsize;

use tracing::{debug, info, warn};

use crate::{
  aggregate::{Aggregate, EmptyScorePolicy, ScoreAggregator},
  frame::{NormalizedNchwFrame, VideoFrame},
  input::{DEFAULT_SAMPLE_RATE, FrameSampler},
  model::{ClassProbabilities, Model},
  pipeline::PredictError,
  preprocess::Preprocessor,
};

pub trait Task<I, M> {
  type Output;
  type Error;
  fn run_task(&self, input: I, model: &M) -> Result<Self::Output, Self::Error>;
}

/// 对一段视频的帧序列做出 FAKE/REAL 判定
///
/// 每隔 `sample_rate` 帧取一帧，逐帧预处理并单独推理，
/// 收集伪造概率后求平均并与阈值比较。
#[derive(Debug, Clone)]
pub struct PredictVideoTask<const W: u32, const H: u32> {
  preprocessor: Preprocessor<W, H>,
  sample_rate: NonZeroUsize,
  aggregator: ScoreAggregator,
  empty_policy: EmptyScorePolicy,
}

impl<const W: u32, const H: u32> Default for PredictVideoTask<W, H> {
  fn default() -> Self {
    Self {
      preprocessor: Preprocessor::imagenet(),
      sample_rate: DEFAULT_SAMPLE_RATE,
      aggregator: ScoreAggregator::default(),
      empty_policy: EmptyScorePolicy::default(),
    }
  }
}

impl<const W: u32, const H: u32> PredictVideoTask<W, H> {
  pub fn with_sample_rate(mut self, sample_rate: NonZeroUsize) -> Self {
    self.sample_rate = sample_rate;
    self
  }

  pub fn with_aggregator(mut self, aggregator: ScoreAggregator) -> Self {
    self.aggregator = aggregator;
    self
  }

  pub fn with_empty_policy(mut self, policy: EmptyScorePolicy) -> Self {
    self.empty_policy = policy;
    self
  }

  pub fn sample_rate(&self) -> NonZeroUsize {
    self.sample_rate
  }
}

impl<const W: u32, const H: u32, I, M> Task<I, M> for PredictVideoTask<W, H>
where
  I: Iterator<Item = VideoFrame>,
  M: Model<Input = NormalizedNchwFrame<W, H>, Output = ClassProbabilities>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = Aggregate;
  type Error = PredictError;

  fn run_task(&self, input: I, model: &M) -> Result<Self::Output, Self::Error> {
    info!("开始任务, 抽帧间隔 {}", self.sample_rate);
    let now = std::time::Instant::now();

    let mut sampler = FrameSampler::new(input, self.sample_rate);
    let mut scores = Vec::new();
    for frame in sampler.by_ref() {
      let tensor = self.preprocessor.run(&frame);
      let probs = model
        .infer(&tensor)
        .map_err(|e| PredictError::Inference(Box::new(e)))?;
      debug!("第 {} 帧伪造概率: {:.4}", frame.index(), probs.fake_score());
      scores.push(probs.fake_score());
    }

    if scores.is_empty() {
      match self.empty_policy {
        EmptyScorePolicy::AssumeReal => {
          warn!("没有抽取到任何帧 (共解码 {} 帧), 按 REAL 处理", sampler.frame_count());
        }
        EmptyScorePolicy::Reject => {
          warn!("没有抽取到任何帧 (共解码 {} 帧)", sampler.frame_count());
          return Err(PredictError::NoFrames);
        }
      }
    }

    let aggregate = self.aggregator.aggregate(&scores);
    info!(
      "任务完成: 解码 {} 帧, 推理 {} 帧, 平均伪造概率 {:.4}, 判定 {}, 耗时 {:.2?}",
      sampler.frame_count(),
      aggregate.frames,
      aggregate.mean,
      aggregate.verdict,
      now.elapsed()
    );

    Ok(aggregate)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::{aggregate::Verdict, frame::PixelOrder};

  type Input = NormalizedNchwFrame<8, 8>;

  #[derive(Debug, thiserror::Error)]
  #[error("stub failure")]
  struct StubError;

  struct ConstModel {
    fake: f32,
    calls: AtomicUsize,
  }

  impl ConstModel {
    fn new(fake: f32) -> Self {
      Self {
        fake,
        calls: AtomicUsize::new(0),
      }
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Model for ConstModel {
    type Input = Input;
    type Output = ClassProbabilities;
    type Error = StubError;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(ClassProbabilities {
        fake: self.fake,
        real: 1.0 - self.fake,
      })
    }
  }

  struct FailingModel;

  impl Model for FailingModel {
    type Input = Input;
    type Output = ClassProbabilities;
    type Error = StubError;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err(StubError)
    }
  }

  fn frames(count: u64) -> impl Iterator<Item = VideoFrame> {
    (0..count)
      .map(|i| VideoFrame::new(vec![90u8; 3 * 16 * 12], 16, 12, PixelOrder::Bgr, i).unwrap())
  }

  #[test]
  fn thirty_frames_at_rate_five_classify_six() {
    let model = ConstModel::new(0.9);
    let aggregate = PredictVideoTask::<8, 8>::default()
      .run_task(frames(30), &model)
      .unwrap();

    assert_eq!(model.calls(), 6);
    assert_eq!(aggregate.frames, 6);
    assert!((aggregate.mean - 0.9).abs() < 1e-6);
    assert_eq!(aggregate.verdict, Verdict::Fake);
  }

  #[test]
  fn short_video_uses_first_frame_only() {
    let model = ConstModel::new(0.2);
    let aggregate = PredictVideoTask::<8, 8>::default()
      .run_task(frames(2), &model)
      .unwrap();

    assert_eq!(model.calls(), 1);
    assert_eq!(aggregate.verdict, Verdict::Real);
  }

  #[test]
  fn empty_video_defaults_to_real() {
    let model = ConstModel::new(0.9);
    let aggregate = PredictVideoTask::<8, 8>::default()
      .run_task(frames(0), &model)
      .unwrap();

    assert_eq!(model.calls(), 0);
    assert_eq!(aggregate.frames, 0);
    assert_eq!(aggregate.mean, 0.0);
    assert_eq!(aggregate.verdict, Verdict::Real);
  }

  #[test]
  fn empty_video_can_be_rejected() {
    let model = ConstModel::new(0.9);
    let result = PredictVideoTask::<8, 8>::default()
      .with_empty_policy(EmptyScorePolicy::Reject)
      .run_task(frames(0), &model);

    assert!(matches!(result, Err(PredictError::NoFrames)));
  }

  #[test]
  fn custom_sample_rate_and_threshold() {
    let model = ConstModel::new(0.7);
    let aggregate = PredictVideoTask::<8, 8>::default()
      .with_sample_rate(NonZeroUsize::new(1).unwrap())
      .with_aggregator(ScoreAggregator::new(0.8))
      .run_task(frames(4), &model)
      .unwrap();

    assert_eq!(model.calls(), 4);
    assert_eq!(aggregate.verdict, Verdict::Real);
  }

  #[test]
  fn inference_failure_is_reported() {
    let result = PredictVideoTask::<8, 8>::default().run_task(frames(10), &FailingModel);
    match result {
      Err(PredictError::Inference(e)) => assert_eq!(e.to_string(), "stub failure"),
      other => panic!("unexpected result: {other:?}"),
    }
  }
}
