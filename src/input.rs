// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input.rs - 视频输入与抽帧
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

use std::{num::NonZeroUsize, path::Path};

use thiserror::Error;
use tracing::debug;

use crate::frame::VideoFrame;

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerDecoder, GStreamerFrames, GStreamerInputError, GStreamerInputPipelineBuilder,
};

pub const DEFAULT_SAMPLE_RATE: NonZeroUsize = match NonZeroUsize::new(5) {
  Some(rate) => rate,
  None => unreachable!(),
};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("Video file not found: {0}")]
  NotFound(String),
}

/// 视频解码器：打开视频文件，按解码顺序逐帧产出
pub trait VideoDecoder {
  type Frames: Iterator<Item = VideoFrame>;

  fn decode(&self, path: &Path) -> Result<Self::Frames, InputError>;
}

/// 每隔 N 帧取一帧的抽帧器
///
/// 所有帧都会被解码，只有序号满足 `index % N == 0` 的帧被产出，
/// 即 0, N, 2N, ...。内部解码器在抽帧器被丢弃时释放。
pub struct FrameSampler<I> {
  inner: I,
  sample_rate: NonZeroUsize,
  frame_count: usize,
  sampled: usize,
}

impl<I: Iterator<Item = VideoFrame>> FrameSampler<I> {
  pub fn new(inner: I, sample_rate: NonZeroUsize) -> Self {
    Self {
      inner,
      sample_rate,
      frame_count: 0,
      sampled: 0,
    }
  }

  /// 已解码的帧数
  pub fn frame_count(&self) -> usize {
    self.frame_count
  }

  /// 已产出的帧数
  pub fn sampled(&self) -> usize {
    self.sampled
  }
}

impl<I: Iterator<Item = VideoFrame>> Iterator for FrameSampler<I> {
  type Item = VideoFrame;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let frame = self.inner.next()?;
      let index = self.frame_count;
      self.frame_count += 1;

      if index % self.sample_rate.get() == 0 {
        debug!("抽取第 {} 帧 (解码序号 {})", index, frame.index());
        self.sampled += 1;
        return Some(frame);
      }
    }
  }
}
