// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件解码
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

//! # GStreamer 视频解码模块
//!
//! 本模块基于 GStreamer 顺序解码视频文件，逐帧产出 [`VideoFrame`]：
//!
//! ```text
//! filesrc ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink
//! ```
//!
//! appsink 不丢帧、不与时钟同步，因此每一帧都会被完整解码并送达，
//! 抽帧由上层的 [`FrameSampler`](crate::input::FrameSampler) 完成。
//! 图片文件（JPEG、PNG）会被当作只有一帧的视频处理。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-libav
//! ```
//!
//! **macOS:**
//! ```bash
//! brew install gstreamer
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use jianzhen::input::{GStreamerDecoder, VideoDecoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let decoder = GStreamerDecoder::default();
//! for frame in decoder.decode("video.mp4".as_ref())? {
//!     println!("帧 {}: {}x{}", frame.index(), frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```

use std::{path::Path, time::Duration};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::{FrameError, PixelOrder, RGB_CHANNELS, VideoFrame},
  input::{InputError, VideoDecoder},
};

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法获取 filesrc 元素
  #[error("Failed to get filesrc element")]
  SourceNotFound,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 视频无法打开（文件不可读、格式无法识别或没有视频流）
  #[error("Failed to open video: {0}")]
  OpenFailed(String),
  /// 预卷超时
  #[error("Timed out after {0:?} waiting for the video to preroll")]
  PrerollTimeout(Duration),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 帧数据无效
  #[error("Invalid frame: {0}")]
  InvalidFrame(#[from] FrameError),
}

pub enum GStreamerInputBuilderItem {
  FileSource,
  TargetFormat { format: PixelOrder },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      // location 在管道创建后以属性方式设置，避免路径中的空格与引号
      GStreamerInputBuilderItem::FileSource => "filesrc name=src ! decodebin".to_string(),
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", caps_format(*format))
      }
    }
  }
}

fn caps_format(order: PixelOrder) -> &'static str {
  match order {
    PixelOrder::Rgb => "RGB",
    PixelOrder::Bgr => "BGR",
  }
}

/// GStreamer 输入管道构建器
///
/// ```no_run
/// use jianzhen::{frame::PixelOrder, input::GStreamerInputPipelineBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let frames = GStreamerInputPipelineBuilder::file("video.mp4")
///     .target_format(PixelOrder::Bgr)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct GStreamerInputPipelineBuilder {
  location: String,
  items: Vec<GStreamerInputBuilderItem>,
  format: PixelOrder,
  open_timeout: Duration,
}

impl GStreamerInputPipelineBuilder {
  pub fn file(location: impl Into<String>) -> Self {
    Self {
      location: location.into(),
      items: vec![GStreamerInputBuilderItem::FileSource],
      format: PixelOrder::Rgb,
      open_timeout: DEFAULT_OPEN_TIMEOUT,
    }
  }

  pub fn target_format(mut self, format: PixelOrder) -> Self {
    self.format = format;
    self
  }

  pub fn open_timeout(mut self, timeout: Duration) -> Self {
    self.open_timeout = timeout;
    self
  }

  pub fn build(mut self) -> Result<GStreamerFrames, GStreamerInputError> {
    gst::init()?;

    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: self.format,
    });

    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    let full_pipeline = format!(
      "{} ! appsink name=sink sync=false max-buffers=4 drop=false",
      basic_pipeline
    );

    debug!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    pipeline
      .by_name("src")
      .ok_or(GStreamerInputError::SourceNotFound)?
      .set_property("location", self.location.as_str());

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    // 先构造迭代器，之后任何失败都会经由 Drop 释放管道
    let frames = GStreamerFrames {
      pipeline,
      appsink,
      index: 0,
      finished: false,
    };
    frames.start(self.open_timeout)?;

    info!("视频已打开: {}", self.location);
    Ok(frames)
  }
}

/// 逐帧产出的 GStreamer 解码迭代器
///
/// 视频结束、解码出错或迭代器被丢弃时，管道都会被置为 `Null` 状态并释放。
pub struct GStreamerFrames {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  index: u64,
  finished: bool,
}

impl Drop for GStreamerFrames {
  fn drop(&mut self) {
    self.release();
  }
}

impl GStreamerFrames {
  fn start(&self, timeout: Duration) -> Result<(), GStreamerInputError> {
    if let Err(e) = self.pipeline.set_state(gst::State::Playing) {
      return Err(self.open_error(e));
    }

    let (result, _, _) = self
      .pipeline
      .state(gst::ClockTime::from_nseconds(timeout.as_nanos() as u64));
    match result {
      Ok(gst::StateChangeSuccess::Async) => Err(GStreamerInputError::PrerollTimeout(timeout)),
      Ok(_) => Ok(()),
      Err(e) => Err(self.open_error(e)),
    }
  }

  fn open_error(&self, e: gst::StateChangeError) -> GStreamerInputError {
    let reason = self.bus_error().unwrap_or_else(|| e.to_string());
    warn!("无法打开视频: {}", reason);
    GStreamerInputError::OpenFailed(reason)
  }

  fn bus_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(match err.debug() {
        Some(debug) => format!("{} ({})", err.error(), debug),
        None => err.error().to_string(),
      }),
      _ => None,
    }
  }

  fn release(&mut self) {
    self.finished = true;
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl Iterator for GStreamerFrames {
  type Item = VideoFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(_) => {
        if self.appsink.is_eos() {
          debug!("视频结束，共解码 {} 帧", self.index);
        } else if let Some(reason) = self.bus_error() {
          warn!("解码在第 {} 帧中断: {}", self.index, reason);
        }
        self.release();
        return None;
      }
    };

    match convert_sample(sample, self.index) {
      Ok(frame) => {
        self.index += 1;
        Some(frame)
      }
      Err(e) => {
        warn!("无法转换第 {} 帧: {}", self.index, e);
        self.release();
        None
      }
    }
  }
}

/// 按文件路径打开视频的 GStreamer 解码器
#[derive(Debug, Clone)]
pub struct GStreamerDecoder {
  format: PixelOrder,
  open_timeout: Duration,
}

impl Default for GStreamerDecoder {
  fn default() -> Self {
    Self {
      format: PixelOrder::Rgb,
      open_timeout: DEFAULT_OPEN_TIMEOUT,
    }
  }
}

impl GStreamerDecoder {
  pub fn with_format(mut self, format: PixelOrder) -> Self {
    self.format = format;
    self
  }

  pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
    self.open_timeout = timeout;
    self
  }
}

impl VideoDecoder for GStreamerDecoder {
  type Frames = GStreamerFrames;

  fn decode(&self, path: &Path) -> Result<Self::Frames, InputError> {
    if !path.is_file() {
      return Err(InputError::NotFound(path.display().to_string()));
    }

    let frames = GStreamerInputPipelineBuilder::file(path.to_string_lossy())
      .target_format(self.format)
      .open_timeout(self.open_timeout)
      .build()?;
    Ok(frames)
  }
}

fn convert_sample(sample: gst::Sample, index: u64) -> Result<VideoFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let order = match video_info.format() {
    gst_video::VideoFormat::Rgb => PixelOrder::Rgb,
    gst_video::VideoFormat::Bgr => PixelOrder::Bgr,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width as usize * RGB_CHANNELS;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  // 最后一行可能没有行尾填充
  let expected_size = stride * (height as usize).saturating_sub(1) + row_bytes;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height as usize);
  for y in 0..height as usize {
    let row_start = y * stride;
    pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
  }

  Ok(VideoFrame::new(pixels, width, height, order, index)?)
}
