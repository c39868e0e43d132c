// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/frame.rs - 解码帧与 NCHW 张量帧定义
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

use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

/// 模型输入的 NCHW 视图
pub trait AsNchwFrame<const W: u32, const H: u32> {
  fn as_nchw(&self) -> &[f32];
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("帧尺寸无效: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
}

/// 解码器输出的通道顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PixelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl PixelOrder {
  /// 该顺序下 R、G、B 分量在像素内的偏移
  pub fn rgb_offsets(self) -> [usize; RGB_CHANNELS] {
    match self {
      PixelOrder::Rgb => [0, 1, 2],
      PixelOrder::Bgr => [2, 1, 0],
    }
  }
}

/// 一帧解码后的图像（HWC，行优先，无行填充）
#[derive(Debug, Clone)]
pub struct VideoFrame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  order: PixelOrder,
  index: u64,
}

impl VideoFrame {
  pub fn new(
    data: Vec<u8>,
    width: u32,
    height: u32,
    order: PixelOrder,
    index: u64,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyFrame { width, height });
    }

    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
      order,
      index,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn order(&self) -> PixelOrder {
    self.order
  }

  /// 解码顺序中的帧序号
  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn as_hwc(&self) -> &[u8] {
    &self.data
  }

  /// 按 RGB 顺序读取像素
  pub fn rgb_at(&self, x: u32, y: u32) -> [u8; RGB_CHANNELS] {
    let base = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    let [r, g, b] = self.order.rgb_offsets();
    [
      self.data[base + r],
      self.data[base + g],
      self.data[base + b],
    ]
  }
}

/// 归一化后的 RGB NCHW 浮点帧，批大小为 1
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedNchwFrame<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> Default for NormalizedNchwFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0f32; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> NormalizedNchwFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 不含批维度的形状 [C, H, W]
  pub fn shape(&self) -> [usize; 3] {
    [RGB_CHANNELS, H as usize, W as usize]
  }
}

impl<const W: u32, const H: u32> AsMut<[f32]> for NormalizedNchwFrame<W, H> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsNchwFrame<W, H> for NormalizedNchwFrame<W, H> {
  fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}
