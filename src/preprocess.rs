// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/preprocess.rs - 帧预处理：缩放与 ImageNet 归一化
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

use image::{RgbImage, imageops::FilterType};

use crate::frame::{NormalizedNchwFrame, RGB_CHANNELS, VideoFrame};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 将解码帧转换为分类器输入：转 RGB、缩放到 W×H、缩放到 [0, 1]、按通道归一化
#[derive(Debug, Clone)]
pub struct Preprocessor<const W: u32, const H: u32> {
  mean: [f32; 3],
  std: [f32; 3],
  filter: FilterType,
}

impl<const W: u32, const H: u32> Default for Preprocessor<W, H> {
  fn default() -> Self {
    Self::imagenet()
  }
}

impl<const W: u32, const H: u32> Preprocessor<W, H> {
  pub fn imagenet() -> Self {
    Self {
      mean: IMAGENET_MEAN,
      std: IMAGENET_STD,
      filter: FilterType::Triangle,
    }
  }

  pub fn run(&self, frame: &VideoFrame) -> NormalizedNchwFrame<W, H> {
    let rgb = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
      image::Rgb(frame.rgb_at(x, y))
    });

    let resized = if rgb.dimensions() == (W, H) {
      rgb
    } else {
      image::imageops::resize(&rgb, W, H, self.filter)
    };

    let mut output = NormalizedNchwFrame::<W, H>::default();
    let plane = (W as usize) * (H as usize);
    let slice = output.as_mut();

    for (x, y, pixel) in resized.enumerate_pixels() {
      let offset = y as usize * W as usize + x as usize;
      for c in 0..RGB_CHANNELS {
        let value = pixel[c] as f32 / 255.0;
        slice[c * plane + offset] = (value - self.mean[c]) / self.std[c];
      }
    }

    output
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::{AsNchwFrame, PixelOrder};

  fn solid(width: u32, height: u32, pixel: [u8; 3], order: PixelOrder) -> VideoFrame {
    let data = pixel.repeat((width * height) as usize);
    VideoFrame::new(data, width, height, order, 0).unwrap()
  }

  #[test]
  fn output_has_fixed_shape() {
    let pp = Preprocessor::<224, 224>::imagenet();
    let out = pp.run(&solid(640, 480, [128, 128, 128], PixelOrder::Rgb));
    assert_eq!(out.shape(), [3, 224, 224]);
    assert_eq!(out.as_nchw().len(), 3 * 224 * 224);
  }

  #[test]
  fn output_is_deterministic() {
    let data: Vec<u8> = (0..(37 * 23 * 3)).map(|i| (i * 7 % 256) as u8).collect();
    let frame = VideoFrame::new(data, 37, 23, PixelOrder::Rgb, 0).unwrap();
    let pp = Preprocessor::<224, 224>::imagenet();
    assert_eq!(pp.run(&frame), pp.run(&frame));
  }

  #[test]
  fn applies_imagenet_normalization_per_channel() {
    let pp = Preprocessor::<224, 224>::imagenet();
    let out = pp.run(&solid(224, 224, [255, 0, 255], PixelOrder::Rgb));
    let plane = 224 * 224;
    let data = out.as_nchw();

    let expected = [
      (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0],
      (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1],
      (1.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2],
    ];
    for c in 0..3 {
      for value in &data[c * plane..(c + 1) * plane] {
        assert!((value - expected[c]).abs() < 1e-5, "channel {c}: {value}");
      }
    }
  }

  #[test]
  fn bgr_input_matches_rgb_input() {
    let pp = Preprocessor::<224, 224>::imagenet();
    let rgb = pp.run(&solid(320, 240, [200, 100, 50], PixelOrder::Rgb));
    let bgr = pp.run(&solid(320, 240, [50, 100, 200], PixelOrder::Bgr));
    assert_eq!(rgb, bgr);
  }
}
