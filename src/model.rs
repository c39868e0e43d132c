// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::str::FromStr;

use candle_core::Device;
use thiserror::Error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

pub const FAKE_CLASS_INDEX: usize = 0;
pub const REAL_CLASS_INDEX: usize = 1;

/// 二分类的 softmax 概率
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
  pub fake: f32,
  pub real: f32,
}

impl ClassProbabilities {
  pub fn from_softmax(probs: &[f32]) -> Option<Self> {
    match probs {
      [fake, real] => Some(Self {
        fake: *fake,
        real: *real,
      }),
      _ => None,
    }
  }

  /// 伪造类（索引 0）的概率
  pub fn fake_score(&self) -> f32 {
    self.fake
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeviceParseError {
  #[error("未知设备: {0}，可选 auto、cpu、cuda[:N]、metal[:N]")]
  Unknown(String),
  #[error("设备序号无效: {0}")]
  InvalidOrdinal(String),
}

/// 推理设备选择
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceKind {
  /// 有 GPU 时使用 GPU，否则使用 CPU
  #[default]
  Auto,
  Cpu,
  Cuda(usize),
  Metal(usize),
}

impl FromStr for DeviceKind {
  type Err = DeviceParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_lowercase();
    let (name, ordinal) = match lower.split_once(':') {
      Some((name, ordinal)) => {
        let ordinal = ordinal
          .parse::<usize>()
          .map_err(|_| DeviceParseError::InvalidOrdinal(s.to_string()))?;
        (name, ordinal)
      }
      None => (lower.as_str(), 0),
    };

    match name {
      "auto" => Ok(DeviceKind::Auto),
      "cpu" => Ok(DeviceKind::Cpu),
      "cuda" | "gpu" => Ok(DeviceKind::Cuda(ordinal)),
      "metal" => Ok(DeviceKind::Metal(ordinal)),
      _ => Err(DeviceParseError::Unknown(s.to_string())),
    }
  }
}

impl DeviceKind {
  pub fn create(self) -> candle_core::Result<Device> {
    match self {
      DeviceKind::Auto => {
        #[cfg(feature = "metal")]
        let device = Device::metal_if_available(0)?;
        #[cfg(not(feature = "metal"))]
        let device = Device::cuda_if_available(0)?;
        Ok(device)
      }
      DeviceKind::Cpu => Ok(Device::Cpu),
      DeviceKind::Cuda(ordinal) => Device::new_cuda(ordinal),
      DeviceKind::Metal(ordinal) => Device::new_metal(ordinal),
    }
  }
}

mod resnet50;
pub use self::resnet50::{ClassifierError, DeepfakeResNet50, ResNet50Builder};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_device_names() {
    assert_eq!("auto".parse(), Ok(DeviceKind::Auto));
    assert_eq!("CPU".parse(), Ok(DeviceKind::Cpu));
    assert_eq!("cuda".parse(), Ok(DeviceKind::Cuda(0)));
    assert_eq!("cuda:1".parse(), Ok(DeviceKind::Cuda(1)));
    assert_eq!("metal:0".parse(), Ok(DeviceKind::Metal(0)));
  }

  #[test]
  fn rejects_bad_device_names() {
    assert!(matches!(
      "tpu".parse::<DeviceKind>(),
      Err(DeviceParseError::Unknown(_))
    ));
    assert!(matches!(
      "cuda:x".parse::<DeviceKind>(),
      Err(DeviceParseError::InvalidOrdinal(_))
    ));
  }

  #[test]
  fn softmax_pair_maps_to_classes() {
    let probs = ClassProbabilities::from_softmax(&[0.8, 0.2]).unwrap();
    assert_eq!(probs.fake_score(), 0.8);
    assert_eq!(probs.real, 0.2);
    assert!(ClassProbabilities::from_softmax(&[1.0]).is_none());
  }

  #[test]
  fn cpu_device_is_always_available() {
    assert!(DeviceKind::Cpu.create().unwrap().is_cpu());
  }
}
