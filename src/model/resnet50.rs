// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/model/resnet50.rs - ResNet-50 深度伪造分类模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Dropout, Func, Linear, ModuleT, VarBuilder};
use candle_transformers::models::resnet;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNchwFrame, RGB_CHANNELS},
  model::{ClassProbabilities, DeviceKind, Model},
};

pub const RESNET50_INPUT_W: u32 = 224;
pub const RESNET50_INPUT_H: u32 = 224;
const RESNET50_FEATURES: usize = 2048;
const RESNET50_CLASS_NUM: usize = 2;
const RESNET50_DROPOUT: f32 = 0.5;
const RESNET50_DEFAULT_PREFIX: &str = "model";

/// ResNet-50 主干 + Dropout + 2 类线性头
///
/// 权重布局与训练时的 PyTorch 模块一致：主干位于 `model.`，
/// 分类头位于 `model.fc.1`（`fc` 为 `Sequential(Dropout, Linear)`）。
pub struct DeepfakeResNet50<Frame> {
  backbone: Func<'static>,
  dropout: Dropout,
  head: Linear,
  device: Device,
  _phantom: std::marker::PhantomData<Frame>,
}

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("不支持的权重格式: {0}")]
  UnsupportedFormat(String),
  #[error("Candle 错误: {0}")]
  CandleError(#[from] candle_core::Error),
  #[error("模型输出无效: 期望 {expected} 个类别, 实际形状 {actual:?}")]
  InvalidOutput { expected: usize, actual: Vec<usize> },
}

pub struct ResNet50Builder {
  weights: PathBuf,
  prefix: String,
  device: DeviceKind,
}

impl FromUrlWithScheme for ResNet50Builder {
  const SCHEME: &'static str = "resnet50";
}

impl FromUrl for ResNet50Builder {
  type Error = ClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassifierError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| ClassifierError::ModelPathError(format!("{}: {}", url.path(), e)))?;
    if path.is_empty() {
      return Err(ClassifierError::ModelPathError(format!(
        "模型地址缺少文件路径: {}",
        url
      )));
    }

    let prefix = url
      .query_pairs()
      .find(|(k, _)| k == "prefix")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| RESNET50_DEFAULT_PREFIX.to_string());

    Ok(ResNet50Builder {
      weights: PathBuf::from(path.into_owned()),
      prefix,
      device: DeviceKind::default(),
    })
  }
}

impl ResNet50Builder {
  pub fn new(weights: impl Into<PathBuf>) -> Self {
    Self {
      weights: weights.into(),
      prefix: RESNET50_DEFAULT_PREFIX.to_string(),
      device: DeviceKind::default(),
    }
  }

  pub fn device(mut self, device: DeviceKind) -> Self {
    self.device = device;
    self
  }

  /// 权重张量名前缀，空字符串表示没有外层包装
  pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into();
    self
  }

  pub fn weights(&self) -> &std::path::Path {
    &self.weights
  }

  pub fn build<Frame>(self) -> Result<DeepfakeResNet50<Frame>, ClassifierError> {
    if !self.weights.is_file() {
      return Err(ClassifierError::ModelNotFound(self.weights));
    }

    let device = self.device.create()?;
    info!("推理设备: {:?}", device);

    info!("加载模型文件: {}", self.weights.display());
    let extension = self
      .weights
      .extension()
      .and_then(|e| e.to_str())
      .unwrap_or("")
      .to_lowercase();
    let vb = match extension.as_str() {
      "safetensors" => unsafe {
        VarBuilder::from_mmaped_safetensors(&[&self.weights], DType::F32, &device)?
      },
      "pth" | "pt" | "bin" => VarBuilder::from_pth(&self.weights, DType::F32, &device)?,
      other => return Err(ClassifierError::UnsupportedFormat(other.to_string())),
    };

    let vb = if self.prefix.is_empty() {
      vb
    } else {
      vb.pp(&self.prefix)
    };
    let model = DeepfakeResNet50::load(vb, device)?;
    info!("模型加载完成");

    Ok(model)
  }
}

impl<Frame> DeepfakeResNet50<Frame> {
  /// 从变量表构建模型，张量名相对于 `vb` 的当前前缀
  pub fn load(vb: VarBuilder<'static>, device: Device) -> Result<Self, ClassifierError> {
    let backbone = resnet::resnet50_no_final_layer(vb.clone())?;
    let head = candle_nn::linear(RESNET50_FEATURES, RESNET50_CLASS_NUM, vb.pp("fc").pp("1"))?;
    debug!(
      "分类头: {} -> {}, dropout {}",
      RESNET50_FEATURES, RESNET50_CLASS_NUM, RESNET50_DROPOUT
    );

    Ok(Self {
      backbone,
      dropout: Dropout::new(RESNET50_DROPOUT),
      head,
      device,
      _phantom: std::marker::PhantomData,
    })
  }

  fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
    let features = xs.apply(&self.backbone)?;
    // 推理阶段 dropout 不生效
    let features = self.dropout.forward_t(&features, false)?;
    let logits = features.apply(&self.head)?;
    candle_nn::ops::softmax(&logits, D::Minus1)
  }
}

impl<Frame: AsNchwFrame<RESNET50_INPUT_W, RESNET50_INPUT_H>> Model for DeepfakeResNet50<Frame> {
  type Input = Frame;
  type Output = ClassProbabilities;
  type Error = ClassifierError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let input = Tensor::from_slice(
      input.as_nchw(),
      (
        1,
        RGB_CHANNELS,
        RESNET50_INPUT_H as usize,
        RESNET50_INPUT_W as usize,
      ),
      &self.device,
    )?;

    let probs = self.forward(&input)?;
    let shape = probs.dims().to_vec();
    let probs: Vec<Vec<f32>> = probs.to_dtype(DType::F32)?.to_vec2()?;

    let result = probs
      .first()
      .and_then(|row| ClassProbabilities::from_softmax(row))
      .ok_or(ClassifierError::InvalidOutput {
        expected: RESNET50_CLASS_NUM,
        actual: shape,
      })?;
    debug!("推理结果: fake={:.4}, real={:.4}", result.fake, result.real);

    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::NormalizedNchwFrame;

  #[test]
  fn builder_from_url_decodes_path() {
    let url = Url::parse("resnet50:///srv/models/best%20model.pth").unwrap();
    let builder = ResNet50Builder::from_url(&url).unwrap();
    assert_eq!(builder.weights(), std::path::Path::new("/srv/models/best model.pth"));
    assert_eq!(builder.prefix, "model");
  }

  #[test]
  fn builder_from_url_reads_prefix() {
    let url = Url::parse("resnet50:///srv/models/resnet.safetensors?prefix=").unwrap();
    let builder = ResNet50Builder::from_url(&url).unwrap();
    assert_eq!(builder.prefix, "");
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("file:///srv/models/best.pth").unwrap();
    assert!(matches!(
      ResNet50Builder::from_url(&url),
      Err(ClassifierError::ModelPathError(_))
    ));
  }

  #[test]
  fn missing_weights_are_fatal() {
    let result = ResNet50Builder::new("/nonexistent/best_deepfake_model.pth")
      .device(DeviceKind::Cpu)
      .build::<NormalizedNchwFrame<224, 224>>();
    assert!(matches!(result, Err(ClassifierError::ModelNotFound(_))));
  }

  #[test]
  fn unsupported_weight_format_is_fatal() {
    let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
    let result = ResNet50Builder::new(file.path())
      .device(DeviceKind::Cpu)
      .build::<NormalizedNchwFrame<224, 224>>();
    assert!(matches!(result, Err(ClassifierError::UnsupportedFormat(_))));
  }

  #[test]
  fn zero_weights_give_uniform_distribution() {
    let device = Device::Cpu;
    let vb = VarBuilder::zeros(DType::F32, &device);
    let model = DeepfakeResNet50::<NormalizedNchwFrame<224, 224>>::load(vb, device).unwrap();

    let probs = model.infer(&NormalizedNchwFrame::default()).unwrap();
    assert!((probs.fake + probs.real - 1.0).abs() < 1e-5);
    assert!((probs.fake_score() - 0.5).abs() < 1e-5);
  }
}
