// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/aggregate.rs - 逐帧分数聚合与判定
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

use serde::{Deserialize, Serialize};

pub const DEFAULT_FAKE_THRESHOLD: f64 = 0.5;

/// 整段视频的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
  Fake,
  Real,
}

impl std::fmt::Display for Verdict {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Verdict::Fake => f.write_str("FAKE"),
      Verdict::Real => f.write_str("REAL"),
    }
  }
}

/// 没有任何帧被打分时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EmptyScorePolicy {
  /// 平均分按 0 计，判定为 REAL
  #[default]
  AssumeReal,
  /// 作为错误返回
  Reject,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
  /// 平均伪造概率，无帧时为 0
  pub mean: f64,
  /// 参与打分的帧数
  pub frames: usize,
  pub verdict: Verdict,
}

/// 求平均伪造概率，严格大于阈值时判为 FAKE
#[derive(Debug, Clone, Copy)]
pub struct ScoreAggregator {
  threshold: f64,
}

impl Default for ScoreAggregator {
  fn default() -> Self {
    Self::new(DEFAULT_FAKE_THRESHOLD)
  }
}

impl ScoreAggregator {
  pub fn new(threshold: f64) -> Self {
    Self { threshold }
  }

  pub fn threshold(&self) -> f64 {
    self.threshold
  }

  pub fn aggregate(&self, scores: &[f32]) -> Aggregate {
    let mean = if scores.is_empty() {
      0.0
    } else {
      scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64
    };

    let verdict = if mean > self.threshold {
      Verdict::Fake
    } else {
      Verdict::Real
    };

    Aggregate {
      mean,
      frames: scores.len(),
      verdict,
    }
  }
}
