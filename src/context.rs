// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/context.rs - 检测上下文（输入尺寸、阈值、标签表）
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

use std::{path::Path, sync::Arc};

use thiserror::Error;
use tracing::{debug, info, warn};

/// RT-DETR 模型固定输入宽度
pub const TARGET_WIDTH: u32 = 640;
/// RT-DETR 模型固定输入高度
pub const TARGET_HEIGHT: u32 = 640;
/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// 模型输入尺寸 (宽, 高)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
  pub width: u32,
  pub height: u32,
}

impl Default for TargetSize {
  fn default() -> Self {
    Self {
      width: TARGET_WIDTH,
      height: TARGET_HEIGHT,
    }
  }
}

/// 检测上下文，构造后只读
#[derive(Debug, Clone)]
pub struct DetectionContext {
  target_size: TargetSize,
  confidence_threshold: f32,
  labels: Box<[Arc<str>]>,
}

impl Default for DetectionContext {
  fn default() -> Self {
    Self::new(TargetSize::default(), DEFAULT_CONFIDENCE_THRESHOLD, Vec::new())
  }
}

impl DetectionContext {
  pub fn new(target_size: TargetSize, confidence_threshold: f32, labels: Vec<String>) -> Self {
    Self {
      target_size,
      confidence_threshold,
      labels: labels.into_iter().map(Arc::from).collect(),
    }
  }

  /// 从标签文件构造上下文。
  ///
  /// 标签文件缺失或无法读取时不视为致命错误，以空标签表继续运行，
  /// 此后任何类别查找都会失败。
  pub fn with_label_file(
    target_size: TargetSize,
    confidence_threshold: f32,
    label_path: Option<&Path>,
  ) -> Self {
    let labels = match label_path {
      None => {
        warn!("未指定标签文件，使用空标签表");
        Vec::new()
      }
      Some(path) => match read_labels(path) {
        Ok(labels) => labels,
        Err(e) => {
          warn!("{}，使用空标签表", e);
          Vec::new()
        }
      },
    };
    Self::new(target_size, confidence_threshold, labels)
  }

  pub fn target_size(&self) -> TargetSize {
    self.target_size
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn labels(&self) -> &[Arc<str>] {
    &self.labels
  }

  /// 共享的标签字符串
  pub fn label(&self, class_id: usize) -> Option<&Arc<str>> {
    self.labels.get(class_id)
  }
}

/// 逐行读取标签文件，行号即类别编号
pub fn read_labels(path: &Path) -> Result<Vec<String>, LabelError> {
  let content = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
    path: path.display().to_string(),
    source,
  })?;

  let labels: Vec<String> = content
    .lines()
    .map(|line| line.trim_end_matches('\r').to_string())
    .collect();

  info!("加载标签文件: {}", path.display());
  debug!("标签数量: {}", labels.len());
  Ok(labels)
}
