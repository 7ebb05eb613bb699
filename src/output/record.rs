// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/output/record.rs - 检测结果记录
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

use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::model::DetectionSet;

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

pub fn to_json(detections: &DetectionSet) -> Value {
  Value::Array(
    detections
      .iter()
      .map(|d| {
        json!({
          "class_id": d.class_id,
          "label": &*d.label,
          "score": d.score,
          "bbox": [d.bbox.x, d.bbox.y, d.bbox.width, d.bbox.height],
        })
      })
      .collect(),
  )
}

/// 将检测结果按扫描顺序写为 JSON 数组
pub fn write_records(path: impl AsRef<Path>, detections: &DetectionSet) -> Result<(), RecordError> {
  let path = path.as_ref();
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let content = serde_json::to_string_pretty(&to_json(detections))?;
  std::fs::write(path, content)?;
  info!("保存 {} 条检测记录到: {}", detections.len(), path.display());

  Ok(())
}
