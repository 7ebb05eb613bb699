// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/model/decode.rs - RT-DETR 输出解码
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
use tracing::debug;

use crate::{
  context::DetectionContext,
  model::{BBox, Detection, DetectionSet},
  preprocess::FrameGeometry,
  utils::{argmax, sigmoid},
};

/// 每张图固定输出的候选框数量
pub const CANDIDATE_SLOTS: usize = 300;
/// COCO 类别数
pub const COCO_CLASS_NUM: usize = 80;
/// 融合模式每条记录: [class_id, score, x1, y1, x2, y2]
pub const FUSED_RECORD_LEN: usize = 6;
/// 原始模式每个框: [cx, cy, w, h]
pub const BOX_PARAM_NUM: usize = 4;

pub const FUSED_OUTPUT_LEN: usize = CANDIDATE_SLOTS * FUSED_RECORD_LEN;
pub const RAW_LOGITS_LEN: usize = CANDIDATE_SLOTS * COCO_CLASS_NUM;
pub const RAW_BOXES_LEN: usize = CANDIDATE_SLOTS * BOX_PARAM_NUM;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("{name} 缓冲区长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  BufferLength {
    name: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("未知类别编号 {class_id}（标签表共 {labels} 项）")]
  UnknownClass { class_id: i64, labels: usize },
}

/// 解码方式，由模型是否带后处理层决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
  /// 模型内置后处理层，输出已解码的 (class, score, box)
  #[default]
  Fused,
  /// 模型输出类别 logits 与归一化 (cx, cy, w, h)
  Raw,
}

/// 每种解码方式恰好携带它需要的数据
#[derive(Debug, Clone, Copy)]
pub enum ModelOutput<'a> {
  Fused {
    records: &'a [f32],
  },
  Raw {
    logits: &'a [f32],
    boxes: &'a [f32],
    geometry: FrameGeometry,
  },
}

impl ModelOutput<'_> {
  pub fn mode(&self) -> DecodeMode {
    match self {
      ModelOutput::Fused { .. } => DecodeMode::Fused,
      ModelOutput::Raw { .. } => DecodeMode::Raw,
    }
  }
}

fn check_len(name: &'static str, buffer: &[f32], expected: usize) -> Result<(), DecodeError> {
  if buffer.len() != expected {
    return Err(DecodeError::BufferLength {
      name,
      expected,
      actual: buffer.len(),
    });
  }
  Ok(())
}

fn lookup(ctx: &DetectionContext, class_id: i64) -> Result<(usize, std::sync::Arc<str>), DecodeError> {
  usize::try_from(class_id)
    .ok()
    .and_then(|id| ctx.label(id).map(|label| (id, label.clone())))
    .ok_or(DecodeError::UnknownClass {
      class_id,
      labels: ctx.labels().len(),
    })
}

/// 融合输出中的类别编号为浮点数，向零截断；非有限值记为 -1，查找时报错
fn fused_class_id(value: f32) -> i64 {
  if value.is_finite() { value as i64 } else { -1 }
}

/// 把模型原始输出解码为检测结果。
///
/// 两种方式都恰好扫描 [`CANDIDATE_SLOTS`] 个候选，只保留
/// `score > confidence_threshold` 的结果，顺序即扫描顺序。
pub fn decode(output: ModelOutput<'_>, ctx: &DetectionContext) -> Result<DetectionSet, DecodeError> {
  let items = match output {
    ModelOutput::Fused { records } => decode_fused(records, ctx)?,
    ModelOutput::Raw {
      logits,
      boxes,
      geometry,
    } => decode_raw(logits, boxes, &geometry, ctx)?,
  };
  debug!("检测到 {} 个物体", items.len());
  Ok(DetectionSet::from(items))
}

fn decode_fused(records: &[f32], ctx: &DetectionContext) -> Result<Vec<Detection>, DecodeError> {
  check_len("fused", records, FUSED_OUTPUT_LEN)?;

  let threshold = ctx.confidence_threshold();
  let mut items = Vec::new();
  for record in records.chunks_exact(FUSED_RECORD_LEN) {
    let score = record[1];
    // NaN 与任何阈值比较都为假，必须丢弃
    if !(score > threshold) {
      continue;
    }

    let (class_id, label) = lookup(ctx, fused_class_id(record[0]))?;
    let (x1, y1, x2, y2) = (record[2], record[3], record[4], record[5]);
    items.push(Detection {
      class_id,
      label,
      score,
      // 引擎已经换算回原图像素坐标
      bbox: BBox::new(x1 as i32, y1 as i32, (x2 - x1) as i32, (y2 - y1) as i32),
    });
  }
  Ok(items)
}

fn decode_raw(
  logits: &[f32],
  boxes: &[f32],
  geometry: &FrameGeometry,
  ctx: &DetectionContext,
) -> Result<Vec<Detection>, DecodeError> {
  check_len("logits", logits, RAW_LOGITS_LEN)?;
  check_len("boxes", boxes, RAW_BOXES_LEN)?;

  let threshold = ctx.confidence_threshold();
  let target = ctx.target_size();
  let (size_x, size_y) = (target.width as f32, target.height as f32);
  // scale_factor 按 (高, 宽) 存储：x 相关项除以 x 比例，y 相关项除以 y 比例
  let (sy, sx) = (geometry.scale_factor.y, geometry.scale_factor.x);

  let mut items = Vec::new();
  for (class_logits, bbox) in logits
    .chunks_exact(COCO_CLASS_NUM)
    .zip(boxes.chunks_exact(BOX_PARAM_NUM))
  {
    let Some(class_idx) = argmax(class_logits) else {
      continue;
    };
    let score = sigmoid(class_logits[class_idx]);
    if !(score > threshold) {
      continue;
    }

    let (class_id, label) = lookup(ctx, class_idx as i64)?;
    let cx = bbox[0] * size_x / sx;
    let cy = bbox[1] * size_y / sy;
    let w = bbox[2] * size_x / sx;
    let h = bbox[3] * size_y / sy;
    items.push(Detection {
      class_id,
      label,
      score,
      bbox: BBox::new(
        (cx - w / 2.0) as i32,
        (cy - h / 2.0) as i32,
        w as i32,
        h as i32,
      ),
    });
  }
  Ok(items)
}
