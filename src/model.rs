// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/model.rs - 模型
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

use std::sync::Arc;

use crate::metrics::MetricsSink;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer<S: MetricsSink>(
    &mut self,
    input: &Self::Input,
    metrics: &mut S,
  ) -> Result<Self::Output, Self::Error>;
}

/// 推理引擎的输入/输出张量（32 位浮点）
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTensor {
  pub name: String,
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

impl EngineTensor {
  pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self {
      name: name.into(),
      shape,
      data,
    }
  }
}

/// 外部推理引擎：给定填好的输入张量，返回命名输出张量
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 模型输入名，按模型声明顺序
  fn input_names(&self) -> &[String];

  /// 执行一次前向推理；输入缓冲区的所有权交给引擎
  fn run(&mut self, inputs: Vec<EngineTensor>) -> Result<Vec<EngineTensor>, Self::Error>;
}

/// 原图像素坐标下的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BBox {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn right(&self) -> i32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> i32 {
    self.y + self.height
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: usize,
  pub label: Arc<str>,
  pub score: f32,
  pub bbox: BBox,
}

/// 按解码扫描顺序排列的检测结果，不排序、不做 NMS
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
  pub items: Box<[Detection]>,
}

impl DetectionSet {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectionSet {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a DetectionSet {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

pub mod decode;
pub use self::decode::{DecodeError, DecodeMode, ModelOutput, decode};

mod rtdetr;
pub use self::rtdetr::{RtDetr, RtDetrError};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{Device, OnnxEngine, OnnxEngineBuilder, OnnxEngineError};
