// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/tensor.rs - 张量数据填充（HWC → NCHW）
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

use crate::preprocess::NormalizedImage;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量形状 {shape:?} 与图像 {height}x{width}x{channels} 不匹配")]
  ShapeMismatch {
    shape: [usize; 4],
    height: usize,
    width: usize,
    channels: usize,
  },
  #[error("仅支持 batch = 1, 实际为 {0}")]
  BatchSize(usize),
  #[error("缓冲区长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 把交错存储 (H, W, C) 的图像拷贝到通道优先 (N=1, C, H, W) 的缓冲区。
///
/// `dst[c*H*W + h*W + w] = src[h, w, c]`，只做重排，不改变数值。
pub fn fill_image_tensor(
  dst: &mut [f32],
  shape: [usize; 4],
  src: &NormalizedImage,
) -> Result<(), TensorError> {
  let [batch, channels, height, width] = shape;
  if batch != 1 {
    return Err(TensorError::BatchSize(batch));
  }
  if channels != src.channels() || height != src.height() || width != src.width() {
    return Err(TensorError::ShapeMismatch {
      shape,
      height: src.height(),
      width: src.width(),
      channels: src.channels(),
    });
  }
  let expected = channels * height * width;
  if dst.len() != expected {
    return Err(TensorError::LengthMismatch {
      expected,
      actual: dst.len(),
    });
  }

  let plane = height * width;
  let hwc = src.as_hwc();
  for (pixel_idx, pixel) in hwc.chunks_exact(channels).enumerate() {
    for (c, &value) in pixel.iter().enumerate() {
      dst[c * plane + pixel_idx] = value;
    }
  }
  Ok(())
}

/// 逐元素拷贝 `count` 个值（`im_shape`、`scale_factor` 等辅助输入）
pub fn fill_vector_tensor(dst: &mut [f32], src: &[f32], count: usize) -> Result<(), TensorError> {
  if src.len() < count {
    return Err(TensorError::LengthMismatch {
      expected: count,
      actual: src.len(),
    });
  }
  if dst.len() < count {
    return Err(TensorError::LengthMismatch {
      expected: count,
      actual: dst.len(),
    });
  }
  dst[..count].copy_from_slice(&src[..count]);
  Ok(())
}

/// 拥有所有权的 NCHW 浮点张量，交给推理引擎后即不再使用
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  shape: [usize; 4],
  data: Vec<f32>,
}

impl NchwTensor {
  pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
    Self {
      shape: [1, channels, height, width],
      data: vec![0.0; channels * height * width],
    }
  }

  pub fn from_image(image: &NormalizedImage) -> Result<Self, TensorError> {
    let mut tensor = Self::zeros(image.channels(), image.height(), image.width());
    fill_image_tensor(&mut tensor.data, tensor.shape, image)?;
    Ok(tensor)
  }

  pub fn shape(&self) -> [usize; 4] {
    self.shape
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 通道 c 的平面数据
  #[cfg(test)]
  fn plane(&self, c: usize) -> &[f32] {
    let plane = self.shape[2] * self.shape[3];
    &self.data[c * plane..(c + 1) * plane]
  }

  pub fn into_parts(self) -> ([usize; 4], Vec<f32>) {
    (self.shape, self.data)
  }
}
