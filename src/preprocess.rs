// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/preprocess.rs - 图像预处理与几何记录
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

use fast_image_resize::{
  FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  context::TargetSize,
  frame::{BGR_CHANNELS, BgrFrame, ToRgbImage},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("输入图像为空: {rows}x{cols}")]
  EmptyImage { rows: usize, cols: usize },
  #[error("输入图像通道数必须为 3, 实际为 {0}")]
  ChannelMismatch(usize),
  #[error("目标尺寸无效: {0}x{1}")]
  InvalidTargetSize(u32, u32),
  #[error("图像缩放失败: {0}")]
  Resize(String),
}

/// 双线性插值缩放 RGB 交错数据，缩小时不放宽卷积核（与 OpenCV INTER_LINEAR 一致）
fn resize_bilinear(
  rgb: Vec<u8>,
  width: u32,
  height: u32,
  target: TargetSize,
) -> Result<Vec<u8>, PreprocessError> {
  let src = Image::from_vec_u8(width, height, rgb, PixelType::U8x3)
    .map_err(|e| PreprocessError::Resize(e.to_string()))?;
  let mut dst = Image::new(target.width, target.height, PixelType::U8x3);

  let options =
    ResizeOptions::new().resize_alg(ResizeAlg::Interpolation(FilterType::Bilinear));
  Resizer::new()
    .resize(&src, &mut dst, Some(&options))
    .map_err(|e| PreprocessError::Resize(e.to_string()))?;

  Ok(dst.into_vec())
}

/// 缩放比例，按 (高, 宽) 顺序存储
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
  /// target_height / original_rows
  pub y: f32,
  /// target_width / original_cols
  pub x: f32,
}

impl ScaleFactor {
  /// 模型侧输入 `scale_factor` 的布局: [y, x]
  pub fn to_array(self) -> [f32; 2] {
    [self.y, self.x]
  }
}

/// 单次调用的几何信息，每次预处理都会重新计算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
  /// 原图 (rows, cols)
  pub original_shape: (usize, usize),
  pub scale_factor: ScaleFactor,
}

impl FrameGeometry {
  pub fn new(original_rows: usize, original_cols: usize, target: TargetSize) -> Self {
    Self {
      original_shape: (original_rows, original_cols),
      scale_factor: ScaleFactor {
        y: target.height as f32 / original_rows as f32,
        x: target.width as f32 / original_cols as f32,
      },
    }
  }
}

/// 归一化后的 RGB 交错浮点图像 (H, W, C)，取值 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl NormalizedImage {
  pub fn from_raw(height: usize, width: usize, data: Vec<f32>) -> Option<Self> {
    (data.len() == height * width * BGR_CHANNELS).then(|| Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn channels(&self) -> usize {
    BGR_CHANNELS
  }

  pub fn as_hwc(&self) -> &[f32] {
    &self.data
  }

  /// (h, w) 处通道 c 的值
  pub fn at(&self, h: usize, w: usize, c: usize) -> f32 {
    self.data[(h * self.width + w) * BGR_CHANNELS + c]
  }
}

/// 预处理结果
#[derive(Debug, Clone)]
pub struct Preprocessed {
  pub image: NormalizedImage,
  pub geometry: FrameGeometry,
}

/// BGR → RGB，双线性缩放到目标尺寸，逐通道除以 255。
///
/// 不保持宽高比，不裁剪；输出尺寸严格等于 `target`。
pub fn preprocess(frame: &BgrFrame, target: TargetSize) -> Result<Preprocessed, PreprocessError> {
  if frame.rows() == 0 || frame.cols() == 0 || frame.is_empty() {
    return Err(PreprocessError::EmptyImage {
      rows: frame.rows(),
      cols: frame.cols(),
    });
  }
  if frame.channels() != BGR_CHANNELS {
    return Err(PreprocessError::ChannelMismatch(frame.channels()));
  }
  if target.width == 0 || target.height == 0 {
    return Err(PreprocessError::InvalidTargetSize(
      target.width,
      target.height,
    ));
  }

  let geometry = FrameGeometry::new(frame.rows(), frame.cols(), target);
  debug!(
    "预处理: 原图 {}x{}, 缩放比例 (y={}, x={})",
    frame.rows(),
    frame.cols(),
    geometry.scale_factor.y,
    geometry.scale_factor.x
  );

  let rgb = frame.to_rgb_image();
  let (width, height) = rgb.dimensions();
  let resized = resize_bilinear(rgb.into_raw(), width, height, target)?;

  let scale = 1.0f32 / 255.0;
  let data: Vec<f32> = resized
    .into_iter()
    .map(|v| v as f32 * scale)
    .collect();

  let image = NormalizedImage {
    width: target.width as usize,
    height: target.height as usize,
    data: data.into_boxed_slice(),
  };

  Ok(Preprocessed { image, geometry })
}
