// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/frame.rs - BGR 交错帧定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

pub const BGR_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 8 位 BGR 交错图像 (H, W, C)，与常见图像加载库的内存布局一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrFrame {
  rows: usize,
  cols: usize,
  channels: usize,
  data: Box<[u8]>,
}

impl BgrFrame {
  /// 以任意通道数构造帧；通道数在预处理时校验
  pub fn from_raw(
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let expected = rows * cols * channels;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      rows,
      cols,
      channels,
      data: data.into_boxed_slice(),
    })
  }

  pub fn with_shape(rows: usize, cols: usize) -> Self {
    Self {
      rows,
      cols,
      channels: BGR_CHANNELS,
      data: vec![0u8; rows * cols * BGR_CHANNELS].into_boxed_slice(),
    }
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// (row, col) 处的 BGR 像素
  pub fn pixel(&self, row: usize, col: usize) -> [u8; 3] {
    let idx = (row * self.cols + col) * self.channels;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }
}

impl AsMut<[u8]> for BgrFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

pub trait FromRgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self;
}

impl ToRgbImage for BgrFrame {
  fn to_rgb_image(&self) -> RgbImage {
    let width = self.cols as u32;
    let height = self.rows as u32;

    // BGR 交错 → RGB 图像
    ImageBuffer::from_fn(width, height, |x, y| {
      let [b, g, r] = self.pixel(y as usize, x as usize);
      Rgb([r, g, b])
    })
  }
}

impl FromRgbImage for BgrFrame {
  fn from_rgb_image(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut frame = BgrFrame::with_shape(height as usize, width as usize);
    let slice = frame.as_mut();

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = ((y * width + x) as usize) * BGR_CHANNELS;
      slice[idx] = pixel[2];
      slice[idx + 1] = pixel[1];
      slice[idx + 2] = pixel[0];
    }
    frame
  }
}

impl From<RgbImage> for BgrFrame {
  fn from(image: RgbImage) -> Self {
    BgrFrame::from_rgb_image(&image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_raw_rejects_wrong_length() {
    let err = BgrFrame::from_raw(2, 2, 3, vec![0; 11]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    );
  }

  #[test]
  fn rgb_conversion_swaps_channel_order() {
    let image = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
    let frame = BgrFrame::from(image.clone());

    assert_eq!(frame.rows(), 2);
    assert_eq!(frame.cols(), 3);
    assert_eq!(frame.pixel(1, 2), [30, 20, 10]);
    assert_eq!(frame.to_rgb_image(), image);
  }
}
