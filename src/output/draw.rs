// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  frame::{BgrFrame, ToRgbImage},
  model::{BBox, Detection, DetectionSet},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_TEXT_HEIGHT: u32 = 14;
const LABEL_CHAR_WIDTH: f32 = 7.0; // 无字体时每字符平均宽度（粗略估计）
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const LABEL_BACKGROUND: [u8; 3] = [0, 0, 0];
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];

const SYSTEM_FONT_PATHS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件 {0}: {1}")]
  FontIo(String, std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

/// 检测结果绘制器
pub struct Draw {
  font: Option<FontVec>,
  font_scale: PxScale,
  box_color: Rgb<u8>,
  label_background: Rgb<u8>,
  label_text_color: Rgb<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::with_font(None)
  }
}

impl Draw {
  fn with_font(font: Option<FontVec>) -> Self {
    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      box_color: Rgb(BOX_COLOR),
      label_background: Rgb(LABEL_BACKGROUND),
      label_text_color: Rgb(LABEL_TEXT_COLOR),
    }
  }

  pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data =
      std::fs::read(path).map_err(|e| DrawError::FontIo(path.display().to_string(), e))?;
    let font = FontVec::try_from_vec(data)
      .map_err(|_| DrawError::InvalidFont(path.display().to_string()))?;
    info!("加载字体: {}", path.display());
    Ok(Self::with_font(Some(font)))
  }

  /// 依次尝试常见的系统字体；都不可用时只绘制边框和标签背景
  pub fn with_system_font() -> Self {
    for path in SYSTEM_FONT_PATHS {
      if let Ok(draw) = Self::from_font_file(path) {
        return draw;
      }
    }
    warn!("未找到可用字体, 标签文本将不会绘制");
    Self::default()
  }

  /// 在输入图像的副本上绘制检测结果，不修改输入
  pub fn draw(&self, image: &RgbImage, detections: &DetectionSet) -> RgbImage {
    let mut canvas = image.clone();
    self.draw_detections_on_image(&mut canvas, detections);
    canvas
  }

  pub fn draw_frame(&self, frame: &BgrFrame, detections: &DetectionSet) -> RgbImage {
    let mut canvas = frame.to_rgb_image();
    self.draw_detections_on_image(&mut canvas, detections);
    canvas
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, detections: &DetectionSet) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection);
    }
  }

  fn text_extent(&self, text: &str) -> (u32, u32) {
    match &self.font {
      Some(font) => text_size(self.font_scale, font, text),
      None => (
        (text.chars().count() as f32 * LABEL_CHAR_WIDTH) as u32,
        LABEL_TEXT_HEIGHT,
      ),
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let BBox {
      x,
      y,
      width,
      height,
    } = detection.bbox;

    if width > 0 && height > 0 {
      let rect = Rect::at(x, y).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, self.box_color);
    }

    let label = label_text(&detection.label, detection.score);
    let (text_w, text_h) = self.text_extent(&label);
    if text_w == 0 || text_h == 0 {
      return;
    }

    // 标签背景紧贴边框左上角上方
    let label_y = y - text_h as i32;
    let background = Rect::at(x, label_y).of_size(text_w, text_h);
    draw_filled_rect_mut(image, background, self.label_background);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        self.label_text_color,
        x,
        label_y,
        self.font_scale,
        font,
        &label,
      );
    }
  }
}

/// 分数截断（不四舍五入）到 3 位小数
pub fn score_text(score: f32) -> String {
  let mut text = format!("{:.6}", score);
  if let Some(dot) = text.find('.') {
    text.truncate((dot + 4).min(text.len()));
  }
  text
}

/// `"<label>  <score>"`
pub fn label_text(label: &str, score: f32) -> String {
  format!("{}  {}", label, score_text(score))
}
