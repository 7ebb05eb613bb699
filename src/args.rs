// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  context::{DEFAULT_CONFIDENCE_THRESHOLD, DetectionContext, TargetSize},
  model::DecodeMode,
  output::draw::Draw,
};

/// 各个可执行程序共用的流水线参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 模型路径，例如 rtdetr:///models/rtdetr_r50vd_6x_coco.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像，例如 image:///data/000000014439.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出图像，例如 image:///data/result.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 标签文件，每行一个类别名
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 模型已包含后处理层（输出 [类别, 置信度, x1, y1, x2, y2]）
  #[arg(long)]
  pub fused: bool,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 推理设备
  #[cfg(feature = "onnx")]
  #[arg(long, value_enum, default_value_t = crate::model::Device::Cpu)]
  pub device: crate::model::Device,

  /// 算子内线程数，0 表示由运行时决定
  #[arg(long, default_value_t = 0, value_name = "N")]
  pub threads: usize,

  /// 将检测结果以 JSON 格式保存到该文件
  #[arg(long, value_name = "FILE")]
  pub record: Option<PathBuf>,

  /// 标签字体文件，未指定时尝试常见系统字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

impl PipelineArgs {
  pub fn log(&self) {
    info!("模型文件路径: {}", self.model);
    info!("输入来源: {}", self.input);
    info!("输出路径: {}", self.output);
    info!("置信度阈值: {}", self.confidence);
    info!("解码模式: {:?}", self.mode());
  }

  pub fn mode(&self) -> DecodeMode {
    if self.fused {
      DecodeMode::Fused
    } else {
      DecodeMode::Raw
    }
  }

  pub fn context(&self) -> DetectionContext {
    DetectionContext::with_label_file(
      TargetSize::default(),
      self.confidence,
      self.labels.as_deref(),
    )
  }

  pub fn draw(&self) -> anyhow::Result<Draw> {
    match &self.font {
      Some(path) => Ok(Draw::from_font_file(path)?),
      None => Ok(Draw::with_system_font()),
    }
  }
}
