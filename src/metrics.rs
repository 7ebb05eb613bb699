// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/metrics.rs - 阶段耗时统计
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

use std::{
  fmt,
  time::{Duration, Instant},
};

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
  LoadModel,
  Preprocess,
  LoadData,
  Infer,
  Postprocess,
  Render,
}

impl Stage {
  pub const ALL: [Stage; 6] = [
    Stage::LoadModel,
    Stage::Preprocess,
    Stage::LoadData,
    Stage::Infer,
    Stage::Postprocess,
    Stage::Render,
  ];

  fn index(self) -> usize {
    self as usize
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::LoadModel => "模型加载",
      Stage::Preprocess => "图像预处理",
      Stage::LoadData => "数据加载",
      Stage::Infer => "模型推理",
      Stage::Postprocess => "结果后处理",
      Stage::Render => "结果绘制",
    };
    f.write_str(name)
  }
}

/// 由调用方提供的耗时记录器
pub trait MetricsSink {
  fn record(&mut self, stage: Stage, elapsed: Duration);

  /// 计时执行 `f` 并记录
  fn measure<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T
  where
    Self: Sized,
  {
    let now = Instant::now();
    let result = f();
    self.record(stage, now.elapsed());
    result
  }
}

/// 丢弃所有记录
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
  fn record(&mut self, _stage: Stage, _elapsed: Duration) {}
}

/// 按阶段累计耗时与次数
#[derive(Debug, Default, Clone)]
pub struct StageTimings {
  totals: [Duration; 6],
  counts: [u32; 6],
}

impl StageTimings {
  pub fn total(&self, stage: Stage) -> Duration {
    self.totals[stage.index()]
  }

  pub fn count(&self, stage: Stage) -> u32 {
    self.counts[stage.index()]
  }

  pub fn mean(&self, stage: Stage) -> Option<Duration> {
    let count = self.count(stage);
    (count > 0).then(|| self.total(stage) / count)
  }
}

impl MetricsSink for StageTimings {
  fn record(&mut self, stage: Stage, elapsed: Duration) {
    self.totals[stage.index()] += elapsed;
    self.counts[stage.index()] += 1;
  }
}

impl<M: MetricsSink> MetricsSink for &mut M {
  fn record(&mut self, stage: Stage, elapsed: Duration) {
    (**self).record(stage, elapsed);
  }
}
