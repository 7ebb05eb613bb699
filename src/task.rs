// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/task.rs - 任务驱动
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

use tracing::{info, warn};

use crate::{
  metrics::{MetricsSink, NoopMetrics, Stage, StageTimings},
  model::{Detection, DetectionSet, Model},
  output::{Render, draw::score_text},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 类别、标签、置信度、左上角、右下角；置信度与绘制的标签一致
pub fn detection_summary(d: &Detection) -> String {
  format!(
    "{}, {}, {}, ({}, {}), ({}, {})",
    d.class_id,
    d.label,
    score_text(d.score),
    d.bbox.x,
    d.bbox.y,
    d.bbox.right(),
    d.bbox.bottom()
  )
}

pub fn log_detections(detections: &DetectionSet) {
  info!("检测到 {} 个目标", detections.len());
  for d in detections {
    info!("{}", detection_summary(d));
  }
}

/// 取第一帧，推理一次并渲染
#[derive(Debug, Default)]
pub struct OneShotTask {
  timings: StageTimings,
}

impl OneShotTask {
  /// 沿用调用方已记录的耗时（如模型加载）
  pub fn with_timings(mut self, timings: StageTimings) -> Self {
    self.timings = timings;
    self
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectionSet, Error = ME>,
  O: Render<F, DetectionSet, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Output = DetectionSet;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<DetectionSet, Self::Error> {
    let mut timings = self.timings;

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let result = model.infer(&frame, &mut timings)?;
    log_detections(&result);
    timings.measure(Stage::Render, || output.render_result(&frame, &result))?;

    for stage in Stage::ALL {
      if let Some(mean) = timings.mean(stage) {
        info!("{}耗时: {:.2?}", stage, mean);
      }
    }

    Ok(result)
  }
}

/// 对同一帧重复推理和渲染，统计各阶段平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  times: usize,
  timings: StageTimings,
}

impl RepeatShotTask {
  /// 前若干次作为预热，不计入平均值
  pub const WARMUP_TIMES: usize = 2;

  pub fn new(times: usize) -> Self {
    Self {
      times,
      timings: StageTimings::default(),
    }
  }

  pub fn with_timings(mut self, timings: StageTimings) -> Self {
    self.timings = timings;
    self
  }
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self::new(100)
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectionSet, Error = ME>,
  O: Render<F, DetectionSet, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Output = StageTimings;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<StageTimings, Self::Error> {
    if self.times == 0 {
      anyhow::bail!("重复次数必须大于 0");
    }
    let mut timings = self.timings;
    // 次数不足时不跳过预热
    let warmup = if self.times > Self::WARMUP_TIMES {
      Self::WARMUP_TIMES
    } else {
      0
    };

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    for i in 0..self.times {
      if i < warmup {
        let mut noop = NoopMetrics;
        let result = model.infer(&frame, &mut noop)?;
        noop.measure(Stage::Render, || output.render_result(&frame, &result))?;
        info!("({})预热完成", i);
      } else {
        let result = model.infer(&frame, &mut timings)?;
        timings.measure(Stage::Render, || output.render_result(&frame, &result))?;
        info!("({})推理完成，检测到 {} 个目标", i, result.len());
      }
    }

    warn!("共 {} 次, 其中预热 {} 次", self.times, warmup);
    for stage in Stage::ALL {
      if let Some(mean) = timings.mean(stage) {
        warn!("平均{}耗时: {:.2?}", stage, mean);
      }
    }

    Ok(timings)
  }
}

#[cfg(test)]
mod tests {
  use std::{
    cell::{Cell, RefCell},
    convert::Infallible,
    sync::Arc,
  };

  use super::*;
  use crate::model::BBox;

  struct CountingModel {
    calls: usize,
  }

  impl Model for CountingModel {
    type Input = u8;
    type Output = DetectionSet;
    type Error = Infallible;

    fn infer<S: MetricsSink>(
      &mut self,
      _input: &u8,
      metrics: &mut S,
    ) -> Result<DetectionSet, Infallible> {
      self.calls += 1;
      metrics.measure(Stage::Infer, || ());
      Ok(DetectionSet::from(vec![Detection {
        class_id: 1,
        label: Arc::from("bicycle"),
        score: 0.7,
        bbox: BBox::new(0, 0, 5, 5),
      }]))
    }
  }

  #[derive(Default)]
  struct CountingRender {
    frames: RefCell<Vec<u8>>,
    fail: Cell<bool>,
  }

  #[derive(Debug, thiserror::Error)]
  #[error("渲染失败")]
  struct RenderFailed;

  impl Render<u8, DetectionSet> for &CountingRender {
    type Error = RenderFailed;

    fn render_result(&self, frame: &u8, _result: &DetectionSet) -> Result<(), RenderFailed> {
      if self.fail.get() {
        return Err(RenderFailed);
      }
      self.frames.borrow_mut().push(*frame);
      Ok(())
    }
  }

  #[test]
  fn summary_truncates_confidence_like_label() {
    let d = Detection {
      class_id: 16,
      label: Arc::from("dog"),
      score: 0.9876,
      bbox: BBox::new(10, 20, 30, 40),
    };
    assert_eq!(detection_summary(&d), "16, dog, 0.987, (10, 20), (40, 60)");
  }

  #[test]
  fn one_shot_uses_first_frame_only() {
    let render = CountingRender::default();
    let result = OneShotTask::default()
      .run_task(vec![7u8, 8].into_iter(), CountingModel { calls: 0 }, &render)
      .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(*render.frames.borrow(), vec![7]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let render = CountingRender::default();
    let result = OneShotTask::default().run_task(
      Vec::<u8>::new().into_iter(),
      CountingModel { calls: 0 },
      &render,
    );
    assert!(result.is_err());
  }

  #[test]
  fn render_error_is_propagated() {
    let render = CountingRender::default();
    render.fail.set(true);
    let result = OneShotTask::default().run_task(
      vec![1u8].into_iter(),
      CountingModel { calls: 0 },
      &render,
    );
    assert!(result.is_err());
  }

  #[test]
  fn repeat_shot_excludes_warmup_from_timings() {
    let render = CountingRender::default();
    let timings = RepeatShotTask::new(10)
      .run_task(vec![3u8].into_iter(), CountingModel { calls: 0 }, &render)
      .unwrap();
    assert_eq!(render.frames.borrow().len(), 10);
    assert_eq!(timings.count(Stage::Infer), 8);
    assert_eq!(timings.count(Stage::Render), 8);
    assert!(timings.mean(Stage::Infer).is_some());
    assert!(timings.mean(Stage::Preprocess).is_none());
  }

  #[test]
  fn repeat_shot_keeps_all_samples_when_too_few() {
    let render = CountingRender::default();
    let timings = RepeatShotTask::new(2)
      .run_task(vec![3u8].into_iter(), CountingModel { calls: 0 }, &render)
      .unwrap();
    assert_eq!(timings.count(Stage::Infer), 2);
  }

  #[test]
  fn repeat_shot_carries_caller_timings() {
    let mut loaded = StageTimings::default();
    loaded.record(Stage::LoadModel, std::time::Duration::from_millis(5));
    let render = CountingRender::default();
    let timings = RepeatShotTask::new(3)
      .with_timings(loaded)
      .run_task(vec![3u8].into_iter(), CountingModel { calls: 0 }, &render)
      .unwrap();
    assert_eq!(timings.count(Stage::LoadModel), 1);
    assert_eq!(timings.count(Stage::Infer), 1);
  }
}
