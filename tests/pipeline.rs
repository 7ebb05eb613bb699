// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// tests/pipeline.rs - 端到端流水线测试
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

use std::{cell::RefCell, rc::Rc};

use image::{Rgb, RgbImage};
use rtdetr_deploy::{
  context::{DetectionContext, TargetSize},
  frame::BgrFrame,
  metrics::{NoopMetrics, Stage, StageTimings},
  model::{
    BBox, DecodeError, DecodeMode, EngineTensor, InferenceEngine, RtDetr, RtDetrError,
    decode::{BOX_PARAM_NUM, COCO_CLASS_NUM, FUSED_OUTPUT_LEN, RAW_BOXES_LEN, RAW_LOGITS_LEN},
  },
  output::{SaveImageFileOutput, draw::Draw, record::write_records},
  task::{OneShotTask, Task},
};

#[derive(Debug, thiserror::Error)]
#[error("模拟引擎失败")]
struct FakeEngineError;

/// 按脚本返回固定输出，并记录每次收到的输入
struct FakeEngine {
  input_names: Vec<String>,
  outputs: Vec<EngineTensor>,
  calls: Rc<RefCell<Vec<Vec<EngineTensor>>>>,
  fail_after: Option<usize>,
}

impl FakeEngine {
  fn new(input_names: &[&str], outputs: Vec<EngineTensor>) -> Self {
    Self {
      input_names: input_names.iter().map(|s| s.to_string()).collect(),
      outputs,
      calls: Rc::default(),
      fail_after: None,
    }
  }

  fn calls(&self) -> Rc<RefCell<Vec<Vec<EngineTensor>>>> {
    Rc::clone(&self.calls)
  }
}

impl InferenceEngine for FakeEngine {
  type Error = FakeEngineError;

  fn input_names(&self) -> &[String] {
    &self.input_names
  }

  fn run(&mut self, inputs: Vec<EngineTensor>) -> Result<Vec<EngineTensor>, FakeEngineError> {
    let mut calls = self.calls.borrow_mut();
    if self.fail_after.is_some_and(|n| calls.len() >= n) {
      return Err(FakeEngineError);
    }
    calls.push(inputs);
    Ok(self.outputs.clone())
  }
}

fn coco_context() -> DetectionContext {
  let labels = (0..COCO_CLASS_NUM).map(|i| format!("class{}", i)).collect();
  DetectionContext::new(TargetSize::default(), 0.5, labels)
}

/// 融合模式输出：第 0 个候选为给定记录，其余置信度为 0
fn fused_outputs(record: [f32; 6]) -> Vec<EngineTensor> {
  let mut data = vec![0.0f32; FUSED_OUTPUT_LEN];
  data[..6].copy_from_slice(&record);
  vec![
    EngineTensor::new("bbox_num", vec![1], vec![1.0]),
    EngineTensor::new("reshape2_83.tmp_0", vec![300, 6], data),
  ]
}

/// 原始模式输出：第 0 个候选属于 `class_id`，框为归一化的 (cx, cy, w, h)
fn raw_outputs(class_id: usize, cxcywh: [f32; 4]) -> Vec<EngineTensor> {
  let mut logits = vec![-10.0f32; RAW_LOGITS_LEN];
  logits[class_id] = 5.0;
  let mut boxes = vec![0.0f32; RAW_BOXES_LEN];
  boxes[..BOX_PARAM_NUM].copy_from_slice(&cxcywh);
  // 先回归后分类，验证按大小匹配
  vec![
    EngineTensor::new("boxes", vec![1, 300, 4], boxes),
    EngineTensor::new("logits", vec![1, 300, 80], logits),
  ]
}

#[test]
fn fused_mode_end_to_end() {
  let engine = FakeEngine::new(
    &["image", "im_shape", "scale_factor"],
    fused_outputs([3.0, 0.9, 10.0, 10.0, 50.0, 50.0]),
  );
  let calls = engine.calls();
  let mut model = RtDetr::new(engine, coco_context(), DecodeMode::Fused).unwrap();

  let frame = BgrFrame::with_shape(100, 200);
  let detections = model.predict(&frame, &mut NoopMetrics).unwrap();

  assert_eq!(detections.len(), 1);
  let detection = detections.iter().next().unwrap();
  assert_eq!(detection.class_id, 3);
  assert_eq!(&*detection.label, "class3");
  assert_eq!(detection.score, 0.9);
  assert_eq!(detection.bbox, BBox::new(10, 10, 40, 40));

  let calls = calls.borrow();
  // 预热一次，推理一次
  assert_eq!(calls.len(), 2);
  let inputs = &calls[1];
  assert_eq!(inputs.len(), 3);
  assert_eq!(inputs[0].name, "image");
  assert_eq!(inputs[0].shape, vec![1, 3, 640, 640]);
  assert_eq!(inputs[0].data.len(), 3 * 640 * 640);
  assert_eq!(inputs[1].name, "im_shape");
  assert_eq!(inputs[1].data, vec![640.0, 640.0]);
  assert_eq!(inputs[2].name, "scale_factor");
  assert_eq!(inputs[2].data, vec![640.0f32 / 100.0, 640.0f32 / 200.0]);
}

#[test]
fn raw_mode_end_to_end() {
  let engine = FakeEngine::new(&["images"], raw_outputs(2, [0.5, 0.5, 0.25, 0.25]));
  let calls = engine.calls();
  let mut model = RtDetr::new(engine, coco_context(), DecodeMode::Raw).unwrap();

  // sy = 2, sx = 4
  let frame = BgrFrame::with_shape(320, 160);
  let detections = model.predict(&frame, &mut NoopMetrics).unwrap();

  assert_eq!(detections.len(), 1);
  let detection = detections.iter().next().unwrap();
  assert_eq!(detection.class_id, 2);
  assert_eq!(&*detection.label, "class2");
  assert!(detection.score > 0.99);
  assert_eq!(detection.bbox, BBox::new(60, 120, 40, 80));

  let calls = calls.borrow();
  let inputs = &calls[1];
  assert_eq!(inputs.len(), 1);
  assert_eq!(inputs[0].name, "images");
  assert_eq!(inputs[0].shape, vec![1, 3, 640, 640]);
}

#[test]
fn geometry_is_recomputed_for_every_frame() {
  let engine = FakeEngine::new(&["images"], raw_outputs(0, [0.5, 0.5, 0.25, 0.25]));
  let mut model = RtDetr::new(engine, coco_context(), DecodeMode::Raw).unwrap();

  let small = model
    .predict(&BgrFrame::with_shape(320, 160), &mut NoopMetrics)
    .unwrap();
  let square = model
    .predict(&BgrFrame::with_shape(640, 640), &mut NoopMetrics)
    .unwrap();
  let small_again = model
    .predict(&BgrFrame::with_shape(320, 160), &mut NoopMetrics)
    .unwrap();

  assert_eq!(small.items[0].bbox, BBox::new(60, 120, 40, 80));
  assert_eq!(square.items[0].bbox, BBox::new(240, 240, 160, 160));
  assert_eq!(small_again, small);
}

#[test]
fn fused_scale_factor_follows_each_frame() {
  let engine = FakeEngine::new(
    &["image", "im_shape", "scale_factor"],
    fused_outputs([0.0, 0.1, 0.0, 0.0, 1.0, 1.0]),
  );
  let calls = engine.calls();
  let mut model = RtDetr::new(engine, coco_context(), DecodeMode::Fused).unwrap();

  model
    .predict(&BgrFrame::with_shape(320, 1280), &mut NoopMetrics)
    .unwrap();
  model
    .predict(&BgrFrame::with_shape(640, 320), &mut NoopMetrics)
    .unwrap();

  let calls = calls.borrow();
  assert_eq!(calls[1][2].data, vec![2.0, 0.5]);
  assert_eq!(calls[2][2].data, vec![1.0, 2.0]);
}

#[test]
fn warmup_rejects_unexpected_output_shapes() {
  let engine = FakeEngine::new(
    &["images"],
    vec![EngineTensor::new("out", vec![1, 100], vec![0.0; 100])],
  );
  assert!(matches!(
    RtDetr::new(engine, coco_context(), DecodeMode::Raw),
    Err(RtDetrError::MissingOutput(_))
  ));

  // 原始模式的输出用在融合模式上同样失败
  let engine = FakeEngine::new(
    &["image", "im_shape", "scale_factor"],
    raw_outputs(0, [0.5; 4]),
  );
  assert!(matches!(
    RtDetr::new(engine, coco_context(), DecodeMode::Fused),
    Err(RtDetrError::MissingOutput(_))
  ));
}

#[test]
fn fused_mode_requires_side_inputs() {
  let engine = FakeEngine::new(&["image"], fused_outputs([0.0; 6]));
  let calls = engine.calls();
  assert!(matches!(
    RtDetr::new(engine, coco_context(), DecodeMode::Fused),
    Err(RtDetrError::MissingInput(name)) if name == "im_shape"
  ));
  assert!(calls.borrow().is_empty());
}

#[test]
fn unknown_class_is_reported_not_skipped() {
  let engine = FakeEngine::new(
    &["image", "im_shape", "scale_factor"],
    fused_outputs([3.0, 0.9, 10.0, 10.0, 50.0, 50.0]),
  );
  let context = DetectionContext::new(TargetSize::default(), 0.5, Vec::new());
  let mut model = RtDetr::new(engine, context, DecodeMode::Fused).unwrap();

  let result = model.predict(&BgrFrame::with_shape(64, 64), &mut NoopMetrics);
  assert!(matches!(
    result,
    Err(RtDetrError::Decode(DecodeError::UnknownClass {
      class_id: 3,
      labels: 0
    }))
  ));
}

#[test]
fn engine_failure_is_propagated() {
  let mut engine = FakeEngine::new(&["images"], raw_outputs(0, [0.5; 4]));
  engine.fail_after = Some(1);
  let mut model = RtDetr::new(engine, coco_context(), DecodeMode::Raw).unwrap();

  assert!(matches!(
    model.predict(&BgrFrame::with_shape(32, 32), &mut NoopMetrics),
    Err(RtDetrError::Engine(_))
  ));
}

#[test]
fn empty_frame_is_rejected_before_inference() {
  let engine = FakeEngine::new(&["images"], raw_outputs(0, [0.5; 4]));
  let calls = engine.calls();
  let mut model = RtDetr::new(engine, coco_context(), DecodeMode::Raw).unwrap();

  assert!(matches!(
    model.predict(&BgrFrame::with_shape(0, 0), &mut NoopMetrics),
    Err(RtDetrError::Preprocess(_))
  ));
  assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn every_stage_is_timed_once_per_prediction() {
  let engine = FakeEngine::new(&["images"], raw_outputs(0, [0.5; 4]));
  let mut model = RtDetr::new(engine, coco_context(), DecodeMode::Raw).unwrap();

  let mut timings = StageTimings::default();
  model
    .predict(&BgrFrame::with_shape(48, 64), &mut timings)
    .unwrap();
  for stage in [Stage::Preprocess, Stage::LoadData, Stage::Infer, Stage::Postprocess] {
    assert_eq!(timings.count(stage), 1, "{}", stage);
  }
  assert_eq!(timings.count(Stage::Render), 0);
}

#[test]
fn one_shot_task_saves_image_and_records() {
  let dir = tempfile::tempdir().unwrap();
  let image_path = dir.path().join("out").join("result.png");
  let record_path = dir.path().join("out").join("result.json");

  let engine = FakeEngine::new(
    &["image", "im_shape", "scale_factor"],
    fused_outputs([1.0, 0.75, 8.0, 20.0, 48.0, 50.0]),
  );
  let model = RtDetr::new(engine, coco_context(), DecodeMode::Fused).unwrap();
  let frame = BgrFrame::from(RgbImage::from_pixel(96, 64, Rgb([90, 90, 90])));
  let output = SaveImageFileOutput::new(&image_path, Draw::default());

  let detections = OneShotTask::default()
    .run_task(std::iter::once(frame), model, output)
    .unwrap();
  write_records(&record_path, &detections).unwrap();

  let saved = image::open(&image_path).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (96, 64));
  assert_eq!(*saved.get_pixel(8, 30), Rgb([0, 0, 255]));
  assert_eq!(*saved.get_pixel(30, 35), Rgb([90, 90, 90]));

  let records: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(&record_path).unwrap()).unwrap();
  assert_eq!(records[0]["label"], "class1");
  assert_eq!(records[0]["bbox"], serde_json::json!([8, 20, 40, 30]));
}
