// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/model/rtdetr.rs - RT-DETR 推理流程
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
use tracing::{debug, error, info};

use crate::{
  context::DetectionContext,
  frame::{BGR_CHANNELS, BgrFrame},
  metrics::{MetricsSink, Stage},
  model::{
    DetectionSet, EngineTensor, InferenceEngine, Model,
    decode::{
      DecodeError, DecodeMode, FUSED_OUTPUT_LEN, ModelOutput, RAW_BOXES_LEN, RAW_LOGITS_LEN, decode,
    },
  },
  preprocess::{FrameGeometry, PreprocessError, Preprocessed, preprocess},
  tensor::{NchwTensor, TensorError, fill_vector_tensor},
};

/// 带后处理层的模型输入名
pub const IMAGE_INPUT: &str = "image";
pub const IM_SHAPE_INPUT: &str = "im_shape";
pub const SCALE_FACTOR_INPUT: &str = "scale_factor";

#[derive(Error, Debug)]
pub enum RtDetrError {
  #[error("推理引擎错误: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("张量填充错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("后处理错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("模型缺少输入: {0}")]
  MissingInput(String),
  #[error("模型输出不匹配: {0}")]
  MissingOutput(String),
}

impl RtDetrError {
  fn engine<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    RtDetrError::Engine(Box::new(e))
  }
}

/// RT-DETR 预测器。
///
/// 几何信息不保存在预测器中，每次 [`RtDetr::predict`] 都由预处理重新得到
/// 并直接传给解码。
pub struct RtDetr<E> {
  engine: E,
  context: DetectionContext,
  mode: DecodeMode,
}

impl<E: InferenceEngine> RtDetr<E> {
  /// 创建预测器，并用一次全零输入的预热推理校验模型输出形状
  pub fn new(engine: E, context: DetectionContext, mode: DecodeMode) -> Result<Self, RtDetrError> {
    let mut model = Self {
      engine,
      context,
      mode,
    };
    model.check_inputs()?;

    let target = model.context.target_size();
    let geometry = FrameGeometry::new(target.height as usize, target.width as usize, target);
    let tensor = NchwTensor::zeros(BGR_CHANNELS, target.height as usize, target.width as usize);
    let inputs = model.build_inputs(tensor, &geometry)?;

    debug!("执行预热推理");
    let outputs = model.engine.run(inputs).map_err(RtDetrError::engine)?;
    select_output(model.mode, &outputs, geometry)?;
    info!("模型输出校验通过 ({:?} 模式)", model.mode);

    Ok(model)
  }

  pub fn context(&self) -> &DetectionContext {
    &self.context
  }

  pub fn mode(&self) -> DecodeMode {
    self.mode
  }

  fn check_inputs(&self) -> Result<(), RtDetrError> {
    let names = self.engine.input_names();
    match self.mode {
      DecodeMode::Fused => {
        for name in [IMAGE_INPUT, IM_SHAPE_INPUT, SCALE_FACTOR_INPUT] {
          if !names.iter().any(|n| n == name) {
            error!("融合模式需要模型输入 {}, 实际输入: {:?}", name, names);
            return Err(RtDetrError::MissingInput(name.to_string()));
          }
        }
      }
      DecodeMode::Raw => {
        if names.is_empty() {
          return Err(RtDetrError::MissingInput("<image>".to_string()));
        }
      }
    }
    Ok(())
  }

  fn build_inputs(
    &self,
    tensor: NchwTensor,
    geometry: &FrameGeometry,
  ) -> Result<Vec<EngineTensor>, RtDetrError> {
    let (shape, data) = tensor.into_parts();
    match self.mode {
      DecodeMode::Fused => {
        let target = self.context.target_size();
        let mut im_shape = vec![0.0f32; 2];
        fill_vector_tensor(
          &mut im_shape,
          &[target.height as f32, target.width as f32],
          2,
        )?;
        let mut scale_factor = vec![0.0f32; 2];
        fill_vector_tensor(&mut scale_factor, &geometry.scale_factor.to_array(), 2)?;

        Ok(vec![
          EngineTensor::new(IMAGE_INPUT, shape.to_vec(), data),
          EngineTensor::new(IM_SHAPE_INPUT, vec![1, 2], im_shape),
          EngineTensor::new(SCALE_FACTOR_INPUT, vec![1, 2], scale_factor),
        ])
      }
      DecodeMode::Raw => {
        let name = self
          .engine
          .input_names()
          .first()
          .cloned()
          .ok_or_else(|| RtDetrError::MissingInput("<image>".to_string()))?;
        Ok(vec![EngineTensor::new(name, shape.to_vec(), data)])
      }
    }
  }

  /// 单张图像推理：预处理 → 填充张量 → 推理 → 解码
  pub fn predict<S: MetricsSink>(
    &mut self,
    frame: &BgrFrame,
    metrics: &mut S,
  ) -> Result<DetectionSet, RtDetrError> {
    let target = self.context.target_size();
    let Preprocessed { image, geometry } =
      metrics.measure(Stage::Preprocess, || preprocess(frame, target))?;

    let inputs = metrics.measure(Stage::LoadData, || -> Result<_, RtDetrError> {
      let tensor = NchwTensor::from_image(&image)?;
      self.build_inputs(tensor, &geometry)
    })?;

    let engine = &mut self.engine;
    let outputs = metrics
      .measure(Stage::Infer, || engine.run(inputs))
      .map_err(RtDetrError::engine)?;

    let mode = self.mode;
    let context = &self.context;
    metrics.measure(Stage::Postprocess, || -> Result<DetectionSet, RtDetrError> {
      let output = select_output(mode, &outputs, geometry)?;
      Ok(decode(output, context)?)
    })
  }
}

impl<E: InferenceEngine> Model for RtDetr<E> {
  type Input = BgrFrame;
  type Output = DetectionSet;
  type Error = RtDetrError;

  fn infer<S: MetricsSink>(
    &mut self,
    input: &Self::Input,
    metrics: &mut S,
  ) -> Result<Self::Output, Self::Error> {
    self.predict(input, metrics)
  }
}

/// 按张量大小挑出解码所需的输出，不依赖引擎给出的输出顺序
pub fn select_output(
  mode: DecodeMode,
  outputs: &[EngineTensor],
  geometry: FrameGeometry,
) -> Result<ModelOutput<'_>, RtDetrError> {
  let find = |len: usize| outputs.iter().position(|t| t.data.len() == len);
  let sizes = || {
    outputs
      .iter()
      .map(|t| format!("{}={}", t.name, t.data.len()))
      .collect::<Vec<_>>()
      .join(", ")
  };

  match mode {
    DecodeMode::Fused => {
      let idx = find(FUSED_OUTPUT_LEN).ok_or_else(|| {
        RtDetrError::MissingOutput(format!(
          "需要长度为 {} 的输出, 实际输出: [{}]",
          FUSED_OUTPUT_LEN,
          sizes()
        ))
      })?;
      debug!("输出 {} ({}) 是检测记录", idx, outputs[idx].name);
      Ok(ModelOutput::Fused {
        records: &outputs[idx].data,
      })
    }
    DecodeMode::Raw => match (find(RAW_LOGITS_LEN), find(RAW_BOXES_LEN)) {
      (Some(cls), Some(reg)) => {
        debug!(
          "输出 {} ({}) 是分类, 输出 {} ({}) 是回归",
          cls, outputs[cls].name, reg, outputs[reg].name
        );
        Ok(ModelOutput::Raw {
          logits: &outputs[cls].data,
          boxes: &outputs[reg].data,
          geometry,
        })
      }
      _ => Err(RtDetrError::MissingOutput(format!(
        "需要长度为 {} 和 {} 的输出, 实际输出: [{}]",
        RAW_LOGITS_LEN,
        RAW_BOXES_LEN,
        sizes()
      ))),
    },
  }
}
