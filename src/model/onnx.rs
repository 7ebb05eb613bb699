// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
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

use std::fmt;

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{EngineTensor, InferenceEngine},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum OnnxEngineError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
}

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Device {
  #[default]
  Cpu,
  Cuda,
}

impl fmt::Display for Device {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Device::Cpu => f.write_str("CPU"),
      Device::Cuda => f.write_str("CUDA"),
    }
  }
}

pub struct OnnxEngineBuilder {
  model_path: String,
  device: Device,
  threads: usize,
}

impl FromUrlWithScheme for OnnxEngineBuilder {
  const SCHEME: &'static str = "rtdetr";
}

impl FromUrl for OnnxEngineBuilder {
  type Error = OnnxEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxEngineError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(OnnxEngineBuilder {
      model_path: url_file_path(url),
      device: Device::default(),
      threads: 0,
    })
  }
}

fn load_error<E: fmt::Display>(what: &'static str) -> impl Fn(E) -> OnnxEngineError {
  move |e| OnnxEngineError::ModelLoadError(format!("{}: {}", what, e))
}

fn infer_error<E: fmt::Display>(what: &'static str) -> impl Fn(E) -> OnnxEngineError {
  move |e| OnnxEngineError::InferenceError(format!("{}: {}", what, e))
}

impl OnnxEngineBuilder {
  pub fn device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  /// 算子内线程数，0 表示使用运行时默认值
  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = threads;
    self
  }

  pub fn build(self) -> Result<OnnxEngine, OnnxEngineError> {
    info!("模型路径: {}", self.model_path);
    info!("推理设备: {}", self.device);

    #[allow(unused_mut)]
    let mut builder = Session::builder().map_err(load_error("无法创建会话构建器"))?;

    if self.device == Device::Cuda {
      #[cfg(feature = "cuda")]
      {
        builder = builder
          .with_execution_providers([
            ort::execution_providers::CUDAExecutionProvider::default().build()
          ])
          .map_err(load_error("无法注册 CUDA 执行器"))?;
      }
      #[cfg(not(feature = "cuda"))]
      warn!("未启用 cuda 特性, 回退到 CPU 推理");
    }

    let mut builder = builder
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(load_error("无法设置图优化级别"))?;
    if self.threads > 0 {
      builder = builder
        .with_intra_threads(self.threads)
        .map_err(load_error("无法设置线程数"))?;
    }

    let session = builder
      .commit_from_file(&self.model_path)
      .map_err(load_error("无法加载模型"))?;
    info!("模型加载完成");

    let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

    if input_names.is_empty() || output_names.is_empty() {
      return Err(OnnxEngineError::ModelLoadError(format!(
        "模型输入或输出为空: 输入 {}, 输出 {}",
        input_names.len(),
        output_names.len()
      )));
    }

    info!("模型输入:");
    for input in session.inputs.iter() {
      info!("  名称: {}, 类型: {:?}", input.name, input.input_type);
    }
    info!("模型输出:");
    for output in session.outputs.iter() {
      info!("  名称: {}, 类型: {:?}", output.name, output.output_type);
    }

    Ok(OnnxEngine {
      session,
      input_names,
      output_names,
    })
  }
}

/// 基于 ONNX Runtime 的推理引擎
pub struct OnnxEngine {
  session: Session,
  input_names: Vec<String>,
  output_names: Vec<String>,
}

impl InferenceEngine for OnnxEngine {
  type Error = OnnxEngineError;

  fn input_names(&self) -> &[String] {
    &self.input_names
  }

  fn run(&mut self, inputs: Vec<EngineTensor>) -> Result<Vec<EngineTensor>, Self::Error> {
    let mut values = Vec::with_capacity(inputs.len());
    for input in inputs {
      debug!("设置模型输入 {}: {:?}", input.name, input.shape);
      let shape: Vec<i64> = input.shape.iter().map(|&d| d as i64).collect();
      let tensor =
        Tensor::from_array((shape, input.data)).map_err(infer_error("无法创建输入张量"))?;
      values.push((input.name, tensor));
    }

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(values)
      .map_err(infer_error("推理失败"))?;

    let mut tensors = Vec::with_capacity(self.output_names.len());
    for name in &self.output_names {
      let value = outputs
        .get(name.as_str())
        .ok_or_else(|| OnnxEngineError::InferenceError(format!("找不到输出 '{}'", name)))?;
      let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(infer_error("无法读取输出张量"))?;
      let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
      debug!("模型输出 {}: {:?}", name, shape);
      tensors.push(EngineTensor::new(name.clone(), shape, data.to_vec()));
    }

    Ok(tensors)
  }
}
