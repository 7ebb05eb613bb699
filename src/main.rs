// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/main.rs - 单图检测程序
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

use anyhow::Result;
use clap::Parser;

use rtdetr_deploy::{
  FromUrl,
  args::PipelineArgs,
  input::InputWrapper,
  metrics::{MetricsSink, Stage, StageTimings},
  model::{OnnxEngineBuilder, RtDetr},
  output::{SaveImageFileOutput, record::write_records},
  task::{OneShotTask, Task},
};

/// RT-DETR 单图检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse().pipeline;
  args.log();

  let mut timings = StageTimings::default();
  let model = timings.measure(Stage::LoadModel, || -> Result<_> {
    let engine = OnnxEngineBuilder::from_url(&args.model)?
      .device(args.device)
      .threads(args.threads)
      .build()?;
    Ok(RtDetr::new(engine, args.context(), args.mode())?)
  })?;

  let input = InputWrapper::from_url(&args.input)?;
  let output = SaveImageFileOutput::from_url(&args.output)?.with_draw(args.draw()?);

  let detections = OneShotTask::default()
    .with_timings(timings)
    .run_task(input, model, output)?;

  if let Some(path) = &args.record {
    write_records(path, &detections)?;
  }

  Ok(())
}
