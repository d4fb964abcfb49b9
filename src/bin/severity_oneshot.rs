// 该文件是 Jusong （橘颂） 项目的一部分。
// src/bin/severity_oneshot.rs - 单次严重程度估计
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use jusong::model::MaskFileModel;
use jusong::pipeline::Pipeline;

/// Jusong 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 叶片照片路径
  #[arg(long, value_name = "IMAGE")]
  pub image: PathBuf,

  /// 分割概率图路径（灰度图，0-255 映射为概率 0-1）
  #[arg(long, value_name = "PROBS")]
  pub probs: PathBuf,

  /// 产物输出目录
  #[arg(long, default_value = "predictions", value_name = "DIR")]
  pub output: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("图片路径: {}", args.image.display());
  info!("概率图路径: {}", args.probs.display());
  info!("输出目录: {}", args.output.display());

  let model = MaskFileModel::new(&args.probs);
  let pipeline = Pipeline::new(model, &args.output);

  info!("开始处理...");
  let prediction = pipeline.run(&args.image)?;

  if let Some(classification) = &prediction.classification {
    info!(
      "预测类别: {} ({:.2})",
      classification.class_name, classification.confidence
    );
  }
  info!("严重程度: {} ({:.2}%)", prediction.label, prediction.percent);
  info!("掩膜输出: {}", prediction.artifacts.mask.display());
  info!("叠加输出: {}", prediction.artifacts.overlay.display());

  Ok(())
}
