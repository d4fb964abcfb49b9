// 该文件是 Jusong （橘颂） 项目的一部分。
// src/model/mask_file.rs - 概率图文件回放模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Model, ModelOutput, Tensor};
use crate::preprocess::InputTensor;

/// 从灰度图文件回放分割概率图的调试模型。
///
/// 像素值 0-255 线性映射为概率 0-1，不执行真实推理；
/// 用于在没有推理运行时的环境下跑通整条流水线。
pub struct MaskFileModel {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum MaskFileModelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("概率图解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

impl MaskFileModel {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl Model for MaskFileModel {
  type Error = MaskFileModelError;

  fn infer(&self, _input: &InputTensor) -> Result<ModelOutput, Self::Error> {
    info!("加载概率图文件: {}", self.path.display());
    let gray = ImageReader::open(&self.path)?.decode()?.into_luma8();
    let (width, height) = gray.dimensions();
    debug!("概率图尺寸: {}x{}", width, height);

    let data: Vec<f32> = gray.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

    Ok(ModelOutput::Single(Tensor::new(
      data,
      &[1, height as usize, width as usize],
    )))
  }
}
