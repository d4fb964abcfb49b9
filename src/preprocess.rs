// 该文件是 Jusong （橘颂） 项目的一部分。
// src/preprocess.rs - 模型输入预处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{ImageReader, RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 模型输入张量，NHWC 排布，批大小固定为 1，取值范围 [0,1]。
#[derive(Debug, Clone)]
pub struct InputTensor {
  data: Box<[f32]>,
  height: u32,
  width: u32,
}

impl InputTensor {
  /// 由 RGB 图像构造，整数亮度除以 255 归一化。
  pub fn from_rgb(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let data: Vec<f32> = image.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

    Self {
      data: data.into_boxed_slice(),
      height,
      width,
    }
  }

  pub fn height(&self) -> usize {
    self.height as usize
  }

  pub fn width(&self) -> usize {
    self.width as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 形状 (1, H, W, 3)
  pub fn shape(&self) -> [usize; 4] {
    [1, self.height(), self.width(), RGB_CHANNELS]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

/// 读取图片并转为模型输入张量。
///
/// 解码后的像素显式转为 RGB 排布，按面积平均采样缩放到 `target_size`
/// （降采样时抗锯齿优于最近邻/双线性），返回张量与缩放前的 (高, 宽)。
pub fn prepare(
  path: &Path,
  target_size: (u32, u32),
) -> Result<(InputTensor, (u32, u32)), PreprocessError> {
  let image = ImageReader::open(path)?.decode()?;
  let rgb: RgbImage = image.into_rgb8();
  let (orig_w, orig_h) = rgb.dimensions();

  let (target_w, target_h) = target_size;
  let resized = imageops::thumbnail(&rgb, target_w, target_h);

  debug!(
    "图片预处理完成: {}x{} -> {}x{}",
    orig_w, orig_h, target_w, target_h
  );

  Ok((InputTensor::from_rgb(&resized), (orig_h, orig_w)))
}
