// 该文件是 Jusong （橘颂） 项目的一部分。
// src/severity.rs - 病害严重程度计算
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt;
use std::path::Path;

use image::ImageReader;
use thiserror::Error;
use tracing::debug;

use crate::leaf::estimate_leaf_mask;
use crate::mask::BinaryMask;

#[derive(Error, Debug)]
pub enum SeverityError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("掩膜尺寸不匹配: 病斑 {disease_width}x{disease_height}, 叶片 {leaf_width}x{leaf_height}")]
  MaskSizeMismatch {
    disease_width: u32,
    disease_height: u32,
    leaf_width: u32,
    leaf_height: u32,
  },
}

/// 严重程度标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Healthy,
  Mild,
  Moderate,
  Severe,
}

impl Severity {
  /// 半开区间，按声明顺序首个命中生效：
  /// [0,5) Healthy，[5,20) Mild，[20,50) Moderate，[50,∞) Severe。
  pub fn from_percent(percent: f64) -> Self {
    if percent < 5.0 {
      Severity::Healthy
    } else if percent < 20.0 {
      Severity::Mild
    } else if percent < 50.0 {
      Severity::Moderate
    } else {
      Severity::Severe
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Severity::Healthy => "Healthy (<5%)",
      Severity::Mild => "Mild (5%-20%)",
      Severity::Moderate => "Moderate (20%-50%)",
      Severity::Severe => "Severe (>50%)",
    };
    write!(f, "{}", label)
  }
}

/// 严重程度计算结果，包含实际使用的叶片掩膜。
#[derive(Debug, Clone)]
pub struct SeverityResult {
  pub label: Severity,
  pub percent: f64,
  pub leaf_mask: BinaryMask,
}

/// 计算病害严重程度。
///
/// 未提供叶片掩膜时从原图重新估计（外部叶片掩膜是预留的扩展口，
/// 当前编排层从不填充）。百分比不截断到 100：病斑与叶片是两条
/// 独立的估计路径，超界值按原样暴露。
pub fn calculate_severity(
  disease_mask: &BinaryMask,
  leaf_mask: Option<&BinaryMask>,
  image_path: &Path,
) -> Result<SeverityResult, SeverityError> {
  let leaf = match leaf_mask {
    Some(mask) => mask.clone(),
    None => {
      let image = ImageReader::open(image_path)?.decode()?.into_rgb8();
      estimate_leaf_mask(&image)
    }
  };

  if (leaf.width(), leaf.height()) != (disease_mask.width(), disease_mask.height()) {
    return Err(SeverityError::MaskSizeMismatch {
      disease_width: disease_mask.width(),
      disease_height: disease_mask.height(),
      leaf_width: leaf.width(),
      leaf_height: leaf.height(),
    });
  }

  let leaf_px = leaf.count_ones();
  let disease_px = disease_mask.count_ones();

  // 未检出叶片时取 0，避免除零；这是策略选择，不代表健康
  let percent = if leaf_px == 0 {
    0.0
  } else {
    disease_px as f64 / leaf_px as f64 * 100.0
  };

  debug!(
    "病斑像素: {}, 叶片像素: {}, 严重程度: {:.2}%",
    disease_px, leaf_px, percent
  );

  Ok(SeverityResult {
    label: Severity::from_percent(percent),
    percent,
    leaf_mask: leaf,
  })
}
