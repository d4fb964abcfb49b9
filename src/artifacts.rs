// 该文件是 Jusong （橘颂） 项目的一部分。
// src/artifacts.rs - 预测产物落盘
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

use std::path::{Path, PathBuf};

use image::{ImageReader, Rgb, RgbImage};
use thiserror::Error;
use tracing::warn;

use crate::mask::BinaryMask;

// 叠加图混合比例与病斑着色
const BLEND_ORIGINAL: f32 = 0.6;
const BLEND_OVERLAY: f32 = 0.4;
const DISEASE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Error, Debug)]
pub enum ArtifactError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("记录序列化错误: {0}")]
  RecordError(#[from] serde_json::Error),
}

/// 单次预测的产物路径，文件名以请求 uid 开头，并发请求互不覆盖。
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
  pub mask: PathBuf,
  pub overlay: PathBuf,
  pub record: PathBuf,
}

/// 写出掩膜图与叠加图，返回全部产物路径（记录文件由调用方随后写入）。
pub fn write_images(
  output_dir: &Path,
  uid: &str,
  image_path: &Path,
  disease_mask: &BinaryMask,
) -> Result<ArtifactPaths, ArtifactError> {
  std::fs::create_dir_all(output_dir)?;

  let stem = image_path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "image".to_string());
  let base = format!("{uid}_{stem}");

  // 掩膜图：单通道 0/255
  let mask_path = output_dir.join(format!("{base}_mask.png"));
  disease_mask.to_gray().save(&mask_path)?;
  warn!("保存掩膜图像: {}", mask_path.display());

  // 叠加图：原图与病斑涂色副本按 60/40 混合
  let original = ImageReader::open(image_path)?.decode()?.into_rgb8();
  let overlay_path = output_dir.join(format!("{base}_overlay.png"));
  blend_overlay(&original, disease_mask).save(&overlay_path)?;
  warn!("保存叠加图像: {}", overlay_path.display());

  Ok(ArtifactPaths {
    mask: mask_path,
    overlay: overlay_path,
    record: output_dir.join(format!("{base}.json")),
  })
}

/// 把预测记录写为 JSON 文件。
pub fn write_record(path: &Path, record: &serde_json::Value) -> Result<(), ArtifactError> {
  let mut body = serde_json::to_vec_pretty(record)?;
  body.push(b'\n');
  std::fs::write(path, body)?;
  warn!("保存预测记录: {}", path.display());
  Ok(())
}

// 涂色副本仅在病斑像素处偏离原图，逐像素混合与整图混合等价
fn blend_overlay(original: &RgbImage, mask: &BinaryMask) -> RgbImage {
  let mut blended = original.clone();
  for (x, y, pixel) in blended.enumerate_pixels_mut() {
    if mask.get(x, y) != 0 {
      for c in 0..3 {
        pixel[c] = (pixel[c] as f32 * BLEND_ORIGINAL + DISEASE_COLOR[c] as f32 * BLEND_OVERLAY)
          .round() as u8;
      }
    }
  }
  blended
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::GrayImage;

  fn disease_mask() -> BinaryMask {
    let mut mask = BinaryMask::new(16, 16);
    for y in 4..8 {
      for x in 4..8 {
        mask.set(x, y, 1);
      }
    }
    mask
  }

  #[test]
  fn writes_mask_and_overlay_images() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("leaf.png");
    RgbImage::from_pixel(16, 16, Rgb([40, 200, 40]))
      .save(&image_path)
      .unwrap();

    let out_dir = dir.path().join("predictions");
    let paths = write_images(&out_dir, "deadbeef", &image_path, &disease_mask()).unwrap();

    assert!(paths.mask.exists());
    assert!(paths.overlay.exists());
    assert_eq!(
      paths.mask.file_name().unwrap().to_string_lossy(),
      "deadbeef_leaf_mask.png"
    );

    // 掩膜图只允许 0/255 两档
    let saved: GrayImage = image::open(&paths.mask).unwrap().into_luma8();
    assert!(saved.pixels().all(|p| p[0] == 0 || p[0] == 255));
  }

  #[test]
  fn overlay_blends_only_disease_pixels() {
    let original = RgbImage::from_pixel(16, 16, Rgb([40, 200, 40]));
    let blended = blend_overlay(&original, &disease_mask());

    // 病斑内按 60/40 混入纯红
    assert_eq!(blended.get_pixel(5, 5), &Rgb([126, 120, 24]));
    // 病斑外保持原样
    assert_eq!(blended.get_pixel(0, 0), &Rgb([40, 200, 40]));
  }

  #[test]
  fn writes_record_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("record.json");
    let record = serde_json::json!({ "uid": "deadbeef", "severity_percent": 6.25 });

    write_record(&path, &record).unwrap();

    let body = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["uid"], "deadbeef");
  }
}
