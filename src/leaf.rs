// 该文件是 Jusong （橘颂） 项目的一部分。
// src/leaf.rs - 叶片区域估计
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use tracing::debug;

use crate::mask::{BinaryMask, clean_mask};

// 针对绿色叶片调校的 HSV 包含范围，H 取 0-180 标度
const LEAF_LOWER: [u8; 3] = [25, 30, 20];
const LEAF_UPPER: [u8; 3] = [100, 255, 255];

// 叶片掩膜的清理参数比病斑更粗
const LEAF_KERNEL_SIZE: u8 = 7;
const LEAF_MIN_AREA: u32 = 200;

/// 用颜色启发式估计叶片区域，输出与输入同分辨率的二值掩膜。
///
/// 与病害分割模型完全无关，作为严重程度计算的分母使用。
pub fn estimate_leaf_mask(image: &RgbImage) -> BinaryMask {
  let (width, height) = image.dimensions();
  let mut mask = BinaryMask::new(width, height);

  for (x, y, pixel) in image.enumerate_pixels() {
    let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
    if (LEAF_LOWER[0]..=LEAF_UPPER[0]).contains(&h)
      && (LEAF_LOWER[1]..=LEAF_UPPER[1]).contains(&s)
      && (LEAF_LOWER[2]..=LEAF_UPPER[2]).contains(&v)
    {
      mask.set(x, y, 1);
    }
  }

  debug!(
    "叶片候选像素: {} / {}",
    mask.count_ones(),
    (width as u64) * (height as u64)
  );

  clean_mask(&mask, LEAF_KERNEL_SIZE, LEAF_MIN_AREA)
}

/// RGB 转 HSV，标度与 OpenCV 一致：H 0-180，S/V 0-255。
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
  let max = r.max(g).max(b);
  let min = r.min(g).min(b);
  let delta = (max - min) as f32;

  let s = if max == 0 {
    0
  } else {
    (delta * 255.0 / max as f32).round() as u8
  };

  let h = if delta == 0.0 {
    0.0
  } else if max == r {
    60.0 * (g as f32 - b as f32) / delta
  } else if max == g {
    120.0 + 60.0 * (b as f32 - r as f32) / delta
  } else {
    240.0 + 60.0 * (r as f32 - g as f32) / delta
  };
  let h = if h < 0.0 { h + 360.0 } else { h };

  (((h / 2.0).round() as u16 % 180) as u8, s, max)
}
