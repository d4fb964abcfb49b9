// 该文件是 Jusong （橘颂） 项目的一部分。
// src/mask.rs - 二值掩膜与形态学清理
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

use image::{GrayImage, Luma, imageops};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::region_labelling::{Connectivity, connected_components};

/// 二值掩膜，每个元素仅取 0 或 1。
/// 只允许与相同宽高的掩膜或图像组合。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl BinaryMask {
  pub fn new(width: u32, height: u32) -> Self {
    let data = vec![0u8; (width as usize) * (height as usize)].into_boxed_slice();
    Self {
      width,
      height,
      data,
    }
  }

  /// 由原始数据构造，非零值归一为 1。
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
    if data.len() != (width as usize) * (height as usize) {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        (width as usize) * (height as usize),
        data.len()
      );
    }

    let data = data.iter().map(|&v| (v != 0) as u8).collect();
    Self {
      width,
      height,
      data,
    }
  }

  /// 由 0/255 灰度图构造，阈值 127。
  pub fn from_gray(image: &GrayImage) -> Self {
    let (width, height) = image.dimensions();
    let data = image.as_raw().iter().map(|&v| (v > 127) as u8).collect();
    Self {
      width,
      height,
      data,
    }
  }

  /// 转为 0/255 灰度图，供形态学操作与落盘使用。
  pub fn to_gray(&self) -> GrayImage {
    let data: Vec<u8> = self.data.iter().map(|&v| v * 255).collect();
    GrayImage::from_raw(self.width, self.height, data).expect("掩膜数据长度与尺寸不一致")
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn get(&self, x: u32, y: u32) -> u8 {
    self.data[(y as usize) * (self.width as usize) + (x as usize)]
  }

  pub fn set(&mut self, x: u32, y: u32, value: u8) {
    self.data[(y as usize) * (self.width as usize) + (x as usize)] = (value != 0) as u8;
  }

  /// 前景像素总数
  pub fn count_ones(&self) -> u64 {
    self.data.iter().map(|&v| v as u64).sum()
  }

  /// 最近邻缩放，保持 0/1 取值不引入中间灰度。
  pub fn resize_nearest(&self, width: u32, height: u32) -> Self {
    let resized = imageops::resize(&self.to_gray(), width, height, imageops::FilterType::Nearest);
    Self::from_gray(&resized)
  }
}

/// 清理二值掩膜：先闭后开去除孔洞与毛刺，再按连通域面积过滤，
/// 保留区域内部实心填充。
///
/// 病斑掩膜用 (5, 50)，叶片掩膜用 (7, 200)，叶片更粗糙，容忍更强的平滑。
pub fn clean_mask(mask: &BinaryMask, kernel_size: u8, min_area: u32) -> BinaryMask {
  // 形态学操作在 0/255 灰度域上进行，方形结构元边长为 kernel_size
  let gray = mask.to_gray();
  let radius = kernel_size / 2;
  let closed = close(&gray, Norm::LInf, radius);
  let opened = open(&closed, Norm::LInf, radius);

  // 面积严格小于 min_area 的连通域丢弃
  let labels = connected_components(&opened, Connectivity::Eight, Luma([0u8]));
  let label_count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
  let mut areas = vec![0u32; label_count + 1];
  for pixel in labels.pixels() {
    areas[pixel[0] as usize] += 1;
  }

  let (width, height) = opened.dimensions();
  let mut out = GrayImage::new(width, height);
  for (x, y, pixel) in labels.enumerate_pixels() {
    let label = pixel[0] as usize;
    if label != 0 && areas[label] >= min_area {
      out.put_pixel(x, y, Luma([255u8]));
    }
  }

  fill_holes(&mut out);

  BinaryMask::from_gray(&out)
}

// 填充保留区域内部的孔洞，等价于对外轮廓做实心填充：
// 对取反图做四连通标记，未触及图像边界的背景即为孔洞。
fn fill_holes(mask: &mut GrayImage) {
  let (width, height) = mask.dimensions();
  if width == 0 || height == 0 {
    return;
  }

  let inverted = GrayImage::from_fn(width, height, |x, y| {
    if mask.get_pixel(x, y)[0] == 0 {
      Luma([255u8])
    } else {
      Luma([0u8])
    }
  });
  let labels = connected_components(&inverted, Connectivity::Four, Luma([0u8]));

  let label_count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
  let mut touches_border = vec![false; label_count + 1];
  for x in 0..width {
    touches_border[labels.get_pixel(x, 0)[0] as usize] = true;
    touches_border[labels.get_pixel(x, height - 1)[0] as usize] = true;
  }
  for y in 0..height {
    touches_border[labels.get_pixel(0, y)[0] as usize] = true;
    touches_border[labels.get_pixel(width - 1, y)[0] as usize] = true;
  }

  for (x, y, pixel) in labels.enumerate_pixels() {
    let label = pixel[0] as usize;
    if label != 0 && !touches_border[label] {
      mask.put_pixel(x, y, Luma([255u8]));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mask_with_rect(width: u32, height: u32, x0: u32, y0: u32, w: u32, h: u32) -> BinaryMask {
    let mut mask = BinaryMask::new(width, height);
    for y in y0..y0 + h {
      for x in x0..x0 + w {
        mask.set(x, y, 1);
      }
    }
    mask
  }

  #[test]
  fn from_raw_normalizes_values() {
    let mask = BinaryMask::from_raw(2, 2, vec![0, 1, 128, 255]);
    assert_eq!(mask.get(0, 0), 0);
    assert_eq!(mask.get(1, 0), 1);
    assert_eq!(mask.get(0, 1), 1);
    assert_eq!(mask.get(1, 1), 1);
  }

  #[test]
  #[should_panic]
  fn from_raw_rejects_length_mismatch() {
    let _ = BinaryMask::from_raw(3, 3, vec![0; 4]);
  }

  #[test]
  fn clean_removes_speckle_noise() {
    // 3x3 斑点小于结构元，开运算即可去除
    let mask = mask_with_rect(40, 40, 10, 10, 3, 3);
    let cleaned = clean_mask(&mask, 5, 50);
    assert_eq!(cleaned.count_ones(), 0);
  }

  #[test]
  fn clean_keeps_large_region() {
    let mask = mask_with_rect(60, 60, 10, 10, 20, 20);
    let cleaned = clean_mask(&mask, 5, 50);
    // 方形区域经开闭运算后主体保留
    assert!(cleaned.count_ones() > 350);
    assert!(cleaned.count_ones() <= 400);
    assert_eq!(cleaned.get(20, 20), 1);
  }

  #[test]
  fn clean_filters_by_min_area() {
    let mask = mask_with_rect(60, 60, 10, 10, 6, 6);
    assert_eq!(clean_mask(&mask, 5, 50).count_ones(), 0);
    assert!(clean_mask(&mask, 5, 10).count_ones() > 0);
  }

  #[test]
  fn clean_fills_interior_holes() {
    // 40x40 区域中央挖 10x10 孔，孔大于结构元，闭运算无法填补
    let mut mask = mask_with_rect(80, 80, 10, 10, 40, 40);
    for y in 25..35 {
      for x in 25..35 {
        mask.set(x, y, 0);
      }
    }

    let cleaned = clean_mask(&mask, 5, 50);
    assert_eq!(cleaned.get(30, 30), 1);
    assert!(cleaned.count_ones() > 1550);
  }

  #[test]
  fn clean_is_idempotent_on_cleaned_mask() {
    let mut mask = mask_with_rect(80, 80, 20, 20, 30, 30);
    // 散布一些孤立噪点
    mask.set(2, 2, 1);
    mask.set(70, 5, 1);
    mask.set(5, 70, 1);

    let once = clean_mask(&mask, 5, 50);
    let twice = clean_mask(&once, 5, 50);
    assert_eq!(once, twice);
  }

  #[test]
  fn resize_nearest_keeps_values_binary() {
    let mask = mask_with_rect(64, 64, 16, 16, 32, 32);
    let resized = mask.resize_nearest(200, 150);
    let total = (resized.width() * resized.height()) as u64;
    assert!(resized.count_ones() > 0);
    assert!(resized.count_ones() < total);
  }

  #[test]
  fn resize_nearest_round_trip_preserves_proportion() {
    let mask = mask_with_rect(64, 64, 16, 16, 32, 32);
    let proportion = mask.count_ones() as f64 / (64.0 * 64.0);

    let back = mask.resize_nearest(200, 150).resize_nearest(64, 64);
    let back_proportion = back.count_ones() as f64 / (64.0 * 64.0);

    assert!((proportion - back_proportion).abs() < 0.02);
  }
}
