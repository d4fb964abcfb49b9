// 该文件是 Jusong （橘颂） 项目的一部分。
// src/pipeline.rs - 推理编排
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
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::artifacts::{self, ArtifactPaths};
use crate::mask::{BinaryMask, clean_mask};
use crate::model::{CITRUS_CLASSES, Model, OutputError, Tensor};
use crate::preprocess;
use crate::severity::{Severity, calculate_severity};

/// 模型固定输入分辨率
pub const MODEL_INPUT_SIZE: (u32, u32) = (128, 128);
/// 掩膜概率二值化阈值
pub const MASK_THRESHOLD: f32 = 0.5;

// 病斑掩膜清理参数
const DISEASE_KERNEL_SIZE: u8 = 5;
const DISEASE_MIN_AREA: u32 = 50;

/// 分类分支结果
#[derive(Debug, Clone)]
pub struct Classification {
  pub class_name: String,
  pub confidence: f32,
}

/// 单次预测结果
#[derive(Debug, Clone)]
pub struct Prediction {
  pub uid: String,
  pub classification: Option<Classification>,
  pub label: Severity,
  pub percent: f64,
  pub artifacts: ArtifactPaths,
}

/// 推理流水线：预处理 → 模型调用 → 掩膜清理与缩放 → 叶片估计 →
/// 严重程度计算 → 产物落盘。整条链路中唯一知道模型调用契约的组件。
pub struct Pipeline<M> {
  model: M,
  output_dir: PathBuf,
  input_size: (u32, u32),
  threshold: f32,
}

impl<M> Pipeline<M> {
  pub fn new(model: M, output_dir: impl Into<PathBuf>) -> Self {
    Self {
      model,
      output_dir: output_dir.into(),
      input_size: MODEL_INPUT_SIZE,
      threshold: MASK_THRESHOLD,
    }
  }

  pub fn with_input_size(mut self, input_size: (u32, u32)) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }
}

impl<M> Pipeline<M>
where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  /// 对单张图片执行完整流水线。
  ///
  /// 任一步骤失败即终止本次请求，不重试，不影响进程级状态。
  pub fn run(&self, image_path: &Path) -> Result<Prediction> {
    let uid = request_uid();
    info!("[{}] 处理图片: {}", uid, image_path.display());

    let (tensor, (orig_h, orig_w)) = preprocess::prepare(image_path, self.input_size)
      .with_context(|| format!("无法读取图片: {}", image_path.display()))?;

    let now = Instant::now();
    let output = self.model.infer(&tensor).context("模型推理失败")?;
    info!("[{}] 推理完成，耗时: {:.2?}", uid, now.elapsed());

    let resolved = output.resolve()?;

    let mask = threshold_mask(&resolved.mask, self.threshold)?;
    let mask = clean_mask(&mask, DISEASE_KERNEL_SIZE, DISEASE_MIN_AREA);
    // 最近邻缩放回原始分辨率，保持 0/1 取值不需要二次阈值化
    let disease_full = mask.resize_nearest(orig_w, orig_h);
    debug!("[{}] 病斑像素（原始分辨率）: {}", uid, disease_full.count_ones());

    let classification = resolved.class.as_ref().and_then(classify);
    if let Some(result) = &classification {
      info!(
        "[{}] 预测类别: {} ({:.2})",
        uid, result.class_name, result.confidence
      );
    }

    // 叶片掩膜始终从原图重新估计；外部掩膜入口见 calculate_severity
    let severity = calculate_severity(&disease_full, None, image_path)?;
    info!(
      "[{}] 严重程度: {} ({:.2}%)",
      uid, severity.label, severity.percent
    );

    let artifact_paths = artifacts::write_images(&self.output_dir, &uid, image_path, &disease_full)?;
    let record = prediction_record(&uid, image_path, &classification, &severity.label, severity.percent, &artifact_paths);
    artifacts::write_record(&artifact_paths.record, &record)?;

    Ok(Prediction {
      uid,
      classification,
      label: severity.label,
      percent: severity.percent,
      artifacts: artifact_paths,
    })
  }
}

// 每个请求一个 8 位十六进制短标识，产物文件名以此隔离
fn request_uid() -> String {
  Uuid::new_v4().to_string()[..8].to_string()
}

/// 取批次首样本、压掉末尾单通道维，再按阈值二值化。
fn threshold_mask(probs: &Tensor, threshold: f32) -> Result<BinaryMask, OutputError> {
  let shape = probs.shape();
  let (height, width) = match *shape {
    [1, h, w] => (h, w),
    [1, h, w, 1] => (h, w),
    _ => return Err(OutputError::UnexpectedMaskShape(shape.into())),
  };

  let mut mask = BinaryMask::new(width as u32, height as u32);
  for (index, &p) in probs.data().iter().enumerate() {
    if p > threshold {
      mask.set((index % width) as u32, (index / width) as u32, 1);
    }
  }
  Ok(mask)
}

/// 类别概率取 argmax；索引越界时退化为字符串编号。
fn classify(probs: &Tensor) -> Option<Classification> {
  let shape = probs.shape();
  let sample: &[f32] = if shape.len() >= 2 && shape[0] == 1 {
    let sample_len: usize = shape[1..].iter().product();
    &probs.data()[..sample_len]
  } else {
    probs.data()
  };

  // 与 argmax 一致：并列时取最先出现的索引
  let mut index = 0;
  let mut confidence = *sample.first()?;
  for (i, &p) in sample.iter().enumerate().skip(1) {
    if p > confidence {
      index = i;
      confidence = p;
    }
  }

  let class_name = CITRUS_CLASSES
    .get(index)
    .map(|name| name.to_string())
    .unwrap_or_else(|| index.to_string());

  Some(Classification {
    class_name,
    confidence,
  })
}

fn prediction_record(
  uid: &str,
  image_path: &Path,
  classification: &Option<Classification>,
  label: &Severity,
  percent: f64,
  paths: &ArtifactPaths,
) -> serde_json::Value {
  serde_json::json!({
    "uid": uid,
    "filename": image_path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned()),
    "predicted_class": classification.as_ref().map(|c| c.class_name.clone()),
    "predicted_class_prob": classification.as_ref().map(|c| c.confidence),
    "severity_label": label.to_string(),
    "severity_percent": (percent * 100.0).round() / 100.0,
    "mask": paths.mask.to_string_lossy(),
    "overlay": paths.overlay.to_string_lossy(),
    "recorded_at": Utc::now().to_rfc3339(),
  })
}
