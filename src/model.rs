// 该文件是 Jusong （橘颂） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

use crate::preprocess::InputTensor;

/// 柑橘病害类别名称，顺序必须与训练时一致。
/// 顺序错位是无法探测的静默错误，扩展时只能追加。
pub const CITRUS_CLASSES: [&str; 5] = ["Blackspot", "Canker", "Greening", "Healthy", "Melanose"];

// 键值映射输出的别名表，按声明顺序探测，保证解析可复现
const MASK_KEYS: [&str; 3] = ["mask", "pred_mask", "seg"];
const CLASS_KEYS: [&str; 3] = ["class", "pred_class", "label"];

/// 带形状的浮点张量
#[derive(Debug, Clone)]
pub struct Tensor {
  data: Box<[f32]>,
  shape: Box<[usize]>,
}

impl Tensor {
  pub fn new(data: Vec<f32>, shape: &[usize]) -> Self {
    let expected: usize = shape.iter().product();
    if data.len() != expected {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      );
    }

    Self {
      data: data.into_boxed_slice(),
      shape: shape.into(),
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

/// 模型原始输出的三种形态，在编排层边界一次性解析。
#[derive(Debug, Clone)]
pub enum ModelOutput {
  /// 有序二元组：(掩膜概率, 类别概率)
  Pair { mask: Tensor, class: Tensor },
  /// 键值映射，按别名表解析，缺失的键视为不存在
  Keyed(Vec<(String, Tensor)>),
  /// 单数组，整体视作掩膜（仅分割，无分类分支）
  Single(Tensor),
}

/// 解析后的规范结构
#[derive(Debug, Clone)]
pub struct ResolvedOutput {
  pub mask: Tensor,
  pub class: Option<Tensor>,
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("模型未返回分割输出")]
  MissingSegmentationOutput,
  #[error("掩膜概率形状异常: {0:?}")]
  UnexpectedMaskShape(Box<[usize]>),
}

impl ModelOutput {
  /// 解析为 `{mask, class?}`，任何形态都拿不到掩膜输出时报错。
  pub fn resolve(self) -> Result<ResolvedOutput, OutputError> {
    match self {
      ModelOutput::Pair { mask, class } => Ok(ResolvedOutput {
        mask,
        class: Some(class),
      }),
      ModelOutput::Keyed(mut entries) => {
        let mask =
          take_by_alias(&mut entries, &MASK_KEYS).ok_or(OutputError::MissingSegmentationOutput)?;
        let class = take_by_alias(&mut entries, &CLASS_KEYS);
        Ok(ResolvedOutput { mask, class })
      }
      ModelOutput::Single(mask) => Ok(ResolvedOutput { mask, class: None }),
    }
  }
}

fn take_by_alias(entries: &mut Vec<(String, Tensor)>, keys: &[&str]) -> Option<Tensor> {
  for key in keys {
    if let Some(position) = entries.iter().position(|(name, _)| name == key) {
      return Some(entries.remove(position).1);
    }
  }
  None
}

/// 病害分割模型的调用契约。
///
/// 模型在进程启动时加载一次，此后只读；实现方是否支持并发调用
/// 由推理运行时决定，核心一律按串行访问对待。
pub trait Model {
  type Error;

  /// 对单张输入张量执行一次推理
  fn infer(&self, input: &InputTensor) -> Result<ModelOutput, Self::Error>;
}

mod mask_file;
pub use self::mask_file::{MaskFileModel, MaskFileModelError};

#[cfg(test)]
mod tests {
  use super::*;

  fn tensor(len: usize) -> Tensor {
    Tensor::new(vec![0.5; len], &[1, len])
  }

  #[test]
  #[should_panic]
  fn tensor_rejects_shape_mismatch() {
    let _ = Tensor::new(vec![0.0; 5], &[1, 2, 3]);
  }

  #[test]
  fn pair_resolves_in_order() {
    let resolved = ModelOutput::Pair {
      mask: tensor(4),
      class: tensor(5),
    }
    .resolve()
    .unwrap();

    assert_eq!(resolved.mask.data().len(), 4);
    assert_eq!(resolved.class.unwrap().data().len(), 5);
  }

  #[test]
  fn single_resolves_without_classification() {
    let resolved = ModelOutput::Single(tensor(4)).resolve().unwrap();
    assert!(resolved.class.is_none());
  }

  #[test]
  fn keyed_probes_aliases_in_declared_order() {
    let resolved = ModelOutput::Keyed(vec![
      ("label".to_string(), tensor(5)),
      ("seg".to_string(), tensor(4)),
    ])
    .resolve()
    .unwrap();

    assert_eq!(resolved.mask.data().len(), 4);
    assert_eq!(resolved.class.unwrap().data().len(), 5);
  }

  #[test]
  fn keyed_prefers_first_alias() {
    let resolved = ModelOutput::Keyed(vec![
      ("pred_mask".to_string(), tensor(3)),
      ("mask".to_string(), tensor(4)),
    ])
    .resolve()
    .unwrap();

    // "mask" 在别名表里先于 "pred_mask"
    assert_eq!(resolved.mask.data().len(), 4);
  }

  #[test]
  fn keyed_without_mask_output_is_an_error() {
    let err = ModelOutput::Keyed(vec![("class".to_string(), tensor(5))])
      .resolve()
      .unwrap_err();

    assert!(matches!(err, OutputError::MissingSegmentationOutput));
  }
}
