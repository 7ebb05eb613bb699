// 该文件是 Shanan （山南西风） RT-DETR 部署项目的一部分。
// src/utils.rs - 数值工具
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

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 最大值的下标；并列时取第一个。空切片返回 None
pub fn argmax(values: &[f32]) -> Option<usize> {
  let mut iter = values.iter().enumerate();
  let (mut best_idx, mut best) = iter.next().map(|(i, &v)| (i, v))?;
  for (i, &v) in iter {
    if v > best {
      best = v;
      best_idx = i;
    }
  }
  Some(best_idx)
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;

  #[test]
  fn sigmoid_of_zero_is_half() {
    assert_eq!(sigmoid(0.0), 0.5);
  }

  #[test]
  fn argmax_prefers_first_of_equal_maxima() {
    assert_eq!(argmax(&[0.1, 0.9, 0.3, 0.9]), Some(1));
    assert_eq!(argmax(&[-2.0, -1.0, -1.0]), Some(1));
    assert_eq!(argmax(&[5.0]), Some(0));
    assert_eq!(argmax(&[]), None);
  }

  proptest! {
    #[test]
    fn sigmoid_is_monotonic(a in -30.0f32..30.0, b in -30.0f32..30.0) {
      let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
      prop_assert!(sigmoid(lo) <= sigmoid(hi));
    }

    #[test]
    fn sigmoid_stays_in_unit_interval(x in -80.0f32..80.0) {
      let y = sigmoid(x);
      prop_assert!((0.0..=1.0).contains(&y));
    }
  }
}
