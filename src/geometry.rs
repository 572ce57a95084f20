// 该文件是 Anjian （安检） 项目的一部分。
// src/geometry.rs - 原始像素空间与显示空间之间的坐标换算
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

use serde::Serialize;

/// 图像解码后的原始像素尺寸
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NativeSize {
  pub width: f64,
  pub height: f64,
}

/// 容器的测量尺寸
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContainerSize {
  pub width: f64,
  pub height: f64,
}

/// 图像在屏幕上的显示尺寸
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DisplaySize {
  pub width: f64,
  pub height: f64,
}

/// 原始像素坐标到显示坐标的缩放系数
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleTransform {
  pub scale_x: f64,
  pub scale_y: f64,
}

/// 显示空间中的矩形（CSS 像素）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayRect {
  pub left: f64,
  pub top: f64,
  pub width: f64,
  pub height: f64,
}

impl NativeSize {
  pub fn new(width: f64, height: f64) -> Self {
    Self { width, height }
  }

  /// 宽高均为正的有限值
  pub fn is_known(&self) -> bool {
    is_positive(self.width) && is_positive(self.height)
  }
}

impl From<(u32, u32)> for NativeSize {
  fn from((width, height): (u32, u32)) -> Self {
    Self::new(width as f64, height as f64)
  }
}

impl ContainerSize {
  pub fn new(width: f64, height: f64) -> Self {
    Self { width, height }
  }

  /// 容器尚未完成布局时宽或高为零
  pub fn is_laid_out(&self) -> bool {
    is_positive(self.width) && is_positive(self.height)
  }
}

impl DisplaySize {
  pub const ZERO: DisplaySize = DisplaySize {
    width: 0.0,
    height: 0.0,
  };

  pub fn new(width: f64, height: f64) -> Self {
    Self { width, height }
  }

  pub fn is_empty(&self) -> bool {
    !(is_positive(self.width) && is_positive(self.height))
  }
}

impl ScaleTransform {
  pub const IDENTITY: ScaleTransform = ScaleTransform {
    scale_x: 1.0,
    scale_y: 1.0,
  };

  pub fn new(scale_x: f64, scale_y: f64) -> Self {
    Self { scale_x, scale_y }
  }

  /// 由原始尺寸和显示尺寸推导缩放系数，原始尺寸未知时返回 None
  pub fn between(native: NativeSize, display: DisplaySize) -> Option<Self> {
    if !native.is_known() {
      return None;
    }
    Some(Self {
      scale_x: display.width / native.width,
      scale_y: display.height / native.height,
    })
  }
}

fn is_positive(value: f64) -> bool {
  value.is_finite() && value > 0.0
}

/// 在保持宽高比的前提下，计算能完整放入容器的最大显示尺寸
///
/// `scale = min(cw / w, ch / h)`，显示尺寸为 `native * scale`。
/// 原始尺寸未知或容器尚未布局时返回 [`DisplaySize::ZERO`]。
pub fn compute_display_size(native: NativeSize, container: ContainerSize) -> DisplaySize {
  if !native.is_known() || !container.is_laid_out() {
    return DisplaySize::ZERO;
  }

  let scale = (container.width / native.width).min(container.height / native.height);

  DisplaySize {
    width: native.width * scale,
    height: native.height * scale,
  }
}

/// 将原始像素空间的 `[x1, y1, x2, y2]` 映射为显示空间矩形
///
/// 结果不会被裁剪到容器内，越过图像边缘的框会部分落在图像外。
/// 反转的框得到非正的宽高，由绘制端视为不可见。
pub fn map_box(bbox: &[f64; 4], transform: ScaleTransform) -> DisplayRect {
  let [x1, y1, x2, y2] = *bbox;
  DisplayRect {
    left: x1 * transform.scale_x,
    top: y1 * transform.scale_y,
    width: (x2 - x1) * transform.scale_x,
    height: (y2 - y1) * transform.scale_y,
  }
}

impl DisplayRect {
  /// 宽或高不为正时矩形不可见
  pub fn is_visible(&self) -> bool {
    is_positive(self.width) && is_positive(self.height)
  }
}
