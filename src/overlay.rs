// 该文件是 Anjian （安检） 项目的一部分。
// src/overlay.rs - 检测框叠加描述
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

use std::fmt;

use serde::{Serialize, Serializer};

use crate::{
  detection::Detection,
  geometry::{DisplayRect, DisplaySize, NativeSize, ScaleTransform, map_box},
};

/// 高危判定的置信度下限（不含）
pub const HIGH_SEVERITY_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl fmt::Display for Color {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let [r, g, b] = self.0;
    write!(f, "rgb({}, {}, {})", r, g, b)
  }
}

impl Serialize for Color {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// 非空调色板
#[derive(Debug, Clone, PartialEq)]
pub struct Palette(Vec<Color>);

impl Default for Palette {
  fn default() -> Self {
    Palette(vec![
      Color([239, 68, 68]),  // red-500
      Color([249, 115, 22]), // orange-500
      Color([234, 179, 8]),  // yellow-500
      Color([236, 72, 153]), // pink-500
    ])
  }
}

impl Palette {
  pub fn new(colors: Vec<Color>) -> Option<Self> {
    (!colors.is_empty()).then_some(Palette(colors))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// 按序号循环取色
  pub fn color_at(&self, index: usize) -> Color {
    self.0[index % self.0.len()]
  }
}

/// 一个待绘制的叠加框
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayItem {
  pub rect: DisplayRect,
  pub color: Color,
  pub label: String,
}

pub fn label_text(detection: &Detection) -> String {
  format!("{} ({}%)", detection.label, detection.percent())
}

/// 根据检测结果和当前显示变换生成叠加框
///
/// 不持有任何跨调用的状态，相同输入总得到相同输出。
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
  palette: Palette,
}

impl OverlayRenderer {
  pub fn new(palette: Palette) -> Self {
    Self { palette }
  }

  pub fn palette(&self) -> &Palette {
    &self.palette
  }

  /// 原始尺寸未知或显示尺寸为空时不生成任何叠加框
  pub fn describe(
    &self,
    detections: &[Detection],
    display: DisplaySize,
    native: NativeSize,
  ) -> Vec<OverlayItem> {
    if display.is_empty() {
      return Vec::new();
    }
    match ScaleTransform::between(native, display) {
      Some(transform) => self.describe_with(detections, transform),
      None => Vec::new(),
    }
  }

  pub fn describe_with(&self, detections: &[Detection], transform: ScaleTransform) -> Vec<OverlayItem> {
    detections
      .iter()
      .enumerate()
      .map(|(index, detection)| OverlayItem {
        rect: map_box(&detection.bbox, transform),
        color: self.palette.color_at(index),
        label: label_text(detection),
      })
      .collect()
  }
}

/// 结果面板的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryLine {
  pub label: String,
  pub percent: i64,
  pub rounded_box: [i64; 4],
  pub high_severity: bool,
}

/// 扫描结果摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ScanSummary {
  Idle,
  Scanning,
  Clear,
  Threats(Vec<SummaryLine>),
  Failed(String),
}

impl ScanSummary {
  pub fn from_detections(detections: &[Detection]) -> Self {
    if detections.is_empty() {
      return ScanSummary::Clear;
    }
    ScanSummary::Threats(
      detections
        .iter()
        .map(|d| SummaryLine {
          label: d.label.clone(),
          percent: d.percent(),
          rounded_box: d.rounded_box(),
          high_severity: d.confidence > HIGH_SEVERITY_CONFIDENCE,
        })
        .collect(),
    )
  }
}

impl fmt::Display for ScanSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ScanSummary::Idle => write!(f, "等待选择图像"),
      ScanSummary::Scanning => write!(f, "正在扫描..."),
      ScanSummary::Clear => write!(f, "未检测到违禁物品"),
      ScanSummary::Threats(lines) => {
        write!(f, "检测到 {} 个可疑物品", lines.len())?;
        for line in lines {
          let [x1, y1, x2, y2] = line.rounded_box;
          write!(
            f,
            "\n  - {}{}: {}% [{}, {}, {}, {}]",
            line.label,
            if line.high_severity { " (高危)" } else { "" },
            line.percent,
            x1,
            y1,
            x2,
            y2
          )?;
        }
        Ok(())
      }
      ScanSummary::Failed(message) => write!(f, "扫描失败: {}", message),
    }
  }
}
