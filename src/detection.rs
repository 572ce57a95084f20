// 该文件是 Anjian （安检） 项目的一部分。
// src/detection.rs - 检测结果规范化
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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// 规范化后的检测结果，框为原始像素空间的 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f64,
  #[serde(rename = "box")]
  pub bbox: [f64; 4],
}

impl Detection {
  /// 置信度百分比，四舍五入到整数
  pub fn percent(&self) -> i64 {
    (self.confidence * 100.0).round() as i64
  }

  /// 半整数向上取整，`-2.5` 得到 `-2`
  pub fn rounded_box(&self) -> [i64; 4] {
    self.bbox.map(|v| (v + 0.5).floor() as i64)
  }
}

/// 检测器给出的数值，可能是数字也可能是数字字符串
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
  Number(f64),
  Text(String),
}

impl Numeric {
  pub fn to_f64(&self) -> Option<f64> {
    let value = match self {
      Numeric::Number(n) => *n,
      Numeric::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    value.is_finite().then_some(value)
  }
}

/// 检测器支持的两种框编码
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBox {
  Tuple([Numeric; 4]),
  Corners {
    x0: Numeric,
    y0: Numeric,
    x1: Numeric,
    y1: Numeric,
  },
}

impl RawBox {
  /// 按接收到的角点顺序转换为 `[x1, y1, x2, y2]`，不重新排序
  pub fn to_corners(&self) -> Option<[f64; 4]> {
    let corners = match self {
      RawBox::Tuple([a, b, c, d]) => [a, b, c, d],
      RawBox::Corners { x0, y0, x1, y1 } => [x0, y0, x1, y1],
    };
    let [a, b, c, d] = corners.map(Numeric::to_f64);
    Some([a?, b?, c?, d?])
  }
}

#[derive(Debug, Deserialize)]
struct RawDetection {
  label: RawLabel,
  #[serde(default)]
  confidence: Value,
  #[serde(rename = "box", alias = "bbox")]
  bbox: RawBox,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLabel {
  Text(String),
  Number(serde_json::Number),
}

impl From<RawLabel> for String {
  fn from(label: RawLabel) -> Self {
    match label {
      RawLabel::Text(text) => text,
      RawLabel::Number(n) => n.to_string(),
    }
  }
}

#[derive(Error, Debug)]
pub enum MalformedRecordError {
  #[error("记录结构无效: {0}")]
  Shape(#[from] serde_json::Error),
  #[error("边界框坐标无效")]
  InvalidBox,
}

#[derive(Error, Debug, PartialEq)]
pub enum ThresholdInputError {
  #[error("阈值输入为空")]
  Empty,
  #[error("阈值输入不是数字: {0:?}")]
  NotNumeric(String),
  #[error("阈值不是有限值: {0}")]
  NotFinite(f64),
}

/// 置信度转换为 `[0, 1]` 内的有限值，无法解析时为 0
fn coerce_confidence(value: &Value) -> f64 {
  let parsed = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  match parsed {
    Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
    _ => {
      debug!("置信度无法解析，按 0 处理: {}", value);
      0.0
    }
  }
}

fn parse_record(value: &Value) -> Result<Detection, MalformedRecordError> {
  let raw = RawDetection::deserialize(value)?;
  let bbox = raw.bbox.to_corners().ok_or(MalformedRecordError::InvalidBox)?;
  Ok(Detection {
    label: raw.label.into(),
    confidence: coerce_confidence(&raw.confidence),
    bbox,
  })
}

/// 将检测器返回的原始载荷转换为规范化的检测列表，并按阈值过滤
///
/// 单条记录无法解析时只丢弃该条；空载荷或非数组载荷得到空列表。
pub fn normalize(payload: &Value, threshold: ConfidenceThreshold) -> Vec<Detection> {
  let records = match payload {
    Value::Array(records) => records,
    Value::Null => return Vec::new(),
    other => {
      warn!("检测结果不是数组，忽略: {}", other);
      return Vec::new();
    }
  };

  records
    .iter()
    .enumerate()
    .filter_map(|(index, record)| match parse_record(record) {
      Ok(detection) => Some(detection),
      Err(e) => {
        warn!("丢弃第 {} 条检测记录: {}", index, e);
        None
      }
    })
    .filter(|detection| detection.confidence >= threshold.value())
    .collect()
}

/// 已校验的置信度阈值，始终位于 `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceThreshold(f64);

impl Default for ConfidenceThreshold {
  fn default() -> Self {
    ConfidenceThreshold(DEFAULT_CONFIDENCE_THRESHOLD)
  }
}

impl ConfidenceThreshold {
  pub fn value(&self) -> f64 {
    self.0
  }

  /// 有限值会被截断到 `[0, 1]`
  pub fn try_from_value(value: f64) -> Result<Self, ThresholdInputError> {
    if !value.is_finite() {
      return Err(ThresholdInputError::NotFinite(value));
    }
    Ok(ConfidenceThreshold(value.clamp(0.0, 1.0)))
  }

  /// 解析阈值输入框文本，只接受无符号十进制数（如 `0.5`、`.75`、`1.`）
  pub fn parse(input: &str) -> Result<Self, ThresholdInputError> {
    let text = input.trim();
    if text.is_empty() {
      return Err(ThresholdInputError::Empty);
    }
    if !is_unsigned_decimal(text) {
      return Err(ThresholdInputError::NotNumeric(text.to_string()));
    }
    let value = text
      .parse::<f64>()
      .map_err(|_| ThresholdInputError::NotNumeric(text.to_string()))?;
    Self::try_from_value(value)
  }
}

fn is_unsigned_decimal(text: &str) -> bool {
  let mut parts = text.splitn(2, '.');
  let integer = parts.next().unwrap_or_default();
  let fraction = parts.next().unwrap_or_default();
  let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
  all_digits(integer) && all_digits(fraction) && (integer.len() + fraction.len()) > 0
}

/// 阈值设置，拒绝无效输入时保留上一次的有效值
#[derive(Debug, Clone, Default)]
pub struct ThresholdSetting {
  current: ConfidenceThreshold,
}

impl ThresholdSetting {
  pub fn new(initial: ConfidenceThreshold) -> Self {
    Self { current: initial }
  }

  pub fn current(&self) -> ConfidenceThreshold {
    self.current
  }

  /// 应用输入文本；返回阈值是否发生变化
  pub fn apply_input(&mut self, input: &str) -> Result<bool, ThresholdInputError> {
    match ConfidenceThreshold::parse(input) {
      Ok(threshold) => Ok(self.replace(threshold)),
      Err(e) => {
        warn!("阈值输入无效 ({})，保留 {:.2}", e, self.current.value());
        Err(e)
      }
    }
  }

  pub fn apply_value(&mut self, value: f64) -> Result<bool, ThresholdInputError> {
    match ConfidenceThreshold::try_from_value(value) {
      Ok(threshold) => Ok(self.replace(threshold)),
      Err(e) => {
        warn!("阈值无效 ({})，保留 {:.2}", e, self.current.value());
        Err(e)
      }
    }
  }

  fn replace(&mut self, threshold: ConfidenceThreshold) -> bool {
    let changed = threshold != self.current;
    self.current = threshold;
    changed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn at(value: f64) -> ConfidenceThreshold {
    ConfidenceThreshold::try_from_value(value).unwrap()
  }

  #[test]
  fn tuple_and_corner_encodings_agree() {
    let tuples = json!([
      {"label": "knife", "confidence": 0.91, "box": [10, 20, 110, 220]},
      {"label": "gun", "confidence": "0.75", "box": [5.5, 6.5, 7.5, 8.5]},
    ]);
    let corners = json!([
      {"label": "knife", "confidence": 0.91, "box": {"x0": 10, "y0": 20, "x1": 110, "y1": 220}},
      {"label": "gun", "confidence": "0.75", "box": {"x0": 5.5, "y0": 6.5, "x1": 7.5, "y1": 8.5}},
    ]);

    let a = normalize(&tuples, at(0.0));
    let b = normalize(&corners, at(0.0));
    assert_eq!(a.len(), 2);
    assert_eq!(a, b);
    assert_eq!(a[1].confidence, 0.75);
  }

  #[test]
  fn threshold_keeps_order_and_is_inclusive() {
    let payload = json!([
      {"label": "a", "confidence": 0.3, "box": [0, 0, 1, 1]},
      {"label": "b", "confidence": 0.5, "box": [0, 0, 1, 1]},
      {"label": "c", "confidence": 0.91, "box": [0, 0, 1, 1]},
    ]);
    let kept = normalize(&payload, ConfidenceThreshold::default());
    let confidences: Vec<f64> = kept.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.5, 0.91]);
    assert_eq!(kept[0].label, "b");
  }

  #[test]
  fn unparseable_confidence_becomes_zero() {
    let payload = json!([{"label": "x", "confidence": "abc", "box": [1, 2, 3, 4]}]);
    assert!(normalize(&payload, at(0.1)).is_empty());

    let kept = normalize(&payload, at(0.0));
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].confidence, 0.0);

    let missing = json!([{"label": "x", "box": [1, 2, 3, 4]}]);
    assert_eq!(normalize(&missing, at(0.0))[0].confidence, 0.0);
  }

  #[test]
  fn out_of_range_confidence_is_clamped() {
    let payload = json!([
      {"label": "hi", "confidence": 1.5, "box": [0, 0, 1, 1]},
      {"label": "lo", "confidence": "-0.2", "box": [0, 0, 1, 1]},
    ]);
    let kept = normalize(&payload, at(0.0));
    assert_eq!(kept[0].confidence, 1.0);
    assert_eq!(kept[1].confidence, 0.0);
  }

  #[test]
  fn malformed_record_is_dropped_alone() {
    let payload = json!([
      {"label": "ok", "confidence": 0.9, "box": [0, 0, 10, 10]},
      {"label": "no box", "confidence": 0.9},
      {"label": "short box", "confidence": 0.9, "box": [0, 0, 10]},
      {"label": "text box", "confidence": 0.9, "box": ["1", "2", "x", "4"]},
      "not an object",
      {"label": "also ok", "confidence": "0.8", "box": ["1", "2", "3", "4"]},
    ]);
    let kept = normalize(&payload, at(0.5));
    let labels: Vec<&str> = kept.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["ok", "also ok"]);
    assert_eq!(kept[1].bbox, [1.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  fn corner_order_is_preserved() {
    let payload = json!([{"label": "inv", "confidence": 1, "box": {"x0": 50, "y0": 40, "x1": 10, "y1": 5}}]);
    assert_eq!(normalize(&payload, at(0.5))[0].bbox, [50.0, 40.0, 10.0, 5.0]);
  }

  #[test]
  fn empty_or_absent_payload_yields_nothing() {
    assert!(normalize(&json!([]), at(0.0)).is_empty());
    assert!(normalize(&Value::Null, at(0.0)).is_empty());
    assert!(normalize(&json!({"error": "x"}), at(0.0)).is_empty());
  }

  #[test]
  fn label_text_and_percent() {
    let detection = Detection {
      label: "scissors".into(),
      confidence: 0.876,
      bbox: [10.4, 20.6, 30.5, 40.49],
    };
    assert_eq!(detection.percent(), 88);
    assert_eq!(detection.rounded_box(), [10, 21, 31, 40]);
  }

  #[test]
  fn rounded_box_rounds_half_up_for_negative_coordinates() {
    let detection = Detection {
      label: "knife".into(),
      confidence: 0.9,
      bbox: [-2.5, -0.5, -3.6, 2.5],
    };
    assert_eq!(detection.rounded_box(), [-2, 0, -4, 3]);
  }

  #[test]
  fn threshold_input_parsing() {
    assert_eq!(ConfidenceThreshold::parse("0.75").unwrap().value(), 0.75);
    assert_eq!(ConfidenceThreshold::parse(".25").unwrap().value(), 0.25);
    assert_eq!(ConfidenceThreshold::parse("1.").unwrap().value(), 1.0);
    assert_eq!(ConfidenceThreshold::parse("1.7").unwrap().value(), 1.0);
    assert_eq!(ConfidenceThreshold::parse(""), Err(ThresholdInputError::Empty));
    assert!(matches!(
      ConfidenceThreshold::parse("-0.3"),
      Err(ThresholdInputError::NotNumeric(_))
    ));
    assert!(ConfidenceThreshold::parse("abc").is_err());
    assert!(ConfidenceThreshold::parse(".").is_err());
    assert!(ConfidenceThreshold::parse("1e-2").is_err());
    assert!(ConfidenceThreshold::try_from_value(f64::NAN).is_err());
  }

  #[test]
  fn rejected_input_keeps_last_valid_threshold() {
    let mut setting = ThresholdSetting::default();
    assert_eq!(setting.current().value(), 0.5);

    assert_eq!(setting.apply_input("0.8"), Ok(true));
    assert!(setting.apply_input("oops").is_err());
    assert!(setting.apply_value(f64::INFINITY).is_err());
    assert_eq!(setting.current().value(), 0.8);

    assert_eq!(setting.apply_input("0.80"), Ok(false));
    assert_eq!(setting.apply_value(-4.0), Ok(true));
    assert_eq!(setting.current().value(), 0.0);
  }
}
