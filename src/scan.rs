// 该文件是 Anjian （安检） 项目的一部分。
// src/scan.rs - 扫描状态机
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
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  detection::{ConfidenceThreshold, Detection, ThresholdInputError, ThresholdSetting, normalize},
  detector::DetectorError,
  display::DisplaySizeTracker,
  geometry::{ContainerSize, DisplaySize, NativeSize},
  input::ImageDecodeError,
  overlay::{OverlayItem, OverlayRenderer, ScanSummary},
};

/// 一次图像选择的身份，每次选择都会递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageTicket(u64);

/// 一次检测请求的身份，记录发起时的图像和阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanTicket {
  image: ImageTicket,
  serial: u64,
  threshold: ConfidenceThreshold,
}

impl ScanTicket {
  pub fn image(&self) -> ImageTicket {
    self.image
  }

  pub fn threshold(&self) -> ConfidenceThreshold {
    self.threshold
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScanState {
  #[default]
  Idle,
  Scanning,
  Scanned(Vec<Detection>),
  Failed(String),
}

/// 当前图像的尺寸测量进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
  Pending,
  Measured,
  Unavailable,
}

/// 某一时刻需要绘制的全部内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayView {
  pub native: Option<NativeSize>,
  pub display: DisplaySize,
  pub items: Vec<OverlayItem>,
  pub summary: ScanSummary,
}

/// 管理图像选择、尺寸与检测结果
///
/// 所有异步结果都带着发起时的票据回到这里，只有属于当前图像
/// （以及当前请求）的结果才会被提交。
#[derive(Debug, Default)]
pub struct ScanOrchestrator {
  next_serial: u64,
  image: Option<ImageTicket>,
  pending_scan: Option<ScanTicket>,
  geometry: Option<Geometry>,
  state: ScanState,
  tracker: DisplaySizeTracker,
  threshold: ThresholdSetting,
  renderer: OverlayRenderer,
}

impl ScanOrchestrator {
  pub fn new(renderer: OverlayRenderer, threshold: ConfidenceThreshold) -> Self {
    Self {
      renderer,
      threshold: ThresholdSetting::new(threshold),
      ..Self::default()
    }
  }

  fn next_serial(&mut self) -> u64 {
    self.next_serial += 1;
    self.next_serial
  }

  /// 选择新图像：回到 Idle，并一次性清空尺寸与检测结果
  pub fn select_image(&mut self) -> ImageTicket {
    let ticket = ImageTicket(self.next_serial());
    self.image = Some(ticket);
    self.pending_scan = None;
    self.geometry = Some(Geometry::Pending);
    self.state = ScanState::Idle;
    self.tracker.reset();
    info!("选择新图像 #{}", ticket.0);
    ticket
  }

  pub fn clear(&mut self) {
    self.image = None;
    self.pending_scan = None;
    self.geometry = None;
    self.state = ScanState::Idle;
    self.tracker.reset();
    info!("清除当前图像");
  }

  pub fn current_image(&self) -> Option<ImageTicket> {
    self.image
  }

  pub fn is_current(&self, ticket: ImageTicket) -> bool {
    self.image == Some(ticket)
  }

  /// 提交图像尺寸测量结果；不属于当前图像时丢弃并返回 false
  pub fn image_measured(
    &mut self,
    ticket: ImageTicket,
    result: Result<NativeSize, ImageDecodeError>,
  ) -> bool {
    if !self.is_current(ticket) {
      debug!("丢弃过期的尺寸测量结果 #{}", ticket.0);
      return false;
    }

    match result {
      Ok(native) => {
        let display_size = self.tracker.set_native_size(native);
        self.geometry = Some(if native.is_known() {
          Geometry::Measured
        } else {
          Geometry::Unavailable
        });
        debug!(
          "图像原始尺寸 {}x{}，显示尺寸 {:.1}x{:.1}",
          native.width, native.height, display_size.width, display_size.height
        );
      }
      Err(e) => {
        warn!("图像无法解码，不显示叠加框: {}", e);
        self.tracker.native_unavailable();
        self.geometry = Some(Geometry::Unavailable);
      }
    }
    true
  }

  pub fn container_resized(&mut self, container: ContainerSize) -> Option<DisplaySize> {
    self.tracker.container_resized(container)
  }

  /// 发起检测：立即进入 Scanning 并清空旧结果；没有选中图像时返回 None
  pub fn begin_scan(&mut self) -> Option<ScanTicket> {
    let image = self.image?;
    let ticket = ScanTicket {
      image,
      serial: self.next_serial(),
      threshold: self.threshold.current(),
    };
    self.pending_scan = Some(ticket);
    self.state = ScanState::Scanning;
    info!(
      "开始扫描图像 #{} (阈值 {:.2})",
      image.0,
      ticket.threshold.value()
    );
    Some(ticket)
  }

  /// 提交检测结果；不是最近一次请求时丢弃并返回 false
  pub fn scan_completed(
    &mut self,
    ticket: ScanTicket,
    result: Result<Value, DetectorError>,
  ) -> bool {
    let is_pending = self
      .pending_scan
      .is_some_and(|pending| pending.serial == ticket.serial && pending.image == ticket.image);
    if !is_pending || !self.is_current(ticket.image) {
      debug!("丢弃过期的检测结果 (图像 #{})", ticket.image.0);
      return false;
    }

    self.pending_scan = None;
    self.state = match result {
      Ok(payload) => {
        let detections = normalize(&payload, ticket.threshold);
        info!("扫描完成，检测到 {} 个目标", detections.len());
        ScanState::Scanned(detections)
      }
      Err(e) => {
        warn!("扫描失败: {}", e);
        ScanState::Failed(e.to_string())
      }
    };
    true
  }

  /// 应用阈值输入；返回阈值是否变化（变化后应重新扫描）
  pub fn apply_threshold_input(&mut self, input: &str) -> Result<bool, ThresholdInputError> {
    self.threshold.apply_input(input)
  }

  pub fn threshold(&self) -> ConfidenceThreshold {
    self.threshold.current()
  }

  pub fn state(&self) -> &ScanState {
    &self.state
  }

  pub fn geometry(&self) -> Option<Geometry> {
    self.geometry
  }

  pub fn detections(&self) -> &[Detection] {
    match &self.state {
      ScanState::Scanned(detections) => detections,
      _ => &[],
    }
  }

  pub fn native_size(&self) -> Option<NativeSize> {
    self.tracker.native_size()
  }

  pub fn display_size(&self) -> DisplaySize {
    self.tracker.display_size()
  }

  /// 尺寸测量与检测均已结束
  pub fn is_settled(&self) -> bool {
    let measured = !matches!(self.geometry, Some(Geometry::Pending));
    measured && self.pending_scan.is_none()
  }

  pub fn overlay(&self) -> Vec<OverlayItem> {
    match self.tracker.native_size() {
      Some(native) => self
        .renderer
        .describe(self.detections(), self.tracker.display_size(), native),
      None => Vec::new(),
    }
  }

  pub fn summary(&self) -> ScanSummary {
    match &self.state {
      ScanState::Idle => ScanSummary::Idle,
      ScanState::Scanning => ScanSummary::Scanning,
      ScanState::Scanned(detections) => ScanSummary::from_detections(detections),
      ScanState::Failed(message) => ScanSummary::Failed(message.clone()),
    }
  }

  pub fn view(&self) -> OverlayView {
    OverlayView {
      native: self.tracker.native_size(),
      display: self.tracker.display_size(),
      items: self.overlay(),
      summary: self.summary(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn orchestrator_in(container: ContainerSize) -> ScanOrchestrator {
    let mut orchestrator = ScanOrchestrator::default();
    orchestrator.container_resized(container);
    orchestrator
  }

  fn payload(label: &str) -> Value {
    json!([{"label": label, "confidence": 0.9, "box": [100, 100, 500, 400]}])
  }

  #[test]
  fn full_scan_produces_overlay() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    let image = orchestrator.select_image();
    let scan = orchestrator.begin_scan().unwrap();
    assert_eq!(orchestrator.state(), &ScanState::Scanning);
    assert!(!orchestrator.is_settled());

    assert!(orchestrator.scan_completed(scan, Ok(payload("knife"))));
    assert!(orchestrator.overlay().is_empty());

    assert!(orchestrator.image_measured(image, Ok(NativeSize::new(1000.0, 600.0))));
    assert!(orchestrator.is_settled());

    let view = orchestrator.view();
    assert_eq!(view.display, DisplaySize::new(400.0, 240.0));
    assert_eq!(view.items.len(), 1);
    assert!((view.items[0].rect.left - 40.0).abs() < 1e-9);
    assert_eq!(view.items[0].label, "knife (90%)");
  }

  #[test]
  fn stale_scan_for_previous_image_is_discarded() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    let _a = orchestrator.select_image();
    let scan_a = orchestrator.begin_scan().unwrap();

    let b = orchestrator.select_image();
    let scan_b = orchestrator.begin_scan().unwrap();
    orchestrator.image_measured(b, Ok(NativeSize::new(100.0, 100.0)));

    assert!(!orchestrator.scan_completed(scan_a, Ok(payload("from-a"))));
    assert_eq!(orchestrator.state(), &ScanState::Scanning);
    assert!(orchestrator.overlay().is_empty());

    assert!(orchestrator.scan_completed(scan_b, Ok(payload("from-b"))));
    assert_eq!(orchestrator.detections()[0].label, "from-b");
  }

  #[test]
  fn stale_measurement_is_discarded() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    let a = orchestrator.select_image();
    let b = orchestrator.select_image();

    assert!(!orchestrator.image_measured(a, Ok(NativeSize::new(1000.0, 600.0))));
    assert!(orchestrator.native_size().is_none());
    assert!(orchestrator.image_measured(b, Ok(NativeSize::new(200.0, 400.0))));
    assert_eq!(orchestrator.display_size(), DisplaySize::new(200.0, 400.0));
  }

  #[test]
  fn rescan_supersedes_earlier_request_for_same_image() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    orchestrator.select_image();
    let first = orchestrator.begin_scan().unwrap();
    assert_eq!(orchestrator.apply_threshold_input("0.95"), Ok(true));
    let second = orchestrator.begin_scan().unwrap();
    assert_eq!(second.threshold().value(), 0.95);

    assert!(!orchestrator.scan_completed(first, Ok(payload("old"))));
    assert!(orchestrator.scan_completed(second, Ok(payload("new"))));
    assert!(orchestrator.detections().is_empty());
    assert_eq!(orchestrator.summary(), ScanSummary::Clear);
  }

  #[test]
  fn failure_shows_no_overlay_and_clears_previous_results() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    let image = orchestrator.select_image();
    orchestrator.image_measured(image, Ok(NativeSize::new(400.0, 400.0)));
    let scan = orchestrator.begin_scan().unwrap();
    orchestrator.scan_completed(scan, Ok(payload("knife")));
    assert_eq!(orchestrator.overlay().len(), 1);

    let retry = orchestrator.begin_scan().unwrap();
    assert!(orchestrator.overlay().is_empty());
    orchestrator.scan_completed(retry, Err(DetectorError::Status(502, "bad gateway".into())));
    assert!(matches!(orchestrator.state(), ScanState::Failed(_)));
    assert!(orchestrator.overlay().is_empty());
    assert!(matches!(orchestrator.summary(), ScanSummary::Failed(_)));
  }

  #[test]
  fn decode_failure_suppresses_overlay() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    let image = orchestrator.select_image();
    let scan = orchestrator.begin_scan().unwrap();
    orchestrator.image_measured(
      image,
      Err(ImageDecodeError::UnsupportedFormat("Gif".into())),
    );
    orchestrator.scan_completed(scan, Ok(payload("knife")));

    assert_eq!(orchestrator.geometry(), Some(Geometry::Unavailable));
    assert!(orchestrator.is_settled());
    assert_eq!(orchestrator.detections().len(), 1);
    assert!(orchestrator.overlay().is_empty());
  }

  #[test]
  fn selecting_or_clearing_resets_everything_together() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    let image = orchestrator.select_image();
    orchestrator.image_measured(image, Ok(NativeSize::new(400.0, 400.0)));
    let scan = orchestrator.begin_scan().unwrap();
    orchestrator.scan_completed(scan, Ok(payload("knife")));

    orchestrator.select_image();
    assert_eq!(orchestrator.state(), &ScanState::Idle);
    assert!(orchestrator.native_size().is_none());
    assert_eq!(orchestrator.display_size(), DisplaySize::ZERO);
    assert!(orchestrator.overlay().is_empty());

    orchestrator.clear();
    assert!(orchestrator.current_image().is_none());
    assert!(orchestrator.begin_scan().is_none());
    assert_eq!(orchestrator.summary(), ScanSummary::Idle);
  }

  #[test]
  fn resize_moves_overlay() {
    let mut orchestrator = orchestrator_in(ContainerSize::new(400.0, 400.0));
    let image = orchestrator.select_image();
    orchestrator.image_measured(image, Ok(NativeSize::new(1000.0, 600.0)));
    let scan = orchestrator.begin_scan().unwrap();
    orchestrator.scan_completed(scan, Ok(payload("knife")));

    orchestrator.container_resized(ContainerSize::new(200.0, 200.0));
    let rect = orchestrator.overlay()[0].rect;
    assert!((rect.left - 20.0).abs() < 1e-9);
    assert!((rect.width - 80.0).abs() < 1e-9);
  }
}
