// 该文件是 Anjian （安检） 项目的一部分。
// src/task.rs - 扫描会话的事件循环
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

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

use crate::{
  detection::ThresholdInputError,
  detector::{Detector, DetectorError},
  display::{ContainerObserver, ResizeSubscription},
  geometry::{ContainerSize, NativeSize},
  input::{ImageDecodeError, ImageUpload},
  scan::{ImageTicket, OverlayView, ScanOrchestrator, ScanTicket},
};

/// 异步任务完成后投递回事件循环的消息
#[derive(Debug)]
pub enum ScanEvent {
  ImageMeasured {
    ticket: ImageTicket,
    result: Result<NativeSize, ImageDecodeError>,
  },
  ScanCompleted {
    ticket: ScanTicket,
    result: Result<Value, DetectorError>,
  },
  ContainerResized(ContainerSize),
}

/// 单线程扫描会话
///
/// 尺寸测量和检测请求作为独立任务运行，完成后只通过事件通道把结果交回；
/// 所有状态变更都在 [`ScanSession::dispatch`] 中串行进行。
pub struct ScanSession<D: Detector + 'static> {
  detector: Arc<D>,
  orchestrator: ScanOrchestrator,
  upload: Option<ImageUpload>,
  subscription: Option<ResizeSubscription>,
  events_tx: UnboundedSender<ScanEvent>,
  events_rx: UnboundedReceiver<ScanEvent>,
}

impl<D: Detector + 'static> ScanSession<D> {
  pub fn new(detector: Arc<D>, orchestrator: ScanOrchestrator) -> Self {
    let (events_tx, events_rx) = unbounded_channel();
    Self {
      detector,
      orchestrator,
      upload: None,
      subscription: None,
      events_tx,
      events_rx,
    }
  }

  pub fn orchestrator(&self) -> &ScanOrchestrator {
    &self.orchestrator
  }

  pub fn upload(&self) -> Option<&ImageUpload> {
    self.upload.as_ref()
  }

  pub fn view(&self) -> OverlayView {
    self.orchestrator.view()
  }

  /// 挂载新图像：订阅容器尺寸，开始测量并立即发起检测
  ///
  /// 必须在 tokio 运行时中调用。
  pub fn select(&mut self, upload: ImageUpload, container: &ContainerObserver) -> ImageTicket {
    let ticket = self.orchestrator.select_image();

    self.subscription = None;
    let tx = self.events_tx.clone();
    self.subscription = Some(container.observe(move |size| {
      let _ = tx.send(ScanEvent::ContainerResized(size));
    }));

    let tx = self.events_tx.clone();
    let measuring = upload.clone();
    tokio::task::spawn_blocking(move || {
      let result = measuring.measure();
      let _ = tx.send(ScanEvent::ImageMeasured { ticket, result });
    });

    self.upload = Some(upload);
    self.rescan();
    ticket
  }

  /// 卸载图像并释放容器订阅
  pub fn clear(&mut self) {
    self.orchestrator.clear();
    self.upload = None;
    self.subscription = None;
  }

  /// 对当前图像重新发起检测，之前的请求随之作废
  pub fn rescan(&mut self) -> Option<ScanTicket> {
    let upload = self.upload.clone()?;
    let ticket = self.orchestrator.begin_scan()?;

    let tx = self.events_tx.clone();
    let detector = self.detector.clone();
    tokio::spawn(async move {
      let result = detector.detect(&upload, ticket.threshold()).await;
      let _ = tx.send(ScanEvent::ScanCompleted { ticket, result });
    });

    Some(ticket)
  }

  /// 应用阈值输入，阈值变化且已选中图像时重新扫描
  pub fn apply_threshold_input(&mut self, input: &str) -> Result<bool, ThresholdInputError> {
    let changed = self.orchestrator.apply_threshold_input(input)?;
    if changed {
      info!("阈值变更为 {:.2}", self.orchestrator.threshold().value());
      self.rescan();
    }
    Ok(changed)
  }

  /// 处理一个事件，返回它是否被提交
  pub fn dispatch(&mut self, event: ScanEvent) -> bool {
    match event {
      ScanEvent::ImageMeasured { ticket, result } => self.orchestrator.image_measured(ticket, result),
      ScanEvent::ScanCompleted { ticket, result } => self.orchestrator.scan_completed(ticket, result),
      ScanEvent::ContainerResized(size) => {
        if self.upload.is_none() {
          return false;
        }
        self.orchestrator.container_resized(size).is_some()
      }
    }
  }

  /// 等待并处理下一个事件
  pub async fn step(&mut self) -> bool {
    match self.events_rx.recv().await {
      Some(event) => self.dispatch(event),
      None => false,
    }
  }

  /// 处理所有已到达的事件，不等待
  pub fn drain(&mut self) -> usize {
    let mut handled = 0;
    while let Ok(event) = self.events_rx.try_recv() {
      self.dispatch(event);
      handled += 1;
    }
    handled
  }

  /// 运行事件循环，直到当前图像的测量与检测都已结束
  pub async fn settle(&mut self) -> OverlayView {
    if self.upload.is_none() {
      warn!("没有选中的图像");
      return self.view();
    }
    while !self.orchestrator.is_settled() {
      self.step().await;
    }
    self.drain();
    debug!("会话已稳定: {:?}", self.orchestrator.state());
    self.view()
  }
}
