// 该文件是 Anjian （安检） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use anjian::{
  FromUrl,
  config::BackendConfig,
  detection::ConfidenceThreshold,
  detector::HttpDetector,
  display::ContainerObserver,
  input::ImageUpload,
  output::{OutputWrapper, Render},
  overlay::OverlayRenderer,
  scan::ScanOrchestrator,
  task::ScanSession,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let args = args::Args::parse();

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("无法创建 tokio 运行时")?;

  runtime.block_on(run(args))
}

async fn run(args: args::Args) -> Result<()> {
  let endpoint = match args.detector {
    Some(url) => url,
    None => BackendConfig::from_env()
      .detector_url()
      .context("未指定检测服务地址")?,
  };
  info!("检测服务: {}", endpoint);
  let detector = HttpDetector::from_url(&endpoint)?;

  let upload = ImageUpload::from_url(&args.input)?;
  info!(
    "输入图像: {} ({}, {} 字节)",
    upload.file_name(),
    upload.mime_type(),
    upload.bytes().len()
  );

  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  let mut containers = args.container.into_iter();
  let observer = ContainerObserver::new();
  if let Some(first) = containers.next() {
    observer.measure(first);
  }

  let orchestrator = ScanOrchestrator::new(OverlayRenderer::default(), ConfidenceThreshold::default());
  let mut session = ScanSession::new(Arc::new(detector), orchestrator);

  if let Some(input) = args.threshold.as_deref()
    && let Err(e) = session.apply_threshold_input(input)
  {
    warn!("忽略无效的阈值输入 '{}': {}", input, e);
  }

  session.select(upload, &observer);
  let mut view = session.settle().await;

  for container in containers {
    observer.measure(container);
    session.drain();
    view = session.view();
    info!(
      "容器 {}x{} -> 显示 {}x{}",
      container.width, container.height, view.display.width, view.display.height
    );
  }

  info!("{}", view.summary);
  for item in view.items.iter() {
    info!(
      "  - {} {} at ({:.1}, {:.1}, {:.1}x{:.1})",
      item.color, item.label, item.rect.left, item.rect.top, item.rect.width, item.rect.height
    );
  }

  let Some(upload) = session.upload() else {
    return Ok(());
  };
  for output in outputs.iter() {
    if let Err(e) = output.render_result(upload, &view) {
      error!("输出失败: {}", e);
    }
  }

  Ok(())
}
