// 该文件是 Anjian （安检） 项目的一部分。
// src/output/json_record.rs - 以 JSON 记录叠加结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageUpload,
  output::Render,
  scan::OverlayView,
};

#[derive(Error, Debug)]
pub enum JsonRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// `json:///path/result.json`
pub struct JsonRecordOutput {
  path: PathBuf,
}

#[derive(Serialize)]
struct Record<'a> {
  file_name: &'a str,
  #[serde(flatten)]
  view: &'a OverlayView,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordOutputError::SchemeMismatch);
    }
    Ok(JsonRecordOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl Render<ImageUpload, OverlayView> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(&self, frame: &ImageUpload, result: &OverlayView) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let record = Record {
      file_name: frame.file_name(),
      view: result,
    };
    let text = serde_json::to_string_pretty(&record)?;
    std::fs::write(&self.path, text)?;
    info!("保存叠加记录到文件: {}", self.path.display());
    Ok(())
  }
}
