// 该文件是 Anjian （安检） 项目的一部分。
// src/detector.rs - 远程检测服务
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

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, detection::ConfidenceThreshold, input::ImageUpload};

pub const IMAGE_FIELD: &str = "image";
pub const CONFIDENCE_FIELD: &str = "confidence";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("检测服务地址方案无效: {0}")]
  SchemeMismatch(String),
  #[error("请求检测服务失败: {0}")]
  Request(#[from] reqwest::Error),
  #[error("检测服务返回错误状态 {0}: {1}")]
  Status(u16, String),
  #[error("检测结果解析失败: {0}")]
  Body(#[from] serde_json::Error),
}

/// 检测服务，返回尚未规范化的原始载荷
#[async_trait]
pub trait Detector: Send + Sync {
  async fn detect(
    &self,
    image: &ImageUpload,
    threshold: ConfidenceThreshold,
  ) -> Result<Value, DetectorError>;
}

/// 通过 HTTP multipart 调用检测服务
#[derive(Debug, Clone)]
pub struct HttpDetector {
  endpoint: Url,
  client: reqwest::Client,
}

impl FromUrl for HttpDetector {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Ok(Self::new(url.clone(), DEFAULT_TIMEOUT)),
      other => Err(DetectorError::SchemeMismatch(other.to_string())),
    }
  }
}

impl HttpDetector {
  pub fn new(endpoint: Url, timeout: Duration) -> Self {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .unwrap_or_else(|e| {
        warn!("无法按配置创建 HTTP 客户端 ({})，使用默认配置", e);
        reqwest::Client::new()
      });
    Self { endpoint, client }
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

/// 空正文视为没有检测结果
pub fn decode_payload(body: &[u8]) -> Result<Value, DetectorError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }
  Ok(serde_json::from_slice(body)?)
}

#[async_trait]
impl Detector for HttpDetector {
  async fn detect(
    &self,
    image: &ImageUpload,
    threshold: ConfidenceThreshold,
  ) -> Result<Value, DetectorError> {
    let part = Part::bytes(image.bytes().to_vec())
      .file_name(image.file_name().to_string())
      .mime_str(image.mime_type())?;
    let form = Form::new()
      .part(IMAGE_FIELD, part)
      .text(CONFIDENCE_FIELD, threshold.value().to_string());

    info!("提交图像 {} 到 {}", image.file_name(), self.endpoint);
    let response = self
      .client
      .post(self.endpoint.clone())
      .multipart(form)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      warn!("检测服务返回 {}", status);
      return Err(DetectorError::Status(status.as_u16(), text));
    }

    let body = response.bytes().await?;
    debug!("检测服务响应 {} 字节", body.len());
    decode_payload(&body)
  }
}
