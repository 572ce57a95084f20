// 该文件是 Anjian （安检） 项目的一部分。
// src/input.rs - 上传图像的读取与尺寸测量
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

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, geometry::NativeSize};

/// 上传图像的大小上限（5 MiB）
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ImageDecodeError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("不支持的图像格式: {0}")]
  UnsupportedFormat(String),
  #[error("图像过大: {0} 字节，上限 {1} 字节")]
  TooLarge(usize, usize),
  #[error("图像尺寸为零")]
  EmptyImage,
}

/// 一张待扫描的图像，只保存编码后的字节
#[derive(Debug, Clone)]
pub struct ImageUpload {
  file_name: String,
  format: ImageFormat,
  bytes: Arc<[u8]>,
}

impl FromUrlWithScheme for ImageUpload {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageUpload {
  type Error = ImageDecodeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageDecodeError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

impl ImageUpload {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageDecodeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let file_name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| "image".to_string());
    Self::from_bytes(file_name, bytes)
  }

  /// 校验大小与格式（仅 PNG 与 JPEG）
  pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ImageDecodeError> {
    if bytes.len() > MAX_IMAGE_BYTES {
      return Err(ImageDecodeError::TooLarge(bytes.len(), MAX_IMAGE_BYTES));
    }

    let format = image::guess_format(&bytes)?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
      return Err(ImageDecodeError::UnsupportedFormat(format!("{:?}", format)));
    }

    let file_name = file_name.into();
    debug!("读取图像 {} ({:?}, {} 字节)", file_name, format, bytes.len());

    Ok(Self {
      file_name,
      format,
      bytes: bytes.into(),
    })
  }

  pub fn file_name(&self) -> &str {
    &self.file_name
  }

  pub fn mime_type(&self) -> &'static str {
    self.format.to_mime_type()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// 只读取图像头部得到原始尺寸
  pub fn measure(&self) -> Result<NativeSize, ImageDecodeError> {
    let (width, height) = ImageReader::with_format(Cursor::new(&self.bytes[..]), self.format)
      .into_dimensions()?;
    if width == 0 || height == 0 {
      return Err(ImageDecodeError::EmptyImage);
    }
    Ok(NativeSize::from((width, height)))
  }

  pub fn decode(&self) -> Result<RgbImage, ImageDecodeError> {
    let image = ImageReader::with_format(Cursor::new(&self.bytes[..]), self.format).decode()?;
    Ok(image.to_rgb8())
  }
}
