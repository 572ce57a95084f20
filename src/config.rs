// 该文件是 Anjian （安检） 项目的一部分。
// src/config.rs - 后端地址配置
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

use thiserror::Error;
use url::Url;

pub const DETECT_API_PATH: &str = "/api/v1/detect";

/// 按优先级排列的后端地址环境变量
pub const BACKEND_URL_ENV_KEYS: [&str; 2] = ["VITE_BACKEND_URL", "BACKEND_URL"];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("未配置后端地址，请设置 {} 或使用 --detector", BACKEND_URL_ENV_KEYS.join(" / "))]
  MissingBackend,
  #[error("后端地址无效: {0}")]
  InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendConfig {
  base: String,
}

impl BackendConfig {
  /// 去掉首尾空白和一个结尾的 `/`
  pub fn new(raw: &str) -> Self {
    let trimmed = raw.trim();
    let base = trimmed.strip_suffix('/').unwrap_or(trimmed);
    Self {
      base: base.to_string(),
    }
  }

  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// 取第一个存在的变量，即使它的值为空
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    BACKEND_URL_ENV_KEYS
      .iter()
      .find_map(|key| lookup(key))
      .map(|raw| Self::new(&raw))
      .unwrap_or_default()
  }

  pub fn base(&self) -> &str {
    &self.base
  }

  pub fn is_configured(&self) -> bool {
    !self.base.is_empty()
  }

  /// 拼接接口路径，保证路径只有一个前导 `/`；未配置后端时只返回路径
  pub fn resolve_api_url(&self, path: &str) -> String {
    let path = if path.starts_with('/') {
      path.to_string()
    } else {
      format!("/{}", path)
    };
    format!("{}{}", self.base, path)
  }

  pub fn detector_url(&self) -> Result<Url, ConfigError> {
    if !self.is_configured() {
      return Err(ConfigError::MissingBackend);
    }
    Ok(Url::parse(&self.resolve_api_url(DETECT_API_PATH))?)
  }
}
