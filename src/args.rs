// 该文件是 Anjian （安检） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use clap::Parser;
use url::Url;

use anjian::geometry::ContainerSize;

/// Anjian 安检图像扫描
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测服务地址，缺省时由 VITE_BACKEND_URL / BACKEND_URL 推导
  #[arg(long, value_name = "URL")]
  pub detector: Option<Url>,

  /// 待扫描图像，例如 image:///path/to/bag.png（仅支持 PNG、JPEG）
  #[arg(long, value_name = "URL")]
  pub input: Url,

  /// 输出，可重复
  /// 支持格式:
  /// - 标注图像: image:///path/out.png?font=/path/font.ttf
  /// - JSON 记录: json:///path/out.json
  #[arg(long, value_name = "URL")]
  pub output: Vec<Url>,

  /// 置信度阈值输入，例如 0.7
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<String>,

  /// 显示容器尺寸 WxH，可重复以模拟容器尺寸变化
  #[arg(long, value_name = "WxH", default_value = "440x440", value_parser = parse_container)]
  pub container: Vec<ContainerSize>,
}

pub fn parse_container(raw: &str) -> Result<ContainerSize, String> {
  let (w, h) = raw
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("容器尺寸格式应为 WxH: {}", raw))?;
  let width: f64 = w
    .trim()
    .parse()
    .map_err(|e| format!("容器宽度无效 '{}': {}", w, e))?;
  let height: f64 = h
    .trim()
    .parse()
    .map_err(|e| format!("容器高度无效 '{}': {}", h, e))?;
  if !(width.is_finite() && height.is_finite()) || width < 0.0 || height < 0.0 {
    return Err(format!("容器尺寸必须为非负有限数: {}", raw));
  }
  Ok(ContainerSize::new(width, height))
}
