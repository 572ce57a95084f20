// 该文件是 Anjian （安检） 项目的一部分。
// src/output/draw.rs - 在显示尺寸的图像上绘制叠加框
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::debug;

use crate::{
  overlay::{Color, OverlayItem},
  scan::OverlayView,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 8.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 3;
const LABEL_TEXT_HORIZONTAL_PADDING: i32 = 4;
const BORDER_THICKNESS: i32 = 2;

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      font: None,
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum FontLoadError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

impl Draw {
  /// 没有字体时只绘制边框和标签底色
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, FontLoadError> {
    let data = std::fs::read(path)?;
    self.font = Some(FontArc::try_from_vec(data)?);
    Ok(self)
  }

  /// 将原图缩放到显示尺寸并绘制全部叠加框
  ///
  /// 显示尺寸为空时返回未加标注的原图。
  pub fn draw_overlay(&self, native: &RgbImage, view: &OverlayView) -> RgbImage {
    if view.display.is_empty() {
      debug!("显示尺寸为空，不绘制叠加框");
      return native.clone();
    }

    let width = (view.display.width.round() as u32).max(1);
    let height = (view.display.height.round() as u32).max(1);
    let mut image = image::imageops::resize(native, width, height, FilterType::Triangle);

    for item in view.items.iter() {
      self.draw_item(&mut image, item);
    }
    image
  }

  fn draw_item(&self, image: &mut RgbImage, item: &OverlayItem) {
    if !item.rect.is_visible() {
      return;
    }

    let (w, h) = (image.width() as i32, image.height() as i32);
    let color = rgb(item.color);

    let (left, top) = (item.rect.left, item.rect.top);
    let (right, bottom) = (left + item.rect.width, top + item.rect.height);
    // 与图像不相交的框连同标签一起跳过
    if right <= 0.0 || bottom <= 0.0 || left >= w as f64 || top >= h as f64 {
      debug!("叠加框位于图像之外，跳过: {:?}", item.rect);
      return;
    }

    // 超出图像的边缘截断到边框宽度之外，整数运算不会溢出
    let margin = BORDER_THICKNESS as f64;
    let x_min = left.floor().clamp(-margin, w as f64) as i32;
    let y_min = top.floor().clamp(-margin, h as f64) as i32;
    let x_max = right.ceil().clamp(0.0, w as f64 + margin) as i32;
    let y_max = bottom.ceil().clamp(0.0, h as f64 + margin) as i32;

    // 越过图像边缘的部分不绘制
    for thickness in 0..BORDER_THICKNESS {
      let (left, top) = (x_min + thickness, y_min + thickness);
      let (right, bottom) = (x_max - 1 - thickness, y_max - 1 - thickness);
      if left > right || top > bottom {
        break;
      }
      for x in left.max(0)..=right.min(w - 1) {
        put(image, x, top, color);
        put(image, x, bottom, color);
      }
      for y in top.max(0)..=bottom.min(h - 1) {
        put(image, left, y, color);
        put(image, right, y, color);
      }
    }

    self.draw_label(image, &item.label, x_min, y_min, color);
  }

  fn draw_label(&self, image: &mut RgbImage, label: &str, x: i32, y: i32, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32
      + 2 * LABEL_TEXT_HORIZONTAL_PADDING;
    let label_x = x.clamp(0, (w - 1).max(0));
    let label_y = (y - self.label_text_height).clamp(0, (h - 1).max(0));
    let label_width = text_width.min(w - label_x);
    let label_height = self.label_text_height.min(h - label_y);

    if label_width <= 0 || label_height <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x + LABEL_TEXT_HORIZONTAL_PADDING,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
  }
}

fn rgb(color: Color) -> Rgb<u8> {
  Rgb(color.0)
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
  if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
    image.put_pixel(x as u32, y as u32, color);
  }
}
