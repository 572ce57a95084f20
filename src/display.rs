// 该文件是 Anjian （安检） 项目的一部分。
// src/display.rs - 显示尺寸跟踪与容器尺寸订阅
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

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::geometry::{ContainerSize, DisplaySize, NativeSize, ScaleTransform, compute_display_size};

/// 跟踪图像原始尺寸与容器尺寸，并维护当前显示尺寸
///
/// 每次更新都整体替换显示尺寸，不会出现只更新了一半的状态。
#[derive(Debug, Default, Clone)]
pub struct DisplaySizeTracker {
  native: Option<NativeSize>,
  container: Option<ContainerSize>,
  display: DisplaySize,
}

impl DisplaySizeTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// 新图像加载完成，原始尺寸已知
  pub fn set_native_size(&mut self, native: NativeSize) -> DisplaySize {
    if native.is_known() {
      self.native = Some(native);
    } else {
      debug!("图像原始尺寸无效: {}x{}", native.width, native.height);
      self.native = None;
    }
    self.recompute()
  }

  /// 图像解码失败，没有可用的显示尺寸
  pub fn native_unavailable(&mut self) {
    self.native = None;
    self.display = DisplaySize::ZERO;
  }

  /// 容器尺寸变化；尺寸为零（尚未布局）时推迟计算并返回 None
  pub fn container_resized(&mut self, container: ContainerSize) -> Option<DisplaySize> {
    if !container.is_laid_out() {
      debug!(
        "容器尚未布局 ({}x{})，推迟计算显示尺寸",
        container.width, container.height
      );
      return None;
    }
    self.container = Some(container);
    Some(self.recompute())
  }

  /// 清除图像相关的状态，容器尺寸保留
  pub fn reset(&mut self) {
    self.native_unavailable();
  }

  pub fn native_size(&self) -> Option<NativeSize> {
    self.native
  }

  pub fn container_size(&self) -> Option<ContainerSize> {
    self.container
  }

  pub fn display_size(&self) -> DisplaySize {
    self.display
  }

  /// 当前缩放系数；显示尺寸为空时没有可用的变换
  pub fn transform(&self) -> Option<ScaleTransform> {
    if self.display.is_empty() {
      return None;
    }
    ScaleTransform::between(self.native?, self.display)
  }

  fn recompute(&mut self) -> DisplaySize {
    self.display = match (self.native, self.container) {
      (Some(native), Some(container)) => compute_display_size(native, container),
      _ => DisplaySize::ZERO,
    };
    self.display
  }
}

type Listener = Box<dyn FnMut(ContainerSize)>;

#[derive(Default)]
struct Listeners {
  next_id: u64,
  entries: Vec<(u64, Listener)>,
}

/// 容器尺寸的持续观察者
///
/// 由挂载图像与容器的一方持有；每次测量到新的尺寸都会通知全部订阅者。
/// 订阅时会立即收到最近一次的测量结果。
#[derive(Default)]
pub struct ContainerObserver {
  listeners: Rc<RefCell<Listeners>>,
  last: Cell<Option<ContainerSize>>,
}

/// 容器尺寸订阅，析构时自动注销
#[must_use = "订阅在析构时注销"]
pub struct ResizeSubscription {
  id: u64,
  listeners: Weak<RefCell<Listeners>>,
}

impl ContainerObserver {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn observe<F>(&self, mut listener: F) -> ResizeSubscription
  where
    F: FnMut(ContainerSize) + 'static,
  {
    if let Some(size) = self.last.get() {
      listener(size);
    }

    let mut listeners = self.listeners.borrow_mut();
    let id = listeners.next_id;
    listeners.next_id += 1;
    listeners.entries.push((id, Box::new(listener)));

    ResizeSubscription {
      id,
      listeners: Rc::downgrade(&self.listeners),
    }
  }

  /// 上报一次容器测量；与上次相同时不通知
  ///
  /// 订阅者不能在回调中再次访问该观察者。
  pub fn measure(&self, size: ContainerSize) {
    if self.last.get() == Some(size) {
      return;
    }
    self.last.set(Some(size));

    for (_, listener) in self.listeners.borrow_mut().entries.iter_mut() {
      listener(size);
    }
  }

  pub fn last_measured(&self) -> Option<ContainerSize> {
    self.last.get()
  }

  pub fn subscriber_count(&self) -> usize {
    self.listeners.borrow().entries.len()
  }
}

impl Drop for ResizeSubscription {
  fn drop(&mut self) {
    if let Some(listeners) = self.listeners.upgrade() {
      listeners
        .borrow_mut()
        .entries
        .retain(|(id, _)| *id != self.id);
    }
  }
}
