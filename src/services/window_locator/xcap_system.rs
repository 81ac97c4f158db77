use crate::events::{WindowHandle, WindowInfo, WindowRect};
use tracing::{debug, warn};
use xcap::Window;

use super::r#trait::WindowSystem;

/// Оконная система на базе xcap.
///
/// xcap возвращает только окна, которые сейчас отображаются, поэтому
/// видимость — это присутствие окна в списке с ненулевой площадью.
/// В роли класса окна выступает имя приложения.
pub struct XcapWindowSystem;

impl XcapWindowSystem {
    pub fn new() -> Self {
        Self
    }

    fn all_windows() -> Vec<Window> {
        match Window::all() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Не удалось получить список окон: {}", e);
                Vec::new()
            }
        }
    }

    fn lookup(handle: WindowHandle) -> Option<Window> {
        Self::all_windows()
            .into_iter()
            .find(|w| w.id().ok().map(u64::from) == Some(handle.raw()))
    }

    fn describe(window: &Window) -> Option<WindowInfo> {
        let id = window.id().ok()?;
        let title = window.title().unwrap_or_default();
        let class = window.app_name().unwrap_or_default();
        Some(WindowInfo::new(WindowHandle::from_raw(u64::from(id)), title).with_class(class))
    }
}

impl Default for XcapWindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSystem for XcapWindowSystem {
    fn find_window(&self, class: &str, title: &str) -> Option<WindowHandle> {
        let handle = Self::all_windows()
            .iter()
            .filter_map(Self::describe)
            .find(|info| info.class == class && info.title_matches(title))
            .map(|info| info.handle);

        debug!("Прямой поиск окна ({}, {}): {:?}", class, title, handle);
        handle
    }

    fn enumerate(&self) -> Box<dyn Iterator<Item = WindowInfo> + '_> {
        Box::new(
            Self::all_windows()
                .into_iter()
                .filter_map(|window| Self::describe(&window)),
        )
    }

    fn window_rect(&self, handle: WindowHandle) -> Option<WindowRect> {
        let window = Self::lookup(handle)?;
        let x = window.x().ok()?;
        let y = window.y().ok()?;
        let width = i32::try_from(window.width().ok()?).ok()?;
        let height = i32::try_from(window.height().ok()?).ok()?;
        Some(WindowRect::new(x, y, x.saturating_add(width), y.saturating_add(height)))
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        Self::lookup(handle)
            .map(|w| w.width().unwrap_or(0) > 0 && w.height().unwrap_or(0) > 0)
            .unwrap_or(false)
    }

    fn is_minimized(&self, handle: WindowHandle) -> bool {
        Self::lookup(handle)
            .and_then(|w| w.is_minimized().ok())
            .unwrap_or(false)
    }
}
