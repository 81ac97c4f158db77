use crate::events::{WindowHandle, WindowInfo, WindowRect};

/// Запросы к оконной системе ОС
pub trait WindowSystem: Send + Sync {
    /// Прямой поиск по паре (класс, заголовок)
    fn find_window(&self, class: &str, title: &str) -> Option<WindowHandle>;

    /// Окна верхнего уровня. Последовательность конечна и читается один раз.
    fn enumerate(&self) -> Box<dyn Iterator<Item = WindowInfo> + '_>;

    fn window_rect(&self, handle: WindowHandle) -> Option<WindowRect>;

    fn is_visible(&self, handle: WindowHandle) -> bool;

    fn is_minimized(&self, handle: WindowHandle) -> bool;
}
