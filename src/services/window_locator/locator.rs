use crate::config::WindowConfig;
use crate::debug_if_enabled;
use crate::error::{AppError, Result};
use crate::events::{WindowHandle, WindowInfo, WindowRect};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use super::r#trait::WindowSystem;

/// Первое окно с точно совпадающим заголовком
pub fn find_by_exact_title(
    mut windows: impl Iterator<Item = WindowInfo>,
    title: &str,
) -> Option<WindowHandle> {
    windows.find(|w| w.title_matches(title)).map(|w| w.handle)
}

/// Поиск и проверка целевого окна с опросом по интервалу
pub struct WindowLocator {
    system: Arc<dyn WindowSystem>,
    poll_interval: Duration,
    min_size: u32,
    reject_minimized: bool,
}

impl WindowLocator {
    pub fn new(system: Arc<dyn WindowSystem>, config: &WindowConfig) -> Self {
        info!(
            "Инициализация WindowLocator (интервал: {}мс, мин. размер: {})",
            config.poll_interval_ms, config.min_size
        );

        Self {
            system,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            min_size: config.min_size,
            reject_minimized: config.reject_minimized,
        }
    }

    /// Ждать появления подходящего окна не дольше `timeout`.
    /// Хотя бы одна попытка делается всегда.
    pub async fn locate(
        &self,
        title: &str,
        class: Option<&str>,
        timeout: Duration,
    ) -> Result<WindowHandle> {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if let Some(handle) = self.search_once(title, class) {
                info!("Окно \"{}\" найдено ({}), попыток: {}", title, handle, attempts);
                return Ok(handle);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Окно \"{}\" не найдено за {} попыток", title, attempts);
                return Err(AppError::WindowTimedOut {
                    title: title.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Прямоугольник найденного окна
    pub fn window_rect(&self, handle: WindowHandle) -> Result<WindowRect> {
        self.system
            .window_rect(handle)
            .ok_or_else(|| crate::app_error!(rect_unavailable, "окно {}", handle))
    }

    fn search_once(&self, title: &str, class: Option<&str>) -> Option<WindowHandle> {
        let candidate = class
            .and_then(|class| self.system.find_window(class, title))
            .or_else(|| find_by_exact_title(self.system.enumerate(), title))?;

        if self.is_valid(candidate) {
            Some(candidate)
        } else {
            debug_if_enabled!("Кандидат {} ещё не готов, продолжаем поиск", candidate);
            None
        }
    }

    fn is_valid(&self, handle: WindowHandle) -> bool {
        if !self.system.is_visible(handle) {
            return false;
        }
        if self.reject_minimized && self.system.is_minimized(handle) {
            return false;
        }

        self.system
            .window_rect(handle)
            .map(|rect| rect.exceeds(self.min_size))
            .unwrap_or(false)
    }
}
