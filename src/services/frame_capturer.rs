use crate::config::CaptureConfig;
use crate::error::Result;
use crate::events::WindowRect;
use crate::trace_if_enabled;
use image::{imageops, Rgba, RgbaImage};
use std::sync::Arc;
use tracing::info;
use xcap::Monitor;

/// Копирование прямоугольника экрана в буфер RGBA
pub trait ScreenSource: Send + Sync {
    /// Части области за пределами экранов остаются чёрными
    fn copy_region(&self, x: i32, y: i32, width: u32, height: u32) -> Result<RgbaImage>;
}

/// Снимок области окна фиксированного размера. После создания не меняется.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    image: RgbaImage,
}

impl CaptureFrame {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub struct FrameCapturer {
    source: Arc<dyn ScreenSource>,
    offset_x: i32,
    offset_y: i32,
    width: u32,
    height: u32,
}

impl FrameCapturer {
    pub fn new(source: Arc<dyn ScreenSource>, config: &CaptureConfig) -> Self {
        info!(
            "Инициализация FrameCapturer: {}x{} со смещением ({}, {})",
            config.width, config.height, config.offset_x, config.offset_y
        );

        Self {
            source,
            offset_x: config.offset_x,
            offset_y: config.offset_y,
            width: config.width,
            height: config.height,
        }
    }

    /// Снять область фиксированного размера от левого верхнего угла окна.
    /// Текущий размер окна не учитывается.
    pub fn capture(&self, rect: &WindowRect) -> Result<CaptureFrame> {
        let x = rect.left.saturating_add(self.offset_x);
        let y = rect.top.saturating_add(self.offset_y);

        let image = self.source.copy_region(x, y, self.width, self.height)?;
        if image.dimensions() != (self.width, self.height) {
            return Err(crate::app_error!(
                capture,
                "получен кадр {}x{} вместо {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }

        trace_if_enabled!("Кадр {}x{} снят с ({}, {})", self.width, self.height, x, y);
        Ok(CaptureFrame::new(image))
    }
}

/// Захват экрана через xcap с объединением всех мониторов
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

impl Default for XcapScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for XcapScreen {
    fn copy_region(&self, x: i32, y: i32, width: u32, height: u32) -> Result<RgbaImage> {
        let monitors = Monitor::all()
            .map_err(|e| crate::app_error!(capture, "список мониторов недоступен: {}", e))?;

        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        let (right, bottom) = (x as i64 + width as i64, y as i64 + height as i64);

        for monitor in monitors {
            let (Ok(mx), Ok(my), Ok(mw), Ok(mh)) =
                (monitor.x(), monitor.y(), monitor.width(), monitor.height())
            else {
                continue;
            };

            let left = (x as i64).max(mx as i64);
            let top = (y as i64).max(my as i64);
            let clip_right = right.min(mx as i64 + mw as i64);
            let clip_bottom = bottom.min(my as i64 + mh as i64);
            if left >= clip_right || top >= clip_bottom {
                continue;
            }

            let shot = monitor
                .capture_image()
                .map_err(|e| crate::app_error!(capture, "снимок монитора не получен: {}", e))?;

            // Снимок может быть в физических пикселях: обрезаем по его границам
            let src_x = (left - mx as i64) as u32;
            let src_y = (top - my as i64) as u32;
            if src_x >= shot.width() || src_y >= shot.height() {
                continue;
            }
            let w = ((clip_right - left) as u32).min(shot.width() - src_x);
            let h = ((clip_bottom - top) as u32).min(shot.height() - src_y);

            let part = imageops::crop_imm(&shot, src_x, src_y, w, h).to_image();
            imageops::replace(&mut canvas, &part, left - x as i64, top - y as i64);
        }

        Ok(canvas)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::AppError;
    use parking_lot::Mutex;

    /// Бесконечный экран, где пиксель кодирует свои координаты
    #[derive(Default)]
    pub struct PatternScreen {
        pub requests: Mutex<Vec<(i32, i32, u32, u32)>>,
        pub fail: Mutex<bool>,
    }

    impl ScreenSource for PatternScreen {
        fn copy_region(&self, x: i32, y: i32, width: u32, height: u32) -> Result<RgbaImage> {
            self.requests.lock().push((x, y, width, height));
            if *self.fail.lock() {
                return Err(AppError::FrameCapture("экран недоступен".to_string()));
            }
            Ok(RgbaImage::from_fn(width, height, |px, py| {
                let sx = x + px as i32;
                let sy = y + py as i32;
                Rgba([(sx % 256) as u8, (sy % 256) as u8, 0, 255])
            }))
        }
    }
}
