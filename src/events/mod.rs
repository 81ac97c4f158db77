pub mod keyboard;
pub mod window;

pub use keyboard::{ActionDescriptor, ActionKind, KeyCode, KeyDirection};
pub use window::{WindowHandle, WindowInfo, WindowRect};

/// События для виртуальной клавиатуры
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualKeyEvent {
    pub key_code: KeyCode,
    pub direction: KeyDirection,
}

impl VirtualKeyEvent {
    pub fn new(key_code: KeyCode, direction: KeyDirection) -> Self {
        Self {
            key_code,
            direction,
        }
    }

    pub fn press(key_code: KeyCode) -> Self {
        Self::new(key_code, KeyDirection::Down)
    }

    pub fn release(key_code: KeyCode) -> Self {
        Self::new(key_code, KeyDirection::Up)
    }
}
