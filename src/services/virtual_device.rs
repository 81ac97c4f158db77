use crate::error::{AppError, Result};
use crate::events::{KeyCode, KeyDirection, VirtualKeyEvent};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Инъекция синтетических событий клавиатуры
pub trait KeyInjector: Send + Sync {
    fn send_event(&self, event: VirtualKeyEvent) -> Result<()>;
}

/// Виртуальная клавиатура на базе enigo.
///
/// Дескриптор enigo живёт в отдельном потоке: события приходят по каналу
/// и отправляются в ОС строго в порядке поступления.
pub struct VirtualDevice {
    sender: Option<mpsc::UnboundedSender<VirtualKeyEvent>>,
    device_name: String,
    dry_run: bool,
}

impl VirtualDevice {
    pub fn new(device_name: &str, dry_run: bool) -> Result<Self> {
        info!("Инициализация VirtualDevice '{}' (dry_run: {})", device_name, dry_run);

        let sender = if dry_run {
            None
        } else {
            Some(Self::spawn_injector(device_name)?)
        };

        Ok(Self {
            sender,
            device_name: device_name.to_string(),
            dry_run,
        })
    }

    fn spawn_injector(device_name: &str) -> Result<mpsc::UnboundedSender<VirtualKeyEvent>> {
        info!("Создание виртуальной клавиатуры '{}' для инъекции клавиш", device_name);

        let (tx, mut rx) = mpsc::unbounded_channel::<VirtualKeyEvent>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::result::Result<(), String>>();

        std::thread::Builder::new()
            .name(format!("{}-injector", device_name))
            .spawn(move || {
                let mut enigo = match Enigo::new(&Settings::default()) {
                    Ok(enigo) => {
                        let _ = ready_tx.send(Ok(()));
                        enigo
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                while let Some(event) = rx.blocking_recv() {
                    let direction = match event.direction {
                        KeyDirection::Down => Direction::Press,
                        KeyDirection::Up => Direction::Release,
                    };
                    if let Err(e) = enigo.key(to_enigo_key(event.key_code), direction) {
                        error!("Не удалось отправить событие клавиши {}: {}", event.key_code, e);
                    }
                }
                debug!("Поток инъекции клавиш завершён");
            })?;

        ready_rx
            .recv()
            .map_err(|_| AppError::Internal("Поток инъекции завершился до инициализации".to_string()))?
            .map_err(|e| {
                crate::app_error!(input, "Не удалось создать виртуальную клавиатуру '{}': {}", device_name, e)
            })?;

        info!("Виртуальная клавиатура '{}' создана успешно", device_name);
        Ok(tx)
    }
}

impl KeyInjector for VirtualDevice {
    fn send_event(&self, event: VirtualKeyEvent) -> Result<()> {
        if self.dry_run {
            info!("[DRY RUN] Виртуальное событие: {:?} {}", event.direction, event.key_code);
            return Ok(());
        }

        debug!("Обработка виртуального события: {:?}", event);

        match &self.sender {
            Some(sender) => sender.send(event).map_err(|e| {
                crate::app_error!(
                    input,
                    "Поток инъекции '{}' недоступен: {}",
                    self.device_name,
                    e.0.key_code
                )
            }),
            None => Err(AppError::Internal("Виртуальное устройство недоступно".to_string())),
        }
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if !self.dry_run {
            info!("Закрытие виртуального устройства");
        }
    }
}

/// VK-код в клавишу enigo
#[cfg(windows)]
fn to_enigo_key(code: KeyCode) -> Key {
    Key::Other(code.value() as u32)
}

#[cfg(not(windows))]
fn to_enigo_key(code: KeyCode) -> Key {
    if let Some(c) = code.as_char() {
        return Key::Unicode(c.to_ascii_lowercase());
    }
    match code.value() {
        0x08 => Key::Backspace,
        0x09 => Key::Tab,
        0x0D => Key::Return,
        0x10 => Key::Shift,
        0x11 => Key::Control,
        0x12 => Key::Alt,
        0x1B => Key::Escape,
        0x20 => Key::Space,
        0x21 => Key::PageUp,
        0x22 => Key::PageDown,
        0x23 => Key::End,
        0x24 => Key::Home,
        0x25 => Key::LeftArrow,
        0x26 => Key::UpArrow,
        0x27 => Key::RightArrow,
        0x28 => Key::DownArrow,
        0x2E => Key::Delete,
        0x5B => Key::Meta,
        0x70 => Key::F1,
        0x71 => Key::F2,
        0x72 => Key::F3,
        0x73 => Key::F4,
        0x74 => Key::F5,
        0x75 => Key::F6,
        0x76 => Key::F7,
        0x77 => Key::F8,
        0x78 => Key::F9,
        0x79 => Key::F10,
        0x7A => Key::F11,
        0x7B => Key::F12,
        other => Key::Other(other as u32),
    }
}
