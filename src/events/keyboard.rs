use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mappings::KeyNameToVkCode;

/// Направление синтетического события клавиши
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Down,
    Up,
}

/// Код клавиши (виртуальные коды в стиле Win32, например VK_A = 0x41)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Печатный символ клавиши, если он есть (буквы и цифры)
    pub fn as_char(&self) -> Option<char> {
        match self.0 {
            0x30..=0x39 | 0x41..=0x5A => char::from_u32(self.0 as u32),
            _ => None,
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = self.as_char() {
            return write!(f, "{}", c);
        }
        match KeyNameToVkCode::reverse_translate(self.0) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "VK_0x{:02X}", self.0),
        }
    }
}

/// Вид действия для метки классификатора
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Нажать и держать, без автоматического отпускания
    Hold,
    /// Серия коротких нажатий
    Tap,
}

/// Статическое описание действия: какую клавишу и как нажимать
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub key: KeyCode,
}

impl ActionDescriptor {
    pub fn hold(key: KeyCode) -> Self {
        Self { kind: ActionKind::Hold, key }
    }

    pub fn tap(key: KeyCode) -> Self {
        Self { kind: ActionKind::Tap, key }
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.key)
    }
}
