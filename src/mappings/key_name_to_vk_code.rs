use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Преобразование имён клавиш в виртуальные коды (VK_*).
/// Буквы и цифры кодируются своим ASCII-кодом в верхнем регистре,
/// поэтому в таблице только остальные клавиши.
pub struct KeyNameToVkCode;

static NAMED_KEYS: &[(&str, u16)] = &[
    // Специальные клавиши
    ("space", 0x20),
    ("enter", 0x0D),
    ("escape", 0x1B),
    ("backspace", 0x08),
    ("tab", 0x09),

    // Модификаторы
    ("shift", 0x10),
    ("ctrl", 0x11),
    ("alt", 0x12),
    ("super", 0x5B),

    // Стрелки
    ("left", 0x25),
    ("up", 0x26),
    ("right", 0x27),
    ("down", 0x28),

    // Навигация/редакция
    ("pageup", 0x21),
    ("pagedown", 0x22),
    ("end", 0x23),
    ("home", 0x24),
    ("insert", 0x2D),
    ("delete", 0x2E),

    // Системные
    ("pause", 0x13),
    ("printscreen", 0x2C),
    ("scrolllock", 0x91),

    // Функциональные клавиши
    ("f1", 0x70),
    ("f2", 0x71),
    ("f3", 0x72),
    ("f4", 0x73),
    ("f5", 0x74),
    ("f6", 0x75),
    ("f7", 0x76),
    ("f8", 0x77),
    ("f9", 0x78),
    ("f10", 0x79),
    ("f11", 0x7A),
    ("f12", 0x7B),

    // Numpad
    ("kp0", 0x60),
    ("kp1", 0x61),
    ("kp2", 0x62),
    ("kp3", 0x63),
    ("kp4", 0x64),
    ("kp5", 0x65),
    ("kp6", 0x66),
    ("kp7", 0x67),
    ("kp8", 0x68),
    ("kp9", 0x69),
    ("kpmultiply", 0x6A),
    ("kpadd", 0x6B),
    ("kpsubtract", 0x6D),
    ("kpdecimal", 0x6E),
    ("kpdivide", 0x6F),

    // Пунктуация (OEM)
    ("semicolon", 0xBA),
    ("equal", 0xBB),
    ("comma", 0xBC),
    ("minus", 0xBD),
    ("dot", 0xBE),
    ("slash", 0xBF),
    ("grave", 0xC0),
    ("leftbrace", 0xDB),
    ("backslash", 0xDC),
    ("rightbrace", 0xDD),
    ("apostrophe", 0xDE),
];

static NAME_TO_CODE: Lazy<HashMap<&'static str, u16>> =
    Lazy::new(|| NAMED_KEYS.iter().copied().collect());

static CODE_TO_NAME: Lazy<HashMap<u16, &'static str>> =
    Lazy::new(|| NAMED_KEYS.iter().map(|(name, code)| (*code, *name)).collect());

impl KeyNameToVkCode {
    /// Получить виртуальный код клавиши по её имени
    pub fn translate(key_name: &str) -> Result<u16, String> {
        let normalized = key_name.trim().to_lowercase();

        let mut chars = normalized.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_alphanumeric() {
                return Ok(c.to_ascii_uppercase() as u16);
            }
        }

        NAME_TO_CODE
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| format!("Unknown key: {}", key_name))
    }

    /// Получить имя клавиши по виртуальному коду
    pub fn reverse_translate(code: u16) -> Option<String> {
        match code {
            0x30..=0x39 | 0x41..=0x5A => {
                char::from_u32(code as u32).map(|c| c.to_ascii_lowercase().to_string())
            }
            _ => CODE_TO_NAME.get(&code).map(|name| name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_digits() {
        assert_eq!(KeyNameToVkCode::translate("a").unwrap(), 0x41);
        assert_eq!(KeyNameToVkCode::translate("d").unwrap(), 0x44);
        assert_eq!(KeyNameToVkCode::translate("0").unwrap(), 0x30);
        assert_eq!(KeyNameToVkCode::translate("9").unwrap(), 0x39);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(KeyNameToVkCode::translate("A").unwrap(), 0x41);
        assert_eq!(KeyNameToVkCode::translate("SPACE").unwrap(), 0x20);
        assert_eq!(KeyNameToVkCode::translate("F12").unwrap(), 0x7B);
    }

    #[test]
    fn test_reverse_mapping() {
        assert_eq!(KeyNameToVkCode::reverse_translate(0x41).as_deref(), Some("a"));
        assert_eq!(KeyNameToVkCode::reverse_translate(0x20).as_deref(), Some("space"));
        assert_eq!(KeyNameToVkCode::reverse_translate(0x70).as_deref(), Some("f1"));
        assert_eq!(KeyNameToVkCode::reverse_translate(0xFF), None);
    }

    #[test]
    fn test_every_named_key_round_trips() {
        for (name, code) in NAMED_KEYS {
            assert_eq!(KeyNameToVkCode::translate(name).unwrap(), *code, "{}", name);
            assert_eq!(KeyNameToVkCode::reverse_translate(*code).as_deref(), Some(*name));
        }
    }

    #[test]
    fn test_invalid_key() {
        assert!(KeyNameToVkCode::translate("invalid_key").is_err());
        assert!(KeyNameToVkCode::translate("").is_err());
        assert!(KeyNameToVkCode::translate("!").is_err());
    }
}
