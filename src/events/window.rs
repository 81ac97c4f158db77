use std::fmt;

/// Непрозрачный идентификатор окна ОС.
///
/// Поддерживает только сравнение: внутреннее значение не раскрывается
/// и над ним нет арифметики.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(u64);

impl WindowHandle {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Прямоугольник окна в экранных координатах
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl WindowRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }

    /// Обе стороны строго больше `min_size`
    pub fn exceeds(&self, min_size: u32) -> bool {
        self.width() > min_size as i64 && self.height() > min_size as i64
    }
}

impl fmt::Display for WindowRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}, {}", self.left, self.top, self.right, self.bottom)
    }
}

/// Кандидат при перечислении окон верхнего уровня
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub class: String,
}

impl WindowInfo {
    pub fn new(handle: WindowHandle, title: String) -> Self {
        Self {
            handle,
            title,
            class: String::new(),
        }
    }

    pub fn with_class(mut self, class: String) -> Self {
        self.class = class;
        self
    }

    /// Точное совпадение заголовка (с учётом регистра, вся строка)
    pub fn title_matches(&self, title: &str) -> bool {
        self.title == title
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.is_empty() {
            write!(f, "\"{}\"", self.title)
        } else {
            write!(f, "\"{}\" ({})", self.title, self.class)
        }
    }
}
