//! Reporter: journal and status sink for the control surface.
//!
//! Every user-facing line is written to `tracing` and mirrored into a
//! broadcast channel with a local timestamp. The status text lives in a
//! `watch` channel. Both channels can be consumed from any task, so the
//! writer never touches the consumer's execution context directly.

use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn, Level};

/// Состояние для строки статуса
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Searching,
    Running,
    WindowNotFound,
    WindowRectUnavailable,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Stopped => "остановлено",
            Status::Searching => "поиск окна...",
            Status::Running => "распознавание...",
            Status::WindowNotFound => "окно не найдено",
            Status::WindowRectUnavailable => "не удалось получить размеры окна",
        };
        write!(f, "Статус: {}", text)
    }
}

/// Строка журнала с отметкой времени
#[derive(Debug, Clone)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.at.format("%H:%M:%S"), self.message)
    }
}

pub struct Reporter {
    lines: broadcast::Sender<LogLine>,
    status: watch::Sender<Status>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Reporter {
    pub fn new(capacity: usize) -> Self {
        let (lines, _) = broadcast::channel(capacity);
        let (status, _) = watch::channel(Status::Stopped);
        Self { lines, status }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.lines.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn set_status(&self, status: Status) {
        self.status.send_replace(status);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Level::INFO, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Level::WARN, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Level::ERROR, message.into());
    }

    fn emit(&self, level: Level, message: String) {
        match level {
            Level::ERROR => error!("{}", message),
            Level::WARN => warn!("{}", message),
            _ => info!("{}", message),
        }

        // Нет подписчиков - строка остаётся только в tracing
        let _ = self.lines.send(LogLine {
            at: Local::now(),
            level,
            message,
        });
    }
}
