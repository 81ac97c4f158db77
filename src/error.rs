use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Не удалось загрузить модель: {0}")]
    ModelLoad(String),

    #[error("Окно не появилось за {timeout_ms}мс: {title}")]
    WindowTimedOut { title: String, timeout_ms: u64 },

    #[error("Не удалось получить размеры окна: {0}")]
    WindowRectUnavailable(String),

    #[error("Ошибка захвата кадра: {0}")]
    FrameCapture(String),

    #[error("Ошибка распознавания: {0}")]
    Inference(String),

    #[error("Ошибка инъекции ввода: {0}")]
    Input(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl AppError {
    /// Ошибки фазы запуска завершают текущий запуск цикла.
    /// Ошибки тика изолированы и только пропускают тик.
    pub fn is_tick_local(&self) -> bool {
        matches!(self, AppError::FrameCapture(_) | AppError::Inference(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! app_error {
    (model_load, $($arg:tt)*) => {
        $crate::error::AppError::ModelLoad(format!($($arg)*))
    };
    (rect_unavailable, $($arg:tt)*) => {
        $crate::error::AppError::WindowRectUnavailable(format!($($arg)*))
    };
    (capture, $($arg:tt)*) => {
        $crate::error::AppError::FrameCapture(format!($($arg)*))
    };
    (inference, $($arg:tt)*) => {
        $crate::error::AppError::Inference(format!($($arg)*))
    };
    (input, $($arg:tt)*) => {
        $crate::error::AppError::Input(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::AppError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_local_classification() {
        assert!(app_error!(capture, "blank").is_tick_local());
        assert!(app_error!(inference, "bad tensor").is_tick_local());
        assert!(!app_error!(model_load, "missing").is_tick_local());
        assert!(!AppError::WindowTimedOut {
            title: "x".to_string(),
            timeout_ms: 10
        }
        .is_tick_local());
    }

    #[test]
    fn test_timed_out_message_mentions_title() {
        let err = AppError::WindowTimedOut {
            title: "Game".to_string(),
            timeout_ms: 10000,
        };
        let text = err.to_string();
        assert!(text.contains("Game"));
        assert!(text.contains("10000"));
    }
}
