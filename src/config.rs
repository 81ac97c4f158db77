use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::{ActionDescriptor, ActionKind, KeyCode};
use crate::mappings::KeyNameToVkCode;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub window: WindowConfig,
    pub capture: CaptureConfig,
    pub model: ModelConfig,
    pub control: ControlConfig,
    pub tap: TapConfig,
    pub actions: Vec<ActionMapping>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    /// Точный заголовок целевого окна
    pub title: String,
    /// Класс окна (на Windows — класс окна, на прочих ОС — имя приложения)
    #[serde(default)]
    pub class: Option<String>,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub min_size: u32,
    /// Отбрасывать свёрнутые окна при поиске
    #[serde(default)]
    pub reject_minimized: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub resource_dir: Option<PathBuf>,
    pub labels: Vec<String>,
    pub input_width: u32,
    pub input_height: u32,
    pub scale: f32,
    pub channel_order: ChannelOrder,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    pub tick_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TapConfig {
    pub repetitions: u32,
    pub down_ms: u64,
    pub gap_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionMapping {
    pub label: String,
    pub kind: ActionKind,
    pub key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            window: WindowConfig {
                title: "绝区零".to_string(),
                class: Some("UnityWndClass".to_string()),
                timeout_ms: 10_000,
                poll_interval_ms: 500,
                min_size: 100,
                reject_minimized: false,
            },
            capture: CaptureConfig {
                offset_x: 0,
                offset_y: 0,
                width: 1920,
                height: 1080,
            },
            model: ModelConfig {
                path: PathBuf::from("model.onnx"),
                resource_dir: None,
                labels: vec!["A".to_string(), "D".to_string()],
                input_width: 224,
                input_height: 224,
                scale: 1.0 / 255.0,
                channel_order: ChannelOrder::Rgb,
            },
            control: ControlConfig {
                tick_interval_ms: 100,
                shutdown_timeout_ms: 2_000,
                autostart: false,
            },
            tap: TapConfig::default(),
            actions: vec![
                ActionMapping {
                    label: "A".to_string(),
                    kind: ActionKind::Hold,
                    key: "a".to_string(),
                },
                ActionMapping {
                    label: "D".to_string(),
                    kind: ActionKind::Hold,
                    key: "d".to_string(),
                },
            ],
        }
    }
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            repetitions: 5,
            down_ms: 10,
            gap_ms: 200,
        }
    }
}

impl TapConfig {
    pub fn down(&self) -> Duration {
        Duration::from_millis(self.down_ms)
    }

    pub fn gap(&self) -> Duration {
        Duration::from_millis(self.gap_ms)
    }

    /// Полная длительность серии нажатий
    pub fn total(&self) -> Duration {
        (self.down() + self.gap()) * self.repetitions
    }
}

impl Config {
    /// Загрузка: значения по умолчанию, затем TOML файл (если есть), затем переменные `VK_*`
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("VK_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация настроек окна
        if self.window.title.is_empty() {
            anyhow::bail!("window.title не может быть пустым");
        }
        if self.window.poll_interval_ms == 0 {
            anyhow::bail!("window.poll_interval_ms должно быть больше 0");
        }

        if self.capture.width == 0 || self.capture.height == 0 {
            anyhow::bail!(
                "Неверный размер области захвата: {}x{}",
                self.capture.width,
                self.capture.height
            );
        }

        // Валидация модели
        if self.model.labels.is_empty() {
            anyhow::bail!("Список меток модели пуст");
        }
        let mut seen = HashSet::new();
        for label in &self.model.labels {
            if !seen.insert(label.as_str()) {
                anyhow::bail!("Повторяющаяся метка модели: {}", label);
            }
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            anyhow::bail!("Размер входа модели должен быть больше 0");
        }
        if !(self.model.scale.is_finite() && self.model.scale > 0.0) {
            anyhow::bail!("model.scale должно быть положительным числом");
        }

        if self.control.tick_interval_ms == 0 {
            anyhow::bail!("control.tick_interval_ms должно быть больше 0");
        }
        if self.tap.repetitions == 0 {
            anyhow::bail!("tap.repetitions должно быть больше 0");
        }

        // Валидация действий
        for (i, action) in self.actions.iter().enumerate() {
            if !seen.contains(action.label.as_str()) {
                anyhow::bail!(
                    "Метка '{}' в действии #{} отсутствует в списке меток модели",
                    action.label,
                    i + 1
                );
            }
            KeyNameToVkCode::translate(&action.key)
                .map_err(|e| anyhow::anyhow!("Неверная клавиша в действии #{}: {}", i + 1, e))?;
        }

        Ok(())
    }

    /// Статическая таблица метка → действие
    pub fn action_map(&self) -> Result<HashMap<String, ActionDescriptor>> {
        self.actions
            .iter()
            .map(|action| {
                let code = KeyNameToVkCode::translate(&action.key).map_err(anyhow::Error::msg)?;
                let descriptor = ActionDescriptor {
                    kind: action.kind,
                    key: KeyCode::new(code),
                };
                Ok((action.label.clone(), descriptor))
            })
            .collect()
    }

    /// Путь к модели с учётом каталога ресурсов
    pub fn model_path(&self) -> PathBuf {
        match &self.model.resource_dir {
            Some(dir) if self.model.path.is_relative() => dir.join(&self.model.path),
            _ => self.model.path.clone(),
        }
    }
}
