use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
mod config;
mod error;
mod events;
pub mod mappings;
mod services;
mod utils;

use config::Config;
use services::{
    ActionDispatcher, Classifier, ControlLoop, FrameCapturer, LogLine, Reporter, Status,
    VirtualDevice, WindowLocator, XcapScreen, XcapWindowSystem,
};

#[derive(Parser, Debug)]
#[command(name = "vision-keys")]
#[command(about = "Нажимает клавиши по классу, который модель видит в окне приложения")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "vision-keys.toml")]
    config: String,

    /// Режим сухого запуска (события клавиш только логируются)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Запустить распознавание сразу, без нажатия Enter
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Config::load(&args.config)?;

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск vision-keys v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - реальные нажатия отключены");
    }

    if let Some(dir) = &config.model.resource_dir {
        utils::ensure_resource_dir(dir)
            .with_context(|| format!("Каталог ресурсов {}", dir.display()))?;
    }

    // Без модели работать нечего: ошибка загрузки завершает процесс
    let model_path = config.model_path();
    let classifier = Arc::new(
        Classifier::load(&model_path, &config.model)
            .with_context(|| format!("Модель {}", model_path.display()))?,
    );

    // Инициализация компонентов
    let reporter = Arc::new(Reporter::default());
    let virtual_device = Arc::new(VirtualDevice::new("vision-keys", args.dry_run)?);
    let dispatcher = Arc::new(ActionDispatcher::new(
        virtual_device.clone(),
        reporter.clone(),
        config.tap,
    ));
    let locator = Arc::new(WindowLocator::new(
        Arc::new(XcapWindowSystem::new()),
        &config.window,
    ));
    let capturer = Arc::new(FrameCapturer::new(Arc::new(XcapScreen::new()), &config.capture));
    let control = Arc::new(ControlLoop::new(
        &config,
        locator,
        capturer,
        classifier,
        dispatcher.clone(),
        reporter.clone(),
    )?);

    info!("Все компоненты инициализированы");

    let status_handle = tokio::spawn(log_status(reporter.watch_status()));
    let journal_handle = tokio::spawn(print_journal(reporter.subscribe()));

    if args.autostart || config.control.autostart {
        toggle(&control);
    }

    info!("Enter - запуск/остановка, q - выход, Ctrl+C - завершение");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match line.trim() {
                    "" => toggle(&control),
                    "q" | "quit" => {
                        info!("Выход по команде пользователя");
                        break;
                    }
                    other => warn!("Неизвестная команда: {}", other),
                },
                Ok(None) => {
                    info!("Ввод закрыт, ожидание Ctrl+C");
                    wait_for_ctrl_c().await;
                    break;
                }
                Err(e) => {
                    error!("Ошибка чтения ввода: {}", e);
                    break;
                }
            },
            _ = wait_for_ctrl_c() => break,
        }
    }

    info!("Завершение работы...");

    // Ожидание цикла и серий нажатий
    control.shutdown().await;

    // Гарантируем отсутствие залипших клавиш
    dispatcher.release_all();

    status_handle.abort();
    journal_handle.abort();

    info!("vision-keys завершил работу");
    Ok(())
}

/// Переключить распознавание. Поиск окна идёт в отдельной задаче,
/// чтобы повторный Enter мог его отменить.
fn toggle(control: &Arc<ControlLoop>) {
    if control.is_running() {
        control.stop();
        return;
    }

    let control = Arc::clone(control);
    tokio::spawn(async move {
        // Ошибка уже в журнале и в статусе
        if let Err(e) = control.start().await {
            debug!("Запуск не выполнен: {}", e);
        }
    });
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
        Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
    }
}

async fn log_status(mut status: watch::Receiver<Status>) {
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        info!("{}", current);
    }
}

/// Журнал для пользователя: строки `HH:MM:SS: сообщение` в stdout
async fn print_journal(mut lines: broadcast::Receiver<LogLine>) {
    loop {
        match lines.recv().await {
            Ok(line) => println!("{}", line),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Журнал отстал, пропущено строк: {}", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}
