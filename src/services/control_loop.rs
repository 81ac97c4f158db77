use crate::config::Config;
use crate::debug_if_enabled;
use crate::error::{AppError, Result};
use crate::events::{ActionDescriptor, WindowRect};
use crate::services::{
    ActionDispatcher, ClassificationResult, Classifier, FrameCapturer, Reporter, Status,
    WindowLocator,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

/// Цикл распознавания: окно ищется один раз при запуске,
/// затем кадр → метка → действие с фиксированным интервалом.
pub struct ControlLoop {
    locator: Arc<WindowLocator>,
    worker: Arc<TickWorker>,
    window_title: String,
    window_class: Option<String>,
    window_timeout: Duration,
    shutdown_timeout: Duration,
    /// Отмена идущего поиска окна. Под этой блокировкой меняются
    /// флаг работы, номер запуска и статус.
    search: Mutex<Option<Arc<Notify>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Всё, что нужно задаче цикла
struct TickWorker {
    capturer: Arc<FrameCapturer>,
    classifier: Arc<Classifier>,
    dispatcher: Arc<ActionDispatcher>,
    reporter: Arc<Reporter>,
    actions: HashMap<String, ActionDescriptor>,
    tick_interval: Duration,
    running: AtomicBool,
    /// Номер текущего запуска; задачи прежних запусков выходят на границе тика
    generation: AtomicU64,
    ticks: AtomicU64,
}

impl ControlLoop {
    pub fn new(
        config: &Config,
        locator: Arc<WindowLocator>,
        capturer: Arc<FrameCapturer>,
        classifier: Arc<Classifier>,
        dispatcher: Arc<ActionDispatcher>,
        reporter: Arc<Reporter>,
    ) -> Result<Self> {
        let actions = config.action_map()?;
        info!(
            "Инициализация ControlLoop: окно \"{}\", интервал {}мс, действий: {}",
            config.window.title,
            config.control.tick_interval_ms,
            actions.len()
        );

        Ok(Self {
            locator,
            worker: Arc::new(TickWorker {
                capturer,
                classifier,
                dispatcher,
                reporter,
                actions,
                tick_interval: Duration::from_millis(config.control.tick_interval_ms),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                ticks: AtomicU64::new(0),
            }),
            window_title: config.window.title.clone(),
            window_class: config.window.class.clone(),
            window_timeout: Duration::from_millis(config.window.timeout_ms),
            shutdown_timeout: Duration::from_millis(config.control.shutdown_timeout_ms),
            search: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    /// Найти окно и запустить цикл. Повторный вызов во время работы ничего не делает.
    /// `stop()` во время поиска окна отменяет запуск.
    pub async fn start(&self) -> Result<()> {
        let reporter = &self.worker.reporter;

        let (generation, cancel) = {
            let mut search = self.search.lock();
            if self.worker.running.load(Ordering::Acquire) {
                debug_if_enabled!("Цикл уже запущен, запуск пропущен");
                return Ok(());
            }
            self.worker.running.store(true, Ordering::Release);
            let generation = self.worker.generation.fetch_add(1, Ordering::AcqRel) + 1;

            let cancel = Arc::new(Notify::new());
            *search = Some(Arc::clone(&cancel));
            reporter.set_status(Status::Searching);
            (generation, cancel)
        };

        // Задача прошлого запуска видит новый номер и выходит на границе тика
        let previous = self.handle.lock().take();
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        reporter.info(format!("Поиск окна \"{}\"...", self.window_title));

        let outcome = tokio::select! {
            result = self.acquire_window() => Some(result),
            _ = cancel.notified() => None,
        };

        // Итог пишет только актуальный запуск
        let mut search = self.search.lock();
        let Some(outcome) = outcome.filter(|_| self.worker.is_current(generation)) else {
            reporter.info("Поиск окна отменён");
            return Ok(());
        };
        *search = None;

        match outcome {
            Ok(rect) => {
                reporter.info(format!("Найдено окно, область: {}", rect));
                reporter.set_status(Status::Running);

                let worker = Arc::clone(&self.worker);
                *self.handle.lock() =
                    Some(tokio::spawn(async move { worker.run(rect, generation).await }));
                Ok(())
            }
            Err(e) => {
                self.worker.running.store(false, Ordering::Release);
                reporter.set_status(match e {
                    AppError::WindowRectUnavailable(_) => Status::WindowRectUnavailable,
                    _ => Status::WindowNotFound,
                });
                reporter.error(e.to_string());
                Err(e)
            }
        }
    }

    /// Остановить цикл на границе следующего тика, а идущий поиск окна прервать.
    /// Серии нажатий не прерываются.
    pub fn stop(&self) {
        let mut search = self.search.lock();
        if let Some(cancel) = search.take() {
            cancel.notify_one();
        }
        if self.worker.running.swap(false, Ordering::AcqRel) {
            self.worker.reporter.info("Остановка распознавания");
        }
        self.worker.reporter.set_status(Status::Stopped);
    }

    /// `stop()`, ожидание задачи цикла и серий нажатий не дольше `shutdown_timeout`
    pub async fn shutdown(&self) {
        self.stop();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Задача цикла завершилась с ошибкой: {}", e);
            }
        }

        if !self.worker.dispatcher.finish_taps(self.shutdown_timeout).await {
            self.worker.reporter.warn(format!(
                "Серии нажатий не завершились за {}мс и были прерваны",
                self.shutdown_timeout.as_millis()
            ));
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.running.load(Ordering::Acquire)
    }

    /// Количество выполненных тиков за всё время
    pub fn ticks(&self) -> u64 {
        self.worker.ticks.load(Ordering::Acquire)
    }

    async fn acquire_window(&self) -> Result<WindowRect> {
        let handle = self
            .locator
            .locate(&self.window_title, self.window_class.as_deref(), self.window_timeout)
            .await?;
        self.locator.window_rect(handle)
    }
}

impl TickWorker {
    async fn run(self: Arc<Self>, rect: WindowRect, generation: u64) {
        info!("Цикл распознавания запущен");

        while self.is_current(generation) {
            match self.tick(rect).await {
                Ok(result) => self.act(&result),
                Err(e) if e.is_tick_local() => self.reporter.error(e.to_string()),
                Err(e) => self.reporter.error(format!("Тик пропущен: {}", e)),
            }
            self.ticks.fetch_add(1, Ordering::AcqRel);

            sleep(self.tick_interval).await;
        }

        info!("Цикл распознавания остановлен");
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire)
            && self.generation.load(Ordering::Acquire) == generation
    }

    /// Захват и классификация в пуле блокирующих задач
    async fn tick(&self, rect: WindowRect) -> Result<ClassificationResult> {
        let capturer = Arc::clone(&self.capturer);
        let classifier = Arc::clone(&self.classifier);

        tokio::task::spawn_blocking(move || {
            let frame = capturer.capture(&rect)?;
            classifier.classify(&frame)
        })
        .await
        .map_err(|e| crate::app_error!(internal, "задача распознавания: {}", e))?
    }

    fn act(&self, result: &ClassificationResult) {
        self.reporter.info(format!("Обнаружен класс: {}", result.label));

        match self.actions.get(&result.label) {
            Some(action) => {
                self.dispatcher.dispatch(*action);
            }
            None => debug_if_enabled!("Для метки {} нет действия", result.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::events::{ActionKind, KeyCode, KeyDirection, WindowHandle, WindowInfo};
    use crate::services::classifier::testing::ScriptedModel;
    use crate::services::frame_capturer::testing::PatternScreen;
    use crate::services::virtual_device::testing::RecordingInjector;
    use crate::services::window_locator::testing::{FakeWindow, FakeWindowSystem};
    use crate::config::ActionMapping;
    use crate::services::WindowSystem;
    use tokio::time::Instant;

    const KEY_A: KeyCode = KeyCode(0x41);
    const KEY_D: KeyCode = KeyCode(0x44);
    const A: [f32; 2] = [0.9, 0.1];
    const D: [f32; 2] = [0.1, 0.9];

    struct Harness {
        control: Arc<ControlLoop>,
        system: Arc<FakeWindowSystem>,
        screen: Arc<PatternScreen>,
        injector: Arc<RecordingInjector>,
        dispatcher: Arc<ActionDispatcher>,
        reporter: Arc<Reporter>,
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.window.title = "Game".to_string();
        config.window.timeout_ms = 200;
        config.window.poll_interval_ms = 10;
        config.capture.width = 32;
        config.capture.height = 32;
        config.model.input_width = 8;
        config.model.input_height = 8;
        config.control.tick_interval_ms = 10;
        config
    }

    fn game_window() -> FakeWindow {
        FakeWindow::new(1, "Game", "UnityWndClass", WindowRect::new(0, 0, 1920, 1080))
    }

    fn harness_with(
        config: Config,
        system: Arc<dyn WindowSystem>,
        fake: Arc<FakeWindowSystem>,
        model: ScriptedModel,
    ) -> Harness {
        let screen = Arc::new(PatternScreen::default());
        let injector = Arc::new(RecordingInjector::default());
        let reporter = Arc::new(Reporter::default());
        let dispatcher = Arc::new(ActionDispatcher::new(
            injector.clone(),
            reporter.clone(),
            config.tap,
        ));
        let classifier = Classifier::with_backend(Box::new(model), &config.model).unwrap();

        let control = ControlLoop::new(
            &config,
            Arc::new(WindowLocator::new(system, &config.window)),
            Arc::new(FrameCapturer::new(screen.clone(), &config.capture)),
            Arc::new(classifier),
            dispatcher.clone(),
            reporter.clone(),
        )
        .unwrap();

        Harness {
            control: Arc::new(control),
            system: fake,
            screen,
            injector,
            dispatcher,
            reporter,
        }
    }

    fn harness(config: Config, windows: Vec<FakeWindow>, model: ScriptedModel) -> Harness {
        let system = Arc::new(FakeWindowSystem::with_windows(windows));
        harness_with(config, system.clone(), system, model)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("условие не выполнено за отведённое время");
    }

    /// Прямоугольник доступен только при проверке окна
    struct VanishingRect {
        inner: Arc<FakeWindowSystem>,
        rect_calls: Mutex<usize>,
    }

    impl WindowSystem for VanishingRect {
        fn find_window(&self, class: &str, title: &str) -> Option<WindowHandle> {
            self.inner.find_window(class, title)
        }

        fn enumerate(&self) -> Box<dyn Iterator<Item = WindowInfo> + '_> {
            self.inner.enumerate()
        }

        fn window_rect(&self, handle: WindowHandle) -> Option<WindowRect> {
            let mut calls = self.rect_calls.lock();
            *calls += 1;
            if *calls == 1 {
                self.inner.window_rect(handle)
            } else {
                None
            }
        }

        fn is_visible(&self, handle: WindowHandle) -> bool {
            self.inner.is_visible(handle)
        }

        fn is_minimized(&self, handle: WindowHandle) -> bool {
            self.inner.is_minimized(handle)
        }
    }

    #[tokio::test]
    async fn test_end_to_end_hold_a_then_d() {
        let model = ScriptedModel::new(A.to_vec()).then(A.to_vec()).then(D.to_vec());
        let h = harness(config(), vec![game_window()], model);

        h.control.start().await.unwrap();
        assert!(h.control.is_running());
        assert_eq!(h.reporter.status(), Status::Running);

        let injector = h.injector.clone();
        wait_for(|| injector.count(KEY_D, KeyDirection::Down) == 1).await;
        h.control.shutdown().await;

        // Кадр снимается от левого верхнего угла окна
        assert_eq!(h.screen.requests.lock()[0], (0, 0, 32, 32));

        assert_eq!(h.injector.count(KEY_A, KeyDirection::Down), 1);
        assert_eq!(h.injector.count(KEY_A, KeyDirection::Up), 0);
        assert_eq!(h.injector.count(KEY_D, KeyDirection::Up), 0);
        assert!(h.dispatcher.key_state(KEY_A).held);
        assert!(h.dispatcher.key_state(KEY_D).held);

        let events = h.injector.events();
        assert_eq!(events[0].key, KEY_A);
        assert_eq!(events[1].key, KEY_D);
    }

    #[tokio::test]
    async fn test_inference_failure_is_logged_and_loop_continues() {
        let model = ScriptedModel::new(A.to_vec()).then_fail("битый тензор");
        let h = harness(config(), vec![game_window()], model);
        let mut lines = h.reporter.subscribe();

        h.control.start().await.unwrap();
        let injector = h.injector.clone();
        wait_for(|| injector.count(KEY_A, KeyDirection::Down) == 1).await;
        h.control.shutdown().await;

        let mut messages = Vec::new();
        while let Ok(line) = lines.try_recv() {
            messages.push(line.message);
        }
        let failed = messages
            .iter()
            .position(|m| m.contains("битый тензор"))
            .expect("ошибка распознавания не попала в журнал");
        let detected = messages
            .iter()
            .position(|m| m == "Обнаружен класс: A")
            .expect("цикл не продолжил работу");
        assert!(failed < detected);
        assert!(h.control.ticks() >= 2);
    }

    #[tokio::test]
    async fn test_capture_failure_skips_tick_without_dispatch() {
        let h = harness(config(), vec![game_window()], ScriptedModel::new(A.to_vec()));
        *h.screen.fail.lock() = true;

        h.control.start().await.unwrap();
        let control = &h.control;
        wait_for(|| control.ticks() >= 3).await;
        assert!(h.injector.events().is_empty());
        assert!(h.control.is_running());

        *h.screen.fail.lock() = false;
        let injector = h.injector.clone();
        wait_for(|| injector.count(KEY_A, KeyDirection::Down) == 1).await;
        h.control.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_fails_when_window_missing_and_can_retry() {
        let h = harness(config(), vec![], ScriptedModel::new(A.to_vec()));

        let result = h.control.start().await;
        assert!(matches!(result, Err(AppError::WindowTimedOut { .. })));
        assert!(!h.control.is_running());
        assert_eq!(h.reporter.status(), Status::WindowNotFound);
        assert!(h.screen.requests.lock().is_empty());

        h.system.add(game_window());
        h.control.start().await.unwrap();
        assert!(h.control.is_running());
        h.control.shutdown().await;
    }

    #[tokio::test]
    async fn test_rect_unavailable_does_not_start_loop() {
        let fake = Arc::new(FakeWindowSystem::with_windows(vec![game_window()]));
        let system = Arc::new(VanishingRect {
            inner: fake.clone(),
            rect_calls: Mutex::new(0),
        });
        let h = harness_with(config(), system, fake, ScriptedModel::new(A.to_vec()));

        let result = h.control.start().await;
        assert!(matches!(result, Err(AppError::WindowRectUnavailable(_))));
        assert!(!h.control.is_running());
        assert_eq!(h.reporter.status(), Status::WindowRectUnavailable);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.control.ticks(), 0);
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let h = harness(config(), vec![game_window()], ScriptedModel::new(A.to_vec()));

        h.control.start().await.unwrap();
        let lookups = *h.system.direct_lookups.lock();
        h.control.start().await.unwrap();

        assert_eq!(*h.system.direct_lookups.lock(), lookups);
        h.control.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_halts_ticks_and_keeps_holds() {
        let h = harness(config(), vec![game_window()], ScriptedModel::new(A.to_vec()));

        h.control.start().await.unwrap();
        let control = &h.control;
        wait_for(|| control.ticks() >= 2).await;

        h.control.shutdown().await;
        assert!(!h.control.is_running());
        assert_eq!(h.reporter.status(), Status::Stopped);

        let ticks = h.control.ticks();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.control.ticks(), ticks);

        // Остановка не отпускает удерживаемые клавиши
        assert!(h.dispatcher.key_state(KEY_A).held);
        assert_eq!(h.injector.count(KEY_A, KeyDirection::Up), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_tap_sequence() {
        let mut config = config();
        config.actions = vec![ActionMapping {
            label: "A".to_string(),
            kind: ActionKind::Tap,
            key: "a".to_string(),
        }];
        let h = harness(config, vec![game_window()], ScriptedModel::new(A.to_vec()));

        h.control.start().await.unwrap();
        let injector = h.injector.clone();
        wait_for(|| injector.count(KEY_A, KeyDirection::Down) >= 1).await;
        h.control.shutdown().await;

        assert_eq!(h.injector.count(KEY_A, KeyDirection::Down), 5);
        assert_eq!(h.injector.count(KEY_A, KeyDirection::Up), 5);
        assert_eq!(h.dispatcher.active_tap_count(), 0);
        assert!(!h.dispatcher.key_state(KEY_A).busy);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_tap_past_timeout() {
        let mut config = config();
        config.control.shutdown_timeout_ms = 50;
        config.actions = vec![ActionMapping {
            label: "A".to_string(),
            kind: ActionKind::Tap,
            key: "a".to_string(),
        }];
        let h = harness(config, vec![game_window()], ScriptedModel::new(A.to_vec()));

        h.control.start().await.unwrap();
        let injector = h.injector.clone();
        wait_for(|| injector.count(KEY_A, KeyDirection::Down) >= 1).await;
        h.control.shutdown().await;

        assert!(h.injector.count(KEY_A, KeyDirection::Down) < 5);
        assert!(!h.dispatcher.key_state(KEY_A).busy);
        let last = *h.injector.events().last().unwrap();
        assert_eq!(last.direction, KeyDirection::Up);
    }

    fn slow_search_config() -> Config {
        let mut config = config();
        config.window.timeout_ms = 10_000;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_search_cancels_start() {
        let h = harness(slow_search_config(), vec![], ScriptedModel::new(A.to_vec()));
        let started = Instant::now();

        let control = h.control.clone();
        let search = tokio::spawn(async move { control.start().await });
        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.reporter.status(), Status::Searching);

        h.control.stop();
        assert!(search.await.unwrap().is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));

        // Окно появилось после отмены: цикл не запускается
        h.system.add(game_window());
        sleep(Duration::from_millis(200)).await;
        assert_eq!(h.control.ticks(), 0);
        assert!(!h.control.is_running());
        assert_eq!(h.reporter.status(), Status::Stopped);
        assert!(h.screen.requests.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_search_leaves_single_running_loop() {
        let h = harness(slow_search_config(), vec![], ScriptedModel::new(A.to_vec()));
        let mut lines = h.reporter.subscribe();

        let control = h.control.clone();
        let first = tokio::spawn(async move { control.start().await });
        sleep(Duration::from_millis(30)).await;
        h.control.stop();

        let control = h.control.clone();
        let second = tokio::spawn(async move { control.start().await });
        sleep(Duration::from_millis(30)).await;

        h.system.add(game_window());
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        let control = &h.control;
        wait_for(|| control.ticks() >= 3).await;
        assert!(h.control.is_running());
        assert_eq!(h.reporter.status(), Status::Running);

        let (mut found, mut cancelled) = (0, 0);
        while let Ok(line) = lines.try_recv() {
            if line.message.starts_with("Найдено окно") {
                found += 1;
            }
            if line.message == "Поиск окна отменён" {
                cancelled += 1;
            }
        }
        assert_eq!((found, cancelled), (1, 1));

        h.control.shutdown().await;
        assert_eq!(h.injector.count(KEY_A, KeyDirection::Down), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_search_timeout_does_not_cancel_newer_run() {
        let mut config = config();
        config.window.timeout_ms = 300;
        config.window.poll_interval_ms = 100;
        let h = harness(config, vec![], ScriptedModel::new(A.to_vec()));

        let control = h.control.clone();
        let first = tokio::spawn(async move { control.start().await });
        sleep(Duration::from_millis(150)).await;
        h.control.stop();

        let control = h.control.clone();
        let second = tokio::spawn(async move { control.start().await });

        // Дедлайн первого поиска (300 мс) проходит, пока второй ещё ищет
        sleep(Duration::from_millis(170)).await;
        h.system.add(game_window());

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert!(h.control.is_running());
        assert_eq!(h.reporter.status(), Status::Running);

        let control = &h.control;
        wait_for(|| control.ticks() >= 1).await;
        h.control.shutdown().await;
    }
}
