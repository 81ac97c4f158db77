use crate::config::TapConfig;
use crate::debug_if_enabled;
use crate::events::{ActionDescriptor, ActionKind, KeyCode, KeyDirection, VirtualKeyEvent};
use crate::services::{KeyInjector, Reporter};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, info};

/// Состояние одной синтетической клавиши
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    /// Клавиша нажата действием Hold и не отпущена
    pub held: bool,
    /// Идёт серия нажатий Tap
    pub busy: bool,
}

/// Перевод меток в синтетические нажатия.
///
/// `key_states` — единственный источник правды о клавишах: и Hold, и Tap
/// меняют его только под блокировкой записи для конкретной клавиши.
pub struct ActionDispatcher {
    injector: Arc<dyn KeyInjector>,
    reporter: Arc<Reporter>,
    tap: TapConfig,
    key_states: Arc<DashMap<KeyCode, KeyState>>,
    active_taps: Arc<DashMap<KeyCode, TapTask>>,
}

/// Отслеживаемая серия нажатий
#[derive(Debug)]
struct TapTask {
    handle: JoinHandle<()>,
}

impl ActionDispatcher {
    pub fn new(injector: Arc<dyn KeyInjector>, reporter: Arc<Reporter>, tap: TapConfig) -> Self {
        info!(
            "Инициализация ActionDispatcher (tap: {}x, {}мс/{}мс)",
            tap.repetitions, tap.down_ms, tap.gap_ms
        );

        Self {
            injector,
            reporter,
            tap,
            key_states: Arc::new(DashMap::new()),
            active_taps: Arc::new(DashMap::new()),
        }
    }

    /// Выполнить действие; `true` если были отправлены события
    pub fn dispatch(&self, action: ActionDescriptor) -> bool {
        match action.kind {
            ActionKind::Hold => self.apply_hold(action.key),
            ActionKind::Tap => self.apply_tap(action.key),
        }
    }

    /// Нажать и держать. Событие отправляется только при переходе
    /// «не нажата → нажата»; автоматического отпускания нет.
    pub fn apply_hold(&self, key: KeyCode) -> bool {
        {
            let mut state = self.key_states.entry(key).or_default();
            if state.busy {
                debug_if_enabled!("Клавиша {} занята серией нажатий, удержание пропущено", key);
                return false;
            }
            if state.held {
                return false;
            }
            state.held = true;
            Self::inject(self.injector.as_ref(), key, KeyDirection::Down);
        }

        self.reporter.info(format!("Удержание клавиши {}: нажата", key));
        true
    }

    /// Запустить серию нажатий в отдельной задаче.
    /// Повторный вызов для занятой или удерживаемой клавиши ничего не делает.
    pub fn apply_tap(&self, key: KeyCode) -> bool {
        {
            let mut state = self.key_states.entry(key).or_default();
            if state.busy || state.held {
                debug_if_enabled!("Клавиша {} занята (held: {}, busy: {}), серия пропущена", key, state.held, state.busy);
                return false;
            }
            state.busy = true;
        }

        let handle = tokio::spawn(Self::tap_task(
            key,
            Arc::clone(&self.injector),
            Arc::clone(&self.reporter),
            Arc::clone(&self.key_states),
            self.tap,
        ));

        // Предыдущая задача этой клавиши уже завершилась: busy был снят
        self.active_taps.insert(key, TapTask { handle });
        true
    }

    /// Снимок состояния клавиши
    pub fn key_state(&self, key: KeyCode) -> KeyState {
        self.key_states.get(&key).map(|s| *s).unwrap_or_default()
    }

    pub fn active_tap_count(&self) -> usize {
        self.active_taps
            .iter()
            .filter(|entry| !entry.value().handle.is_finished())
            .count()
    }

    /// Дождаться завершения всех запущенных серий
    pub async fn join_taps(&self) {
        for (key, task) in self.drain_taps() {
            if let Err(e) = task.handle.await {
                error!("Серия нажатий {} завершилась с ошибкой: {}", key, e);
            }
        }
    }

    /// Ждать серии не дольше `limit`, оставшиеся прервать.
    /// `true` если все серии завершились сами.
    pub async fn finish_taps(&self, limit: Duration) -> bool {
        let mut tasks = self.drain_taps();

        let joined = timeout(limit, async {
            for (_, task) in tasks.iter_mut() {
                let _ = (&mut task.handle).await;
            }
        })
        .await
        .is_ok();

        if !joined {
            let pending = tasks
                .into_iter()
                .filter(|(_, task)| !task.handle.is_finished())
                .collect();
            self.abort_tasks(pending).await;
        }
        joined
    }

    /// Прервать все серии и отпустить их клавиши
    pub async fn cancel_taps(&self) {
        let tasks = self.drain_taps();
        self.abort_tasks(tasks).await;
    }

    async fn abort_tasks(&self, tasks: Vec<(KeyCode, TapTask)>) {
        for (_, task) in &tasks {
            task.handle.abort();
        }

        for (key, task) in tasks {
            let _ = task.handle.await;

            let mut state = self.key_states.entry(key).or_default();
            if state.busy {
                state.busy = false;
                Self::inject(self.injector.as_ref(), key, KeyDirection::Up);
                self.reporter.warn(format!("Серия нажатий {} прервана: отпущена", key));
            }
        }
    }

    /// Отпустить все удерживаемые клавиши
    pub fn release_all(&self) {
        let mut released = Vec::new();

        for mut entry in self.key_states.iter_mut() {
            if entry.held {
                entry.held = false;
                Self::inject(self.injector.as_ref(), *entry.key(), KeyDirection::Up);
                released.push(*entry.key());
            }
        }

        for key in released {
            self.reporter.info(format!("Удержание клавиши {}: отпущена", key));
        }
    }

    fn drain_taps(&self) -> Vec<(KeyCode, TapTask)> {
        let keys: Vec<KeyCode> = self.active_taps.iter().map(|entry| *entry.key()).collect();

        keys.into_iter()
            .filter_map(|key| self.active_taps.remove(&key))
            .collect()
    }

    /// Задача серии нажатий
    async fn tap_task(
        key: KeyCode,
        injector: Arc<dyn KeyInjector>,
        reporter: Arc<Reporter>,
        key_states: Arc<DashMap<KeyCode, KeyState>>,
        tap: TapConfig,
    ) {
        debug_if_enabled!(
            "Запуск серии нажатий {}: {} повторов, {}мс/{}мс",
            key,
            tap.repetitions,
            tap.down_ms,
            tap.gap_ms
        );

        for repeat in 1..=tap.repetitions {
            Self::inject(injector.as_ref(), key, KeyDirection::Down);
            sleep(tap.down()).await;
            Self::inject(injector.as_ref(), key, KeyDirection::Up);
            sleep(tap.gap()).await;

            reporter.info(format!(
                "Быстрое нажатие клавиши {} ({}/{}): нажата и отпущена",
                key, repeat, tap.repetitions
            ));
        }

        if let Some(mut state) = key_states.get_mut(&key) {
            state.busy = false;
        }
        reporter.info(format!("Серия нажатий клавиши {} завершена: отпущена", key));
    }

    fn inject(injector: &dyn KeyInjector, key: KeyCode, direction: KeyDirection) {
        if let Err(e) = injector.send_event(VirtualKeyEvent::new(key, direction)) {
            error!("Не удалось отправить {:?} для {}: {}", direction, key, e);
        }
    }
}
