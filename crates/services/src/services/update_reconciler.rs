//! Background reconciliation of the running build against the deployed one.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use strum_macros::Display;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, sleep_until},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};
use utils::build_info::BuildInfo;

use super::{
    clock::Clock,
    config::{ReconcilerConfig, millis},
    descriptor_source::DescriptorSource,
    navigator::Navigator,
    update_executor::UpdateTrigger,
    version_descriptor::{ForceReason, force_update_reason},
    visibility::Visibility,
};

/// Per-session reconciliation state. Lives for one page load, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilerState {
    pub last_check_timestamp: Option<i64>,
    pub update_in_progress: bool,
    pub update_attempts: u32,
    /// Checks are suppressed until this instant after a post-update reload
    pub suppressed_until: Option<i64>,
}

/// State shared by the reconciler and the executor.
///
/// `update_in_progress` is the latch that keeps a periodic check and a
/// foreground check from both applying an update.
#[derive(Debug, Clone, Default)]
pub struct SessionState(Arc<Mutex<ReconcilerState>>);

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReconcilerState {
        self.update(|s| s.clone())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ReconcilerState) -> R) -> R {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    UpdateInProgress,
    Cooldown,
    TooSoon,
    AttemptLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CheckOutcome {
    Skipped(SkipReason),
    FetchFailed,
    UpToDate,
    UpdateTriggered(ForceReason),
}

/// What caused a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CheckTrigger {
    Initial,
    Interval,
    Foreground,
}

/// How the current page load started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    Fresh,
    /// Loaded by a forced update; checks wait out the cooldown
    JustUpdated,
}

pub struct UpdateReconciler {
    client: BuildInfo,
    source: Arc<dyn DescriptorSource>,
    trigger: Arc<dyn UpdateTrigger>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    state: SessionState,
}

impl UpdateReconciler {
    pub fn new(
        client: BuildInfo,
        source: Arc<dyn DescriptorSource>,
        trigger: Arc<dyn UpdateTrigger>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
        state: SessionState,
    ) -> Self {
        Self {
            client,
            source,
            trigger,
            clock,
            config,
            state,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Detect a load performed by the executor and suppress checks for the
    /// cooldown. The marker is removed with a history replace so the load is
    /// not repeated.
    pub fn start_session(&self, navigator: &dyn Navigator) -> SessionStart {
        let location = navigator.location();
        let params = &self.config.url_params;
        if !params.has_marker(&location) {
            return SessionStart::Fresh;
        }

        navigator.replace_history(params.strip_reload_params(&location));

        let until = self
            .clock
            .now_ms()
            .saturating_add(millis(self.config.post_update_cooldown));
        self.state.update(|s| {
            *s = ReconcilerState {
                suppressed_until: Some(until),
                ..ReconcilerState::default()
            }
        });

        info!(
            build_id = %self.client.build_id,
            version = %self.client.version,
            cooldown = ?self.config.post_update_cooldown,
            "Loaded after update, suppressing checks"
        );
        SessionStart::JustUpdated
    }

    /// Compare the running build against the published descriptor and trigger
    /// an update when it is stale.
    ///
    /// A failed fetch never counts as stale; the cycle is abandoned and the
    /// next scheduled check retries.
    pub async fn check_for_updates(&self) -> CheckOutcome {
        let now = self.clock.now_ms();
        if let Err(reason) = self.begin_check(now) {
            debug!(reason = %reason, "Update check skipped");
            return CheckOutcome::Skipped(reason);
        }

        let descriptor = match self.source.fetch().await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "Version check failed, retrying next cycle");
                return CheckOutcome::FetchFailed;
            }
        };

        let Some(reason) = force_update_reason(&self.client, &descriptor, self.config.tolerance_ms())
        else {
            debug!(build_id = %descriptor.build_id, "Running build is current");
            return CheckOutcome::UpToDate;
        };

        let attempt = self.state.update(|s| {
            s.update_attempts += 1;
            s.update_attempts
        });
        info!(
            reason = %reason,
            client_build_id = %self.client.build_id,
            server_build_id = %descriptor.build_id,
            client_version = %self.client.version,
            server_version = %descriptor.version,
            attempt,
            max_attempts = self.config.max_update_attempts,
            "Stale build detected, triggering update"
        );
        self.trigger.trigger(descriptor).await;

        CheckOutcome::UpdateTriggered(reason)
    }

    /// Apply the guards and claim the check slot in one step
    fn begin_check(&self, now: i64) -> Result<(), SkipReason> {
        let min_interval = millis(self.config.min_check_interval);
        let max_attempts = self.config.max_update_attempts;

        self.state.update(|s| {
            if s.update_in_progress {
                return Err(SkipReason::UpdateInProgress);
            }
            if s.suppressed_until.is_some_and(|until| now < until) {
                return Err(SkipReason::Cooldown);
            }
            if s
                .last_check_timestamp
                .is_some_and(|last| now.saturating_sub(last) < min_interval)
            {
                return Err(SkipReason::TooSoon);
            }
            if s.update_attempts >= max_attempts {
                return Err(SkipReason::AttemptLimit);
            }
            s.last_check_timestamp = Some(now);
            Ok(())
        })
    }

    /// Start the schedule: one check shortly after start, one every poll
    /// interval, and one whenever the page returns to the foreground.
    pub fn spawn(
        self: Arc<Self>,
        navigator: &dyn Navigator,
        visibility: watch::Receiver<Visibility>,
    ) -> ReconcilerHandle {
        let start_delay = match self.start_session(navigator) {
            SessionStart::Fresh => Duration::ZERO,
            SessionStart::JustUpdated => self.config.post_update_cooldown,
        };

        let cancel = CancellationToken::new();
        let checks = TaskTracker::new();
        let task = tokio::spawn(self.run(visibility, start_delay, cancel.clone(), checks.clone()));

        ReconcilerHandle {
            cancel,
            checks,
            task: Some(task),
        }
    }

    async fn run(
        self: Arc<Self>,
        mut visibility: watch::Receiver<Visibility>,
        start_delay: Duration,
        cancel: CancellationToken,
        checks: TaskTracker,
    ) {
        info!(
            build_id = %self.client.build_id,
            version = %self.client.version,
            "Starting update reconciler with interval {:?}, initial delay {:?}, start delay {:?}",
            self.config.poll_interval,
            self.config.initial_check_delay,
            start_delay
        );

        let started = deadline_after(Instant::now(), start_delay);
        let initial = sleep_until(deadline_after(started, self.config.initial_check_delay));
        tokio::pin!(initial);
        let mut initial_pending = true;

        let mut ticker = interval_at(
            deadline_after(started, self.config.poll_interval),
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_visibility = *visibility.borrow_and_update();
        let mut visibility_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut initial, if initial_pending => {
                    initial_pending = false;
                    self.spawn_check(&checks, CheckTrigger::Initial);
                }
                _ = ticker.tick() => {
                    self.spawn_check(&checks, CheckTrigger::Interval);
                }
                changed = visibility.changed(), if visibility_open => match changed {
                    Ok(()) => {
                        let current = *visibility.borrow_and_update();
                        if last_visibility == Visibility::Hidden && current == Visibility::Visible {
                            self.spawn_check(&checks, CheckTrigger::Foreground);
                        }
                        last_visibility = current;
                    }
                    Err(_) => {
                        debug!("Visibility source closed");
                        visibility_open = false;
                    }
                },
            }
        }

        debug!("Update reconciler stopped");
    }

    /// Each firing runs on its own task so a hung fetch cannot hold up later ones
    fn spawn_check(self: &Arc<Self>, checks: &TaskTracker, trigger: CheckTrigger) {
        let reconciler = Arc::clone(self);
        checks.spawn(async move {
            let outcome = reconciler.check_for_updates().await;
            debug!(trigger = %trigger, outcome = ?outcome, "Update check finished");
        });
    }
}

/// `base + delay`, or a deadline that never arrives when that overflows
fn deadline_after(base: Instant, delay: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    base.checked_add(delay)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// Owns the reconciliation loop. Dropping it stops the schedule.
pub struct ReconcilerHandle {
    cancel: CancellationToken,
    checks: TaskTracker,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Stop scheduling and wait for in-flight checks to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Update reconciler task failed");
            }
        }
        self.checks.close();
        self.checks.wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::services::{
        clock::{ManualClock, TokioClock},
        descriptor_source::FetchError,
        navigator::{MemoryNavigator, Navigation},
        prompt::StaticPrompt,
        storage::MemoryStorage,
        update_executor::UpdateExecutor,
        version_descriptor::VersionDescriptor,
        visibility::PageVisibility,
    };

    const T: i64 = 1_760_000_000_000;

    /// Serves a fixed descriptor (or a failure) and counts requests
    struct FakeSource {
        response: Mutex<Result<VersionDescriptor, FetchError>>,
        fetches: AtomicUsize,
    }

    impl FakeSource {
        fn serving(descriptor: VersionDescriptor) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Ok(descriptor)),
                fetches: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Err(FetchError::Transport("connection reset".into()))),
                fetches: AtomicUsize::new(0),
            })
        }

        fn set(&self, response: Result<VersionDescriptor, FetchError>) {
            *self.response.lock().unwrap() = response;
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DescriptorSource for FakeSource {
        async fn fetch(&self) -> Result<VersionDescriptor, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.response.lock().unwrap().clone()
        }
    }

    /// Records triggers without touching the session latch, standing in for
    /// an update that never gets to reload
    #[derive(Default)]
    struct RecordingTrigger {
        triggered: Mutex<Vec<VersionDescriptor>>,
    }

    impl RecordingTrigger {
        fn count(&self) -> usize {
            self.triggered.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UpdateTrigger for RecordingTrigger {
        async fn trigger(&self, descriptor: VersionDescriptor) {
            self.triggered.lock().unwrap().push(descriptor);
        }
    }

    fn client() -> BuildInfo {
        BuildInfo::new("3.15.0", "abc-1", T)
    }

    fn server(build_id: &str) -> VersionDescriptor {
        VersionDescriptor::for_build(&BuildInfo::new("3.15.0", build_id, T))
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig::new(Url::parse("https://app.example/version.json").unwrap())
    }

    fn reconciler(
        source: Arc<FakeSource>,
        trigger: Arc<dyn UpdateTrigger>,
        clock: Arc<dyn Clock>,
        state: SessionState,
    ) -> UpdateReconciler {
        UpdateReconciler::new(client(), source, trigger, clock, config(), state)
    }

    #[tokio::test]
    async fn test_same_build_triggers_nothing() {
        let source = FakeSource::serving(server("abc-1"));
        let trigger = Arc::new(RecordingTrigger::default());
        let clock = Arc::new(ManualClock::new(T));
        let r = reconciler(source.clone(), trigger.clone(), clock, SessionState::new());

        assert_eq!(r.check_for_updates().await, CheckOutcome::UpToDate);
        assert_eq!(trigger.count(), 0);
        assert_eq!(r.state().snapshot().update_attempts, 0);
    }

    #[tokio::test]
    async fn test_new_build_id_triggers_update() {
        let source = FakeSource::serving(server("def-2"));
        let trigger = Arc::new(RecordingTrigger::default());
        let clock = Arc::new(ManualClock::new(T));
        let r = reconciler(source, trigger.clone(), clock, SessionState::new());

        assert_eq!(
            r.check_for_updates().await,
            CheckOutcome::UpdateTriggered(ForceReason::BuildId)
        );
        let triggered = trigger.triggered.lock().unwrap().clone();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].build_id, "def-2");
        assert!(triggered[0].force_update);
        assert_eq!(r.state().snapshot().update_attempts, 1);
    }

    #[tokio::test]
    async fn test_checks_within_interval_fetch_once() {
        let source = FakeSource::serving(server("abc-1"));
        let clock = Arc::new(ManualClock::new(T));
        let r = reconciler(
            source.clone(),
            Arc::new(RecordingTrigger::default()),
            clock.clone(),
            SessionState::new(),
        );

        assert_eq!(r.check_for_updates().await, CheckOutcome::UpToDate);
        clock.advance_ms(29_999);
        assert_eq!(
            r.check_for_updates().await,
            CheckOutcome::Skipped(SkipReason::TooSoon)
        );
        assert_eq!(source.fetches(), 1);

        clock.advance_ms(1);
        assert_eq!(r.check_for_updates().await, CheckOutcome::UpToDate);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_checks_fetch_once() {
        let source = FakeSource::serving(server("abc-1"));
        let r = reconciler(
            source.clone(),
            Arc::new(RecordingTrigger::default()),
            Arc::new(ManualClock::new(T)),
            SessionState::new(),
        );

        let (a, b) = tokio::join!(r.check_for_updates(), r.check_for_updates());

        assert_eq!(source.fetches(), 1);
        assert!(
            [a, b].contains(&CheckOutcome::Skipped(SkipReason::TooSoon)),
            "one check must be skipped: {a:?} {b:?}"
        );
    }

    #[tokio::test]
    async fn test_attempt_cap_stops_triggering() {
        let source = FakeSource::serving(server("def-2"));
        let trigger = Arc::new(RecordingTrigger::default());
        let clock = Arc::new(ManualClock::new(T));
        let r = reconciler(source.clone(), trigger.clone(), clock.clone(), SessionState::new());

        for _ in 0..3 {
            assert!(matches!(
                r.check_for_updates().await,
                CheckOutcome::UpdateTriggered(_)
            ));
            clock.advance_ms(31_000);
        }

        assert_eq!(
            r.check_for_updates().await,
            CheckOutcome::Skipped(SkipReason::AttemptLimit)
        );
        assert_eq!(trigger.count(), 3);
        assert_eq!(source.fetches(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_only_records_timestamp() {
        let source = FakeSource::failing();
        let trigger = Arc::new(RecordingTrigger::default());
        let clock = Arc::new(ManualClock::new(T));
        let r = reconciler(source.clone(), trigger.clone(), clock.clone(), SessionState::new());

        assert_eq!(r.check_for_updates().await, CheckOutcome::FetchFailed);
        assert_eq!(
            r.state().snapshot(),
            ReconcilerState {
                last_check_timestamp: Some(T),
                ..ReconcilerState::default()
            }
        );
        assert_eq!(trigger.count(), 0);

        clock.advance_ms(30_000);
        source.set(Ok(server("abc-1")));
        assert_eq!(r.check_for_updates().await, CheckOutcome::UpToDate);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_in_progress_update_blocks_checks() {
        let source = FakeSource::serving(server("def-2"));
        let state = SessionState::new();
        state.update(|s| s.update_in_progress = true);
        let r = reconciler(
            source.clone(),
            Arc::new(RecordingTrigger::default()),
            Arc::new(ManualClock::new(T)),
            state,
        );

        assert_eq!(
            r.check_for_updates().await,
            CheckOutcome::Skipped(SkipReason::UpdateInProgress)
        );
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_declined_update_is_reevaluated_next_cycle() {
        let source = FakeSource::serving({
            let mut d = server("def-2");
            d.force_update = false;
            d
        });
        let storage = Arc::new(MemoryStorage::new());
        storage.add_cache("runtime");
        let navigator = Arc::new(MemoryNavigator::new(
            Url::parse("https://app.example/").unwrap(),
        ));
        let clock = Arc::new(ManualClock::new(T));
        let state = SessionState::new();
        let executor = Arc::new(UpdateExecutor::new(
            storage.clone(),
            navigator.clone(),
            Arc::new(StaticPrompt(false)),
            clock.clone(),
            config().url_params,
            state.clone(),
        ));
        let r = reconciler(source.clone(), executor, clock.clone(), state.clone());

        assert!(matches!(
            r.check_for_updates().await,
            CheckOutcome::UpdateTriggered(ForceReason::BuildId)
        ));
        assert!(!state.snapshot().update_in_progress);
        assert!(navigator.history().is_empty());
        assert_eq!(storage.cache_names(), vec!["runtime".to_string()]);

        clock.advance_ms(30_000);
        assert!(matches!(
            r.check_for_updates().await,
            CheckOutcome::UpdateTriggered(_)
        ));
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_silent_update_latches_session() {
        let source = FakeSource::serving(server("def-2"));
        let navigator = Arc::new(MemoryNavigator::new(
            Url::parse("https://app.example/").unwrap(),
        ));
        let clock = Arc::new(ManualClock::new(T));
        let state = SessionState::new();
        let executor = Arc::new(UpdateExecutor::new(
            Arc::new(MemoryStorage::new()),
            navigator.clone(),
            Arc::new(StaticPrompt(false)),
            clock.clone(),
            config().url_params,
            state.clone(),
        ));
        let r = reconciler(source.clone(), executor, clock.clone(), state);

        r.check_for_updates().await;
        clock.advance_ms(60_000);

        assert_eq!(
            r.check_for_updates().await,
            CheckOutcome::Skipped(SkipReason::UpdateInProgress)
        );
        assert_eq!(navigator.reloads().len(), 1);
        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn test_start_session_strips_marker_and_resets_state() {
        let clock = Arc::new(ManualClock::new(T));
        let state = SessionState::new();
        state.update(|s| {
            s.update_attempts = 2;
            s.update_in_progress = true;
        });
        let r = reconciler(
            FakeSource::serving(server("abc-1")),
            Arc::new(RecordingTrigger::default()),
            clock,
            state.clone(),
        );
        let navigator = MemoryNavigator::new(
            Url::parse("https://app.example/projects?id=9&_t=123&_updated=true").unwrap(),
        );

        assert_eq!(r.start_session(&navigator), SessionStart::JustUpdated);
        assert_eq!(
            navigator.history(),
            vec![Navigation::HistoryReplace(
                Url::parse("https://app.example/projects?id=9").unwrap()
            )]
        );
        assert_eq!(
            state.snapshot(),
            ReconcilerState {
                suppressed_until: Some(T + 30_000),
                ..ReconcilerState::default()
            }
        );
    }

    #[test]
    fn test_start_session_without_marker_is_fresh() {
        let r = reconciler(
            FakeSource::serving(server("abc-1")),
            Arc::new(RecordingTrigger::default()),
            Arc::new(ManualClock::new(T)),
            SessionState::new(),
        );
        let navigator = MemoryNavigator::new(Url::parse("https://app.example/?id=9").unwrap());

        assert_eq!(r.start_session(&navigator), SessionStart::Fresh);
        assert!(navigator.history().is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_guard_expires() {
        let clock = Arc::new(ManualClock::new(T));
        let source = FakeSource::serving(server("abc-1"));
        let r = reconciler(
            source.clone(),
            Arc::new(RecordingTrigger::default()),
            clock.clone(),
            SessionState::new(),
        );
        r.start_session(&MemoryNavigator::new(
            Url::parse("https://app.example/?_updated=true").unwrap(),
        ));

        assert_eq!(
            r.check_for_updates().await,
            CheckOutcome::Skipped(SkipReason::Cooldown)
        );
        clock.advance_ms(30_000);
        assert_eq!(r.check_for_updates().await, CheckOutcome::UpToDate);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_oversized_cooldown_saturates() {
        let mut config = config();
        config.post_update_cooldown = Duration::from_millis(u64::MAX / 2);
        config.min_check_interval = Duration::MAX;
        let source = FakeSource::serving(server("abc-1"));
        let state = SessionState::new();
        let r = UpdateReconciler::new(
            client(),
            source.clone(),
            Arc::new(RecordingTrigger::default()),
            Arc::new(ManualClock::new(T)),
            config,
            state.clone(),
        );

        let navigator = MemoryNavigator::new(Url::parse("https://a/?_updated=1").unwrap());
        assert_eq!(r.start_session(&navigator), SessionStart::JustUpdated);
        assert_eq!(state.snapshot().suppressed_until, Some(i64::MAX));
        assert_eq!(
            r.check_for_updates().await,
            CheckOutcome::Skipped(SkipReason::Cooldown)
        );
        assert_eq!(source.fetches(), 0);
    }

    fn scheduled(
        source: Arc<FakeSource>,
        location: &str,
    ) -> (Arc<UpdateReconciler>, MemoryNavigator) {
        let r = Arc::new(reconciler(
            source,
            Arc::new(RecordingTrigger::default()),
            Arc::new(TokioClock::starting_at(T)),
            SessionState::new(),
        ));
        (r, MemoryNavigator::new(Url::parse(location).unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_initial_then_periodic() {
        let source = FakeSource::serving(server("abc-1"));
        let (r, navigator) = scheduled(source.clone(), "https://app.example/");
        let visibility = PageVisibility::default();
        let handle = r.clone().spawn(&navigator, visibility.subscribe());

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(source.fetches(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.fetches(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(source.fetches(), 2);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(source.fetches(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_update_load_is_quiet_for_cooldown() {
        let source = FakeSource::serving(server("abc-1"));
        let (r, navigator) =
            scheduled(source.clone(), "https://app.example/?_t=1&_updated=true");
        let visibility = PageVisibility::default();
        let handle = r.clone().spawn(&navigator, visibility.subscribe());

        assert!(!r.config().url_params.has_marker(&navigator.location()));
        assert_eq!(navigator.location().as_str(), "https://app.example/");

        // Foregrounding during the cooldown does not reach the network
        tokio::time::sleep(Duration::from_secs(5)).await;
        visibility.set(Visibility::Hidden);
        tokio::time::sleep(Duration::from_secs(5)).await;
        visibility.set(Visibility::Visible);

        tokio::time::sleep(Duration::from_millis(19_900)).await;
        assert_eq!(source.fetches(), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(source.fetches(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_foregrounding_triggers_check() {
        let source = FakeSource::serving(server("abc-1"));
        let (r, navigator) = scheduled(source.clone(), "https://app.example/");
        let visibility = PageVisibility::default();
        let handle = r.clone().spawn(&navigator, visibility.subscribe());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(source.fetches(), 1);

        visibility.set(Visibility::Hidden);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.fetches(), 1);

        visibility.set(Visibility::Visible);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.fetches(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_visibility_listener() {
        let source = FakeSource::serving(server("abc-1"));
        let (r, navigator) = scheduled(source.clone(), "https://app.example/");
        let visibility = PageVisibility::default();
        let handle = r.clone().spawn(&navigator, visibility.subscribe());
        assert_eq!(visibility.subscriber_count(), 1);
        assert!(handle.is_running());

        handle.shutdown().await;

        assert_eq!(visibility.subscriber_count(), 0);
        tokio::time::sleep(Duration::from_secs(15 * 60)).await;
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_intervals_still_schedule() {
        let mut config = config();
        config.initial_check_delay = Duration::MAX;
        config.poll_interval = Duration::MAX;
        let source = FakeSource::serving(server("abc-1"));
        let r = Arc::new(UpdateReconciler::new(
            client(),
            source.clone(),
            Arc::new(RecordingTrigger::default()),
            Arc::new(TokioClock::starting_at(T)),
            config,
            SessionState::new(),
        ));
        let navigator = MemoryNavigator::new(Url::parse("https://app.example/").unwrap());
        let visibility = PageVisibility::default();
        let handle = r.clone().spawn(&navigator, visibility.subscribe());

        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert_eq!(source.fetches(), 0);

        visibility.set(Visibility::Hidden);
        tokio::time::sleep(Duration::from_millis(10)).await;
        visibility.set(Visibility::Visible);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.fetches(), 1);
        assert!(handle.is_running());

        handle.shutdown().await;
    }
}
