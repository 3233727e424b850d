//! Scripted OS and step-execution doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use focusplay_lib::models::IdentityHints;
use focusplay_lib::{
    ForegroundProbe, PlaybackController, PlaybackSession, PlaybackSettings, ProcessMatch,
    ProcessProbe, StepExecutor, StepResult,
};

pub const WAIT: Duration = Duration::from_secs(3);

/// Several focus poll intervals at `fast_settings`.
pub const SETTLE: Duration = Duration::from_millis(50);

/// In-memory process table and foreground window.
#[derive(Default)]
pub struct FakeOs {
    processes: Mutex<HashMap<String, u32>>,
    foreground: Mutex<Option<u32>>,
    foreground_error: Mutex<Option<String>>,
}

impl FakeOs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launch(&self, process_name: &str, pid: u32) {
        self.processes
            .lock()
            .unwrap()
            .insert(process_name.to_string(), pid);
    }

    pub fn kill(&self, process_name: &str) {
        self.processes.lock().unwrap().remove(process_name);
    }

    pub fn focus(&self, pid: Option<u32>) {
        *self.foreground.lock().unwrap() = pid;
        *self.foreground_error.lock().unwrap() = None;
    }

    pub fn break_foreground_query(&self, reason: &str) {
        *self.foreground_error.lock().unwrap() = Some(reason.to_string());
    }
}

impl ProcessProbe for FakeOs {
    fn query_process(&self, hints: &IdentityHints) -> anyhow::Result<Option<ProcessMatch>> {
        let processes = self.processes.lock().unwrap();
        Ok(hints
            .process_name
            .as_deref()
            .and_then(|name| processes.get(name))
            .map(|&process_id| ProcessMatch {
                process_id,
                alive: true,
            }))
    }

    fn is_alive(&self, process_id: u32) -> anyhow::Result<bool> {
        Ok(self
            .processes
            .lock()
            .unwrap()
            .values()
            .any(|&pid| pid == process_id))
    }
}

impl ForegroundProbe for FakeOs {
    fn foreground_process(&self) -> anyhow::Result<Option<u32>> {
        if let Some(reason) = self.foreground_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{reason}"));
        }
        Ok(*self.foreground.lock().unwrap())
    }
}

/// Step executor whose steps complete only when the test releases a result.
pub struct GatedExecutor {
    release_tx: mpsc::UnboundedSender<StepResult>,
    release_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StepResult>>,
    dispatched: Mutex<Vec<u64>>,
    ignores_cancel: AtomicBool,
}

impl GatedExecutor {
    pub fn new() -> Arc<Self> {
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            release_tx,
            release_rx: tokio::sync::Mutex::new(release_rx),
            dispatched: Mutex::new(Vec::new()),
            ignores_cancel: AtomicBool::new(false),
        })
    }

    pub fn release(&self, result: StepResult) {
        self.release_tx.send(result).unwrap();
    }

    pub fn release_successes(&self, count: usize) {
        for _ in 0..count {
            self.release(StepResult::Succeeded);
        }
    }

    pub fn ignore_cancellation(&self) {
        self.ignores_cancel.store(true, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<u64> {
        self.dispatched.lock().unwrap().clone()
    }

    pub async fn wait_dispatched(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.dispatched.lock().unwrap().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} dispatched steps, saw {:?}",
                self.dispatched()
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[async_trait]
impl StepExecutor for GatedExecutor {
    async fn execute_step(
        &self,
        _session: &PlaybackSession,
        step_index: u64,
        cancel: CancellationToken,
    ) -> StepResult {
        self.dispatched.lock().unwrap().push(step_index);
        let mut release = self.release_rx.lock().await;

        if self.ignores_cancel.load(Ordering::SeqCst) {
            return release.recv().await.unwrap_or(StepResult::Exhausted);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => StepResult::Cancelled,
            result = release.recv() => result.unwrap_or(StepResult::Exhausted),
        }
    }
}

pub fn fast_settings() -> PlaybackSettings {
    PlaybackSettings {
        focus_poll_interval_ms: 5,
        focus_debounce_ms: 0,
        probe_timeout_ms: 1_000,
        stop_grace_ms: 500,
        liveness_interval_ms: 20,
        ..PlaybackSettings::default()
    }
}

pub struct Harness {
    pub os: Arc<FakeOs>,
    pub executor: Arc<GatedExecutor>,
    pub controller: PlaybackController,
}

pub fn harness() -> Harness {
    harness_with(fast_settings())
}

pub fn harness_with(settings: PlaybackSettings) -> Harness {
    let os = FakeOs::new();
    let executor = GatedExecutor::new();
    let controller = PlaybackController::new(settings, os.clone(), os.clone(), executor.clone());
    Harness {
        os,
        executor,
        controller,
    }
}

impl Harness {
    pub async fn wait_for<F>(&self, app_id: &str, what: &str, predicate: F) -> PlaybackSession
    where
        F: FnMut(&PlaybackSession) -> bool,
    {
        match self.controller.wait_for_session(app_id, WAIT, predicate).await {
            Some(session) => session,
            None => panic!(
                "timed out waiting for {what}; last snapshot: {:?}",
                self.controller.get_session(app_id)
            ),
        }
    }

    /// Give the focus monitor time to sample a change to the scripted OS.
    pub async fn settle(&self) {
        tokio::time::sleep(SETTLE).await;
    }

    /// Queue `command` behind the step in flight, then let that step succeed
    /// so the command is applied at the boundary.
    pub async fn at_step_boundary<T>(&self, command: impl Future<Output = T>) -> T {
        let (output, ()) = tokio::join!(command, async {
            self.executor.release(StepResult::Succeeded)
        });
        output
    }

    pub async fn wait_no_subscriptions(&self) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.controller.active_focus_subscriptions() != 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "focus subscriptions still alive: {}",
                self.controller.active_focus_subscriptions()
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}
