use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::os_bridge::{ForegroundProbe, ProcessProbe};
use crate::settings::PlaybackSettings;

use super::policy::FocusSignal;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FocusEventKind {
    Gained,
    Lost,
    /// The foreground query failed; focus is unknown until a later sample
    /// succeeds.
    Degraded { reason: String },
    /// The subscribed process is gone. Last event of a subscription.
    TargetExited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusEvent {
    pub kind: FocusEventKind,
    pub at: DateTime<Utc>,
}

impl FocusEvent {
    fn now(kind: FocusEventKind) -> Self {
        Self { kind, at: Utc::now() }
    }

    /// The resolver's view of this event; `None` for process exit.
    pub fn signal(&self) -> Option<FocusSignal> {
        match self.kind {
            FocusEventKind::Gained => Some(FocusSignal::Gained),
            FocusEventKind::Lost => Some(FocusSignal::Lost),
            FocusEventKind::Degraded { .. } => Some(FocusSignal::Degraded),
            FocusEventKind::TargetExited => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FocusMonitorConfig {
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub probe_timeout: Duration,
}

impl From<&PlaybackSettings> for FocusMonitorConfig {
    fn from(settings: &PlaybackSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            debounce: settings.debounce(),
            probe_timeout: settings.probe_timeout(),
        }
    }
}

/// Cloneable handle used to end a subscription. Teardown happens once; later
/// calls are no-ops, including after the monitoring task ended on its own.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    process_id: u32,
    cancel: CancellationToken,
    torn_down: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

pub struct FocusSubscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<FocusEvent>,
}

/// Samples OS focus for subscribed process ids and reports changes only.
///
/// Every subscription owns its own monitoring task, even when several target
/// the same process.
pub struct FocusMonitor {
    foreground: Arc<dyn ForegroundProbe>,
    processes: Arc<dyn ProcessProbe>,
    config: FocusMonitorConfig,
    next_id: AtomicU64,
    live_tasks: Arc<AtomicUsize>,
}

impl FocusMonitor {
    pub fn new(
        foreground: Arc<dyn ForegroundProbe>,
        processes: Arc<dyn ProcessProbe>,
        config: FocusMonitorConfig,
    ) -> Self {
        Self {
            foreground,
            processes,
            config,
            next_id: AtomicU64::new(1),
            live_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self, process_id: u32) -> FocusSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.live_tasks.fetch_add(1, Ordering::SeqCst);
        let worker = MonitorWorker {
            subscription_id: id,
            process_id,
            foreground: Arc::clone(&self.foreground),
            processes: Arc::clone(&self.processes),
            config: self.config,
            events: events_tx,
            cancel: cancel.clone(),
        };
        let live_tasks = Arc::clone(&self.live_tasks);
        tokio::spawn(async move {
            worker.run().await;
            live_tasks.fetch_sub(1, Ordering::SeqCst);
        });

        log_info!("Focus subscription {id} started for pid {process_id}");

        FocusSubscription {
            handle: SubscriptionHandle {
                id,
                process_id,
                cancel,
                torn_down: Arc::new(AtomicBool::new(false)),
            },
            events: events_rx,
        }
    }

    /// Returns `true` only for the call that actually tore the subscription down.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        if handle.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        handle.cancel.cancel();
        log_info!(
            "Focus subscription {} for pid {} torn down",
            handle.id,
            handle.process_id
        );
        true
    }

    /// Number of monitoring tasks still running.
    pub fn active_subscriptions(&self) -> usize {
        self.live_tasks.load(Ordering::SeqCst)
    }
}

enum Sample {
    Focus(bool),
    Failed(String),
    Exited,
}

struct MonitorWorker {
    subscription_id: u64,
    process_id: u32,
    foreground: Arc<dyn ForegroundProbe>,
    processes: Arc<dyn ProcessProbe>,
    config: FocusMonitorConfig,
    events: mpsc::UnboundedSender<FocusEvent>,
    cancel: CancellationToken,
}

impl MonitorWorker {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tracker = FocusTracker::new(self.config.debounce);
        let mut degraded = false;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sample = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sample = self.sample() => sample,
            };

            let event = match sample {
                Sample::Exited => {
                    log_info!(
                        "Focus subscription {}: pid {} exited",
                        self.subscription_id,
                        self.process_id
                    );
                    let _ = self.events.send(FocusEvent::now(FocusEventKind::TargetExited));
                    break;
                }
                Sample::Failed(reason) => {
                    if degraded {
                        continue;
                    }
                    degraded = true;
                    tracker.reset();
                    log_warn!(
                        "Focus subscription {} degraded: {reason}",
                        self.subscription_id
                    );
                    FocusEvent::now(FocusEventKind::Degraded { reason })
                }
                Sample::Focus(focused) => {
                    if degraded {
                        degraded = false;
                        log_info!("Focus subscription {} recovered", self.subscription_id);
                    }
                    match tracker.observe(focused, Instant::now()) {
                        Some(true) => FocusEvent::now(FocusEventKind::Gained),
                        Some(false) => FocusEvent::now(FocusEventKind::Lost),
                        None => continue,
                    }
                }
            };

            log_debug!(
                "Focus subscription {} -> {:?}",
                self.subscription_id,
                event.kind
            );
            if self.events.send(event).is_err() {
                // Subscriber dropped its receiver
                break;
            }
        }

        log_debug!("Focus subscription {} loop exited", self.subscription_id);
    }

    async fn sample(&self) -> Sample {
        let process_id = self.process_id;
        let foreground = Arc::clone(&self.foreground);
        let processes = Arc::clone(&self.processes);

        let task = tokio::task::spawn_blocking(move || {
            match processes.is_alive(process_id) {
                Ok(false) => return Sample::Exited,
                Ok(true) => {}
                Err(err) => log_debug!("Liveness check for pid {process_id} failed: {err:#}"),
            }

            match foreground.foreground_process() {
                Ok(owner) => Sample::Focus(owner == Some(process_id)),
                Err(err) => Sample::Failed(format!("{err:#}")),
            }
        });

        match tokio::time::timeout(self.config.probe_timeout, task).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(join_err)) => Sample::Failed(format!("focus probe worker failed: {join_err}")),
            Err(_) => Sample::Failed(format!(
                "focus probe timed out after {}ms",
                self.config.probe_timeout.as_millis()
            )),
        }
    }
}

/// Debounces raw focus samples: a new value is reported only after it has
/// held for at least `debounce`.
#[derive(Debug)]
pub(crate) struct FocusTracker {
    debounce: Duration,
    reported: Option<bool>,
    pending: Option<(bool, Instant)>,
}

impl FocusTracker {
    pub(crate) fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            reported: None,
            pending: None,
        }
    }

    pub(crate) fn observe(&mut self, focused: bool, now: Instant) -> Option<bool> {
        if self.reported == Some(focused) {
            self.pending = None;
            return None;
        }

        match self.pending {
            Some((value, since)) if value == focused => {
                if now.saturating_duration_since(since) >= self.debounce {
                    self.commit(focused)
                } else {
                    None
                }
            }
            _ if self.debounce.is_zero() => self.commit(focused),
            _ => {
                self.pending = Some((focused, now));
                None
            }
        }
    }

    /// Forget the last reported value so the next stable sample is reported.
    pub(crate) fn reset(&mut self) {
        self.reported = None;
        self.pending = None;
    }

    fn commit(&mut self, focused: bool) -> Option<bool> {
        self.reported = Some(focused);
        self.pending = None;
        Some(focused)
    }
}
