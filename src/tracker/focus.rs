//! Focus tracking state machine and poll loop.
//!
//! Every poll tick the tracker samples system idle time and the focused
//! window, then advances a state machine over `{no-window,
//! tracking(window, idle-state)}`. Finalizing a tracked interval (a
//! "flush") produces one immutable [`ActivityEvent`] with idle time
//! subtracted from the elapsed span; intervals shorter than the
//! configured minimum are discarded silently.
//!
//! The state machine ([`TrackerState`]) is pure — it consumes explicit
//! [`PollSample`]s and returns [`TrackerEffect`]s — so the time-window
//! arithmetic is testable without a runtime. The async loop
//! ([`FocusTracker`]) owns the probe, the cadence, and effect delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::client::BackendClient;
use crate::config::TrackerConfig;
use crate::events::BridgeEvent;
use crate::models::activity::ActivityEvent;
use crate::models::window::WindowInfo;
use crate::tracker::probe::FocusProbe;

// ── Samples and effects ──────────────────────────────────────────────────────

/// One observation of OS focus state at a point in time.
#[derive(Debug, Clone)]
pub struct PollSample {
    /// Sample timestamp.
    pub now: DateTime<Utc>,
    /// System idle duration at sample time.
    pub idle: Duration,
    /// Focused window, or `None` when nothing has focus.
    pub window: Option<WindowInfo>,
}

/// Side effects requested by one state-machine step.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEffect {
    /// Forward a finalized activity event to the backend.
    Emit(ActivityEvent),
    /// The system crossed into (`true`) or out of (`false`) idle.
    IdleChanged(bool),
}

// ── State machine ────────────────────────────────────────────────────────────

/// The window currently being tracked.
#[derive(Debug, Clone)]
struct TrackedWindow {
    info: WindowInfo,
    started_at: DateTime<Utc>,
    idle_accum: Duration,
}

/// Pure focus-tracking state machine.
#[derive(Debug)]
pub struct TrackerState {
    config: TrackerConfig,
    window: Option<TrackedWindow>,
    /// Start of the open idle interval, when the system is idle.
    idle_since: Option<DateTime<Utc>>,
    session_id: Option<String>,
}

impl TrackerState {
    /// Fresh state: no window tracked, user not idle.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            window: None,
            idle_since: None,
            session_id: None,
        }
    }

    /// Update the session id stamped onto flushed events.
    pub fn set_session(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    /// Whether the system is currently considered idle.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle_since.is_some()
    }

    /// Identity of the window currently being tracked, if any.
    #[must_use]
    pub fn tracked_window(&self) -> Option<&WindowInfo> {
        self.window.as_ref().map(|t| &t.info)
    }

    /// Advance the state machine by one sample.
    pub fn observe(&mut self, sample: &PollSample) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();

        // 1. Idle threshold crossings. The interval start is backdated to
        //    when input actually stopped, so a completed interval covers
        //    the whole silent span.
        let was_idle = self.idle_since.is_some();
        let is_idle = sample.idle >= self.config.idle_threshold();
        if is_idle && !was_idle {
            self.idle_since = Some(sample.now - to_delta(sample.idle));
            effects.push(TrackerEffect::IdleChanged(true));
        } else if !is_idle && was_idle {
            if let Some(since) = self.idle_since.take() {
                if let Some(tracked) = &mut self.window {
                    let from = since.max(tracked.started_at);
                    tracked.idle_accum += to_duration(sample.now - from);
                }
            }
            effects.push(TrackerEffect::IdleChanged(false));
        }

        // 2–4. Window identity handling.
        match &sample.window {
            // Nothing focused (locked screen): flush and clear.
            None => self.flush_into(&mut effects, sample.now),

            // Browser focus belongs to the extension; flush the desktop
            // window but never emit an event for the browser itself.
            Some(info) if self.config.is_browser_app(&info.app_name) => {
                self.flush_into(&mut effects, sample.now);
            }

            Some(info) => {
                let switched = self
                    .window
                    .as_ref()
                    .is_none_or(|t| !t.info.same_identity(info));

                if switched {
                    self.flush_into(&mut effects, sample.now);
                    self.window = Some(TrackedWindow {
                        info: info.clone(),
                        started_at: sample.now,
                        idle_accum: Duration::ZERO,
                    });
                } else if let Some(tracked) = &mut self.window {
                    if tracked.info.title != info.title {
                        // Same window, new title: update in place.
                        tracked.info.title.clone_from(&info.title);
                    }
                }
            }
        }

        effects
    }

    /// Finalize the tracked window into an event, if it lasted long
    /// enough. Clears the tracked window either way.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<ActivityEvent> {
        let tracked = self.window.take()?;
        let elapsed = to_duration(now - tracked.started_at);

        if elapsed < self.config.min_window() {
            return None;
        }

        let mut idle = tracked.idle_accum;
        if let Some(since) = self.idle_since {
            let from = since.max(tracked.started_at);
            idle += to_duration(now - from);
            // The user is still idle; attribute the remainder of the
            // interval to whatever is tracked next.
            self.idle_since = Some(now);
        }

        let idle = idle.min(elapsed);
        let active = elapsed - idle;

        Some(ActivityEvent::desktop(
            &tracked.info,
            tracked.started_at,
            now,
            whole_seconds(active),
            whole_seconds(idle),
            self.session_id.clone(),
        ))
    }

    fn flush_into(&mut self, effects: &mut Vec<TrackerEffect>, now: DateTime<Utc>) {
        if let Some(event) = self.flush(now) {
            effects.push(TrackerEffect::Emit(event));
        }
    }
}

/// Saturating conversion from a chrono delta to `Duration`.
fn to_duration(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

/// Saturating conversion from `Duration` to a chrono delta.
fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Duration in whole seconds for the event payload.
fn whole_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

// ── Poll loop ────────────────────────────────────────────────────────────────

/// Async driver for the tracker state machine.
pub struct FocusTracker {
    probe: Box<dyn FocusProbe>,
    backend: Arc<BackendClient>,
    session_rx: watch::Receiver<Option<String>>,
    events: mpsc::Sender<BridgeEvent>,
    config: TrackerConfig,
}

impl FocusTracker {
    /// Assemble a tracker over the given probe and backend client.
    #[must_use]
    pub fn new(
        probe: Box<dyn FocusProbe>,
        backend: Arc<BackendClient>,
        session_rx: watch::Receiver<Option<String>>,
        events: mpsc::Sender<BridgeEvent>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            probe,
            backend,
            session_rx,
            events,
            config,
        }
    }

    /// Spawn the poll loop. Cancellation performs one final flush before
    /// the loop halts, so no tracked interval is silently lost.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        let mut state = TrackerState::new(self.config.clone());
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval = ?self.config.poll_interval(),
            idle_threshold = ?self.config.idle_threshold(),
            "focus tracker started"
        );

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    if let Some(event) = state.flush(Utc::now()) {
                        self.forward(event).await;
                    }
                    info!("focus tracker stopped");
                    return;
                }

                _ = ticker.tick() => {
                    state.set_session(self.session_rx.borrow().clone());

                    let idle = match self.probe.idle_duration().await {
                        Ok(idle) => idle,
                        Err(err) => {
                            debug!(%err, "idle probe failed; skipping tick");
                            continue;
                        }
                    };
                    let window = match self.probe.active_window().await {
                        Ok(window) => window,
                        Err(err) => {
                            debug!(%err, "window probe failed; skipping tick");
                            continue;
                        }
                    };

                    let sample = PollSample { now: Utc::now(), idle, window };
                    for effect in state.observe(&sample) {
                        self.apply(effect).await;
                    }
                }
            }
        }
    }

    async fn apply(&self, effect: TrackerEffect) {
        match effect {
            TrackerEffect::Emit(event) => self.forward(event).await,
            TrackerEffect::IdleChanged(idle) => {
                let _ = self
                    .events
                    .send(BridgeEvent::IdleStateChanged { idle })
                    .await;
            }
        }
    }

    /// Forward one flushed event to the backend. Best effort: a failed
    /// submit is logged and the event is dropped (at-most-once).
    async fn forward(&self, event: ActivityEvent) {
        let _ = self
            .events
            .send(BridgeEvent::WindowFlushed {
                app_name: event.app_name.clone().unwrap_or_default(),
                active_secs: event.active_time,
                idle_secs: event.idle_time,
            })
            .await;

        if let Err(err) = self.backend.submit_batch(&[event], None).await {
            warn!(%err, "flushed activity event dropped");
        }
    }
}
