//! Convergence poller: waits after create until the observed status phase
//! reaches the target, a deadline passes, or the refresh itself fails.
//!
//! Failures are enriched with the most recent warning events recorded against
//! the object so the caller sees the root cause and the operational context in
//! one message.

use std::time::Duration;

use archon_core::model::{Event, ObjectMeta, Readiness, Resource};
use archon_core::{EventSource, ProviderError, ProviderResult, ResourceClient};
use metrics::{counter, histogram};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub timeout: Duration,
    pub interval: Duration,
    /// Warning events folded into a convergence failure.
    pub warning_events: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(300), interval: Duration::from_millis(5000), warning_events: 3 }
    }
}

impl PollerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let timeout = std::env::var("ARCHON_CREATE_TIMEOUT_SECS").ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs).unwrap_or(d.timeout);
        let interval = std::env::var("ARCHON_POLL_INTERVAL_MS").ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(d.interval);
        let warning_events = std::env::var("ARCHON_WARNING_EVENTS").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(d.warning_events);
        Self { timeout, interval: interval.max(MIN_INTERVAL), warning_events }
    }
}

/// Poll progress. `Pending` carries the last observed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollState {
    Pending(String),
    Ready,
    TimedOut(String),
    Failed(String),
}

/// Deadlines past this are clamped; `Instant` arithmetic overflows otherwise.
const MAX_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 3600);
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Go-style duration text (`1h0m0s`, `5m0s`, `1.5s`, `250ms`), as operators
/// see it in provider messages.
pub fn fmt_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        return format!("{ms}ms");
    }
    let (hours, rem) = (ms / 3_600_000, ms % 3_600_000);
    let (mins, rem_ms) = (rem / 60_000, rem % 60_000);
    let secs = if rem_ms % 1000 == 0 { format!("{}s", rem_ms / 1000) } else { format!("{}s", rem_ms as f64 / 1000.0) };
    match (hours, mins) {
        (0, 0) => secs,
        (0, m) => format!("{m}m{secs}"),
        (h, m) => format!("{h}h{m}m{secs}"),
    }
}

pub fn format_events(events: &[Event]) -> String {
    if events.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nRecent warning events:");
    for e in events {
        out.push_str(&format!("\n- {}: {}", e.reason, e.message));
        if e.count > 1 { out.push_str(&format!(" (x{})", e.count)); }
    }
    out
}

pub struct Poller {
    cfg: PollerConfig,
}

impl Poller {
    pub fn new(cfg: PollerConfig) -> Self { Self { cfg } }

    /// Block until `meta` reaches one of `readiness.target`. Returns the last
    /// observed object on success.
    pub async fn wait<R: Resource>(
        &self,
        client: &dyn ResourceClient<R>,
        events: &dyn EventSource,
        meta: &ObjectMeta,
        readiness: Readiness,
    ) -> ProviderResult<R> {
        let t0 = Instant::now();
        let deadline = t0.checked_add(self.cfg.timeout.min(MAX_WAIT)).unwrap_or(t0);
        let target = readiness.target.join(", ");
        let mut ticker = time::interval(self.cfg.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state = PollState::Pending(String::from("Pending"));
        let mut last: Option<R> = None;

        while let PollState::Pending(ref phase) = state {
            let phase = phase.clone();
            if time::timeout_at(deadline, ticker.tick()).await.is_err() {
                state = PollState::TimedOut(phase);
                continue;
            }
            state = match time::timeout_at(deadline, client.get(&meta.namespace, &meta.name)).await {
                Err(_) => PollState::TimedOut(phase),
                Ok(Err(e)) => PollState::Failed(format!("error while waiting for state to become '{target}': {e}")),
                Ok(Ok(obj)) => {
                    let observed = obj.phase().unwrap_or_default().to_string();
                    debug!(kind = R::KIND, name = %meta.name, phase = %observed, "poller: status received");
                    let next = if readiness.target.contains(&observed.as_str()) {
                        PollState::Ready
                    } else if readiness.pending.contains(&observed.as_str()) {
                        PollState::Pending(observed.clone())
                    } else {
                        PollState::Failed(format!("unexpected state '{observed}', wanted target '{target}'"))
                    };
                    last = Some(obj);
                    next
                }
            };
        }

        histogram!("archon_convergence_wait_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match (state, last) {
            (PollState::Ready, Some(obj)) => {
                info!(kind = R::KIND, name = %meta.name, took_ms = %t0.elapsed().as_millis(), "poller: ready");
                Ok(obj)
            }
            (PollState::TimedOut(phase), _) => {
                let message = format!(
                    "timeout while waiting for state to become '{target}' (last state: '{phase}', timeout: {})",
                    fmt_duration(self.cfg.timeout)
                );
                Err(self.fail(events, meta, R::KIND, message, true).await)
            }
            (PollState::Failed(message), _) => Err(self.fail(events, meta, R::KIND, message, false).await),
            // Ready is only reached after an object was observed.
            (PollState::Ready, None) | (PollState::Pending(_), _) => {
                Err(self.fail(events, meta, R::KIND, format!("poller stopped before reaching '{target}'"), false).await)
            }
        }
    }

    async fn fail(&self, events: &dyn EventSource, meta: &ObjectMeta, kind: &str, message: String, timed_out: bool) -> ProviderError {
        counter!("archon_convergence_failed_total", 1u64);
        let events = match events.list_recent_warnings(meta, kind, self.cfg.warning_events).await {
            Ok(list) => format_events(&list),
            Err(e) => {
                warn!(kind, name = %meta.name, error = %e, "poller: fetching warning events failed");
                format!("\n\n(could not fetch warning events: {e})")
            }
        };
        warn!(kind, name = %meta.name, error = %message, "poller: convergence failed");
        if timed_out {
            ProviderError::ConvergenceTimeout { message, events }
        } else {
            ProviderError::ConvergenceObserved { message, events }
        }
    }
}
