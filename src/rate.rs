//! Frame arrival rate over fixed wall-clock windows

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct Window {
    count: u64,
    started: Instant,
    latest: f64,
}

/// Counts frame arrivals and converts them to a rate once per window.
///
/// The rate divides by the wall-clock time actually elapsed, so a late
/// window tick yields a slightly lower figure rather than an inflated one.
pub struct RateCounter {
    window: Duration,
    state: Mutex<Window>,
}

impl RateCounter {
    pub fn new(window: Duration) -> Self {
        Self { window, state: Mutex::new(Window { count: 0, started: Instant::now(), latest: 0.0 }) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one frame in the current window
    pub fn record_arrival(&self) {
        self.lock().count += 1;
    }

    /// Arrivals in the current, still-open window
    pub fn pending_arrivals(&self) -> u64 {
        self.lock().count
    }

    /// Rate of the last completed window; 0 until one completes
    pub fn current_rate(&self) -> f64 {
        self.lock().latest
    }

    /// Close the current window at `now`, store its rate and start a new one.
    pub fn close_window(&self, now: Instant) -> f64 {
        let mut state = self.lock();
        let elapsed_ms = now.saturating_duration_since(state.started).as_secs_f64() * 1000.0;

        state.latest = if elapsed_ms > 0.0 { state.count as f64 * 1000.0 / elapsed_ms } else { 0.0 };
        state.count = 0;
        state.started = now;

        trace!("Frame rate window closed: {:.1} fps", state.latest);
        state.latest
    }

    /// Close a window every `window` until `cancel` fires.
    pub fn spawn_ticker(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        self.lock().started = Instant::now();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.window, self.window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    tick = ticker.tick() => {
                        self.close_window(tick.max(Instant::now()));
                    }
                }
            }

            debug!("Frame rate ticker stopped");
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RateCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RateCounter")
            .field("window", &self.window)
            .field("pending", &state.count)
            .field("latest", &state.latest)
            .finish()
    }
}
