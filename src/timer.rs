use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::error::{GameError, Result};

/// Sampling interval of the round timer. Bounds timeout-detection latency.
pub const TICK_RATE_MS: u64 = 100;

/// Monotonic time source. Only differences between readings are meaningful.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock time via `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Virtual clock advanced by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

pub type TimeUpHandler = Box<dyn FnMut() + Send>;

/// Result of sampling the timer once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Idle,
    Running,
    /// The deadline elapsed during this tick. Reported once per armed period.
    Expired,
}

/// Per-trial (or per-session) countdown driven by periodic `tick` calls.
///
/// `start` arms the timer and `tick` samples the clock. Once the elapsed time
/// reaches the limit the timer disarms itself and reports `Expired` exactly
/// once; a new `start` is needed to rearm it. A limit of 0 disables timing.
pub struct RoundTimer {
    clock: Arc<dyn Clock>,
    time_limit_ms: u64,
    started_at: Option<Duration>,
    elapsed_ms: u64,
    running: bool,
    fired: bool,
    on_time_up: Option<TimeUpHandler>,
}

impl fmt::Debug for RoundTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundTimer")
            .field("time_limit_ms", &self.time_limit_ms)
            .field("elapsed_ms", &self.elapsed_ms)
            .field("running", &self.running)
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}

impl RoundTimer {
    pub fn new(clock: Arc<dyn Clock>, time_limit_ms: u64) -> Self {
        Self {
            clock,
            time_limit_ms,
            started_at: None,
            elapsed_ms: 0,
            running: false,
            fired: false,
            on_time_up: None,
        }
    }

    /// Replaces the handler; the newest one is used on the next expiry
    /// even if the timer was started before it was set.
    pub fn set_on_time_up(&mut self, handler: TimeUpHandler) {
        self.on_time_up = Some(handler);
    }

    pub fn set_time_limit(&mut self, time_limit_ms: u64) {
        self.time_limit_ms = time_limit_ms;
    }

    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit_ms
    }

    pub fn start(&mut self) {
        self.started_at = Some(self.clock.now());
        self.elapsed_ms = 0;
        self.running = true;
        self.fired = false;
    }

    /// Cancels sampling. A no-op when already stopped.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&mut self) -> Result<TimerStatus> {
        if !self.running {
            return Ok(TimerStatus::Idle);
        }
        let Some(started_at) = self.started_at else {
            return Ok(TimerStatus::Idle);
        };
        self.elapsed_ms = self.clock.now().saturating_sub(started_at).as_millis() as u64;

        if self.time_limit_ms > 0 && self.elapsed_ms >= self.time_limit_ms {
            self.running = false;
            self.fire()?;
            return Ok(TimerStatus::Expired);
        }
        Ok(TimerStatus::Running)
    }

    fn fire(&mut self) -> Result<()> {
        if self.fired {
            error!(elapsed_ms = self.elapsed_ms, "time-up fired twice for one armed period");
            return Err(GameError::TimerInvariantViolation(format!(
                "time-up already fired at {}ms of {}ms",
                self.elapsed_ms, self.time_limit_ms
            )));
        }
        self.fired = true;
        debug!(
            elapsed_ms = self.elapsed_ms,
            limit_ms = self.time_limit_ms,
            "round timer expired"
        );
        if let Some(handler) = self.on_time_up.as_mut() {
            handler();
        }
        Ok(())
    }

    /// Elapsed time as of the last sample.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn remaining_ms(&self) -> u64 {
        self.time_limit_ms.saturating_sub(self.elapsed_ms)
    }

    /// Remaining time as a percentage in `[0, 100]`; 100 when timing is disabled.
    pub fn progress(&self) -> f64 {
        if self.time_limit_ms == 0 {
            return 100.0;
        }
        let pct = self.remaining_ms() as f64 / self.time_limit_ms as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn timer_with(limit: u64) -> (ManualClock, RoundTimer) {
        let clock = ManualClock::new();
        let timer = RoundTimer::new(Arc::new(clock.clone()), limit);
        (clock, timer)
    }

    fn counting_handler(counter: &Arc<AtomicUsize>) -> TimeUpHandler {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn fires_exactly_once_after_deadline() {
        let (clock, mut timer) = timer_with(2000);
        let fired = Arc::new(AtomicUsize::new(0));
        timer.set_on_time_up(counting_handler(&fired));

        timer.start();
        for _ in 0..19 {
            clock.advance(TICK_RATE_MS);
            assert_eq!(timer.tick().unwrap(), TimerStatus::Running);
        }
        clock.advance(TICK_RATE_MS);
        assert_eq!(timer.tick().unwrap(), TimerStatus::Expired);

        for _ in 0..10 {
            clock.advance(TICK_RATE_MS);
            assert_eq!(timer.tick().unwrap(), TimerStatus::Idle);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_running());
    }

    #[test]
    fn stop_before_deadline_prevents_firing() {
        let (clock, mut timer) = timer_with(500);
        let fired = Arc::new(AtomicUsize::new(0));
        timer.set_on_time_up(counting_handler(&fired));

        timer.start();
        clock.advance(300);
        timer.tick().unwrap();
        timer.stop();
        timer.stop();
        clock.advance(1000);
        assert_eq!(timer.tick().unwrap(), TimerStatus::Idle);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restart_rearms_after_expiry() {
        let (clock, mut timer) = timer_with(100);
        let fired = Arc::new(AtomicUsize::new(0));
        timer.set_on_time_up(counting_handler(&fired));

        timer.start();
        clock.advance(100);
        assert_eq!(timer.tick().unwrap(), TimerStatus::Expired);

        timer.start();
        assert_eq!(timer.elapsed_ms(), 0);
        clock.advance(150);
        assert_eq!(timer.tick().unwrap(), TimerStatus::Expired);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn uses_latest_handler() {
        let (clock, mut timer) = timer_with(100);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        timer.set_on_time_up(counting_handler(&first));
        timer.start();
        timer.set_on_time_up(counting_handler(&second));
        clock.advance(100);
        timer.tick().unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_limit_disables_countdown() {
        let (clock, mut timer) = timer_with(0);
        timer.start();
        clock.advance(60_000);
        assert_eq!(timer.tick().unwrap(), TimerStatus::Running);
        assert_eq!(timer.progress(), 100.0);
        assert_eq!(timer.remaining_ms(), 0);
    }

    #[test]
    fn remaining_and_progress() {
        let (clock, mut timer) = timer_with(2000);
        timer.start();
        assert_eq!(timer.progress(), 100.0);
        clock.advance(500);
        timer.tick().unwrap();
        assert_eq!(timer.remaining_ms(), 1500);
        assert_eq!(timer.progress(), 75.0);
        clock.advance(5000);
        timer.tick().unwrap();
        assert_eq!(timer.remaining_ms(), 0);
        assert_eq!(timer.progress(), 0.0);
    }

    #[test]
    fn second_fire_in_one_period_is_an_invariant_violation() {
        let (_clock, mut timer) = timer_with(100);
        timer.start();
        timer.fire().unwrap();
        assert!(matches!(
            timer.fire(),
            Err(GameError::TimerInvariantViolation(_))
        ));
    }

    proptest! {
        #[test]
        fn progress_is_bounded_and_non_increasing(
            limit in 1u64..10_000,
            steps in proptest::collection::vec(0u64..700, 1..40),
        ) {
            let (clock, mut timer) = timer_with(limit);
            timer.start();
            let mut last = timer.progress();
            for step in steps {
                clock.advance(step);
                timer.tick().unwrap();
                let progress = timer.progress();
                prop_assert!((0.0..=100.0).contains(&progress));
                prop_assert!(progress <= last);
                last = progress;
            }
        }
    }
}
