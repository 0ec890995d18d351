use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::EventError;
use crate::event::{EventHandle, TimeEvent};
use crate::sim::Simulation;
use crate::time::{to_millis, MILLISECOND};

const ANCHOR_RESET_MS: u64 = 1_000;

/// Throttles simulated time to a real-time ratio.
///
/// The governor is a self-rescheduling event, not a wall-clock timer: it
/// lives in the simulated-time fabric and the kernel thread blocks only
/// inside its sleep. Ratio `1.0` is real time, `< 1.0` slower, `> 1.0`
/// faster. In unlimited mode no governor event is scheduled at all.
pub(crate) struct SpeedGovernor {
    limit: Option<f64>,
    epoch: Instant,
    anchor_sim_ms: u64,
    anchor_real_ms: u64,
    last_reset_ms: u64,
    pub(crate) handle: Option<EventHandle>,
}

/// What the loop should do after a governor firing.
pub(crate) enum GovernorStep {
    /// Unlimited mode; a stale firing, nothing to do.
    Idle,
    /// Ahead of real time: block for `millis`, then fire again at `next`.
    Sleep { millis: u64, next: u64 },
    /// Behind real time: skip ahead proportionally, fire again at `next`.
    SkipTo { next: u64 },
}

impl SpeedGovernor {
    pub(crate) fn new() -> SpeedGovernor {
        SpeedGovernor {
            limit: None,
            epoch: Instant::now(),
            anchor_sim_ms: 0,
            anchor_real_ms: 0,
            last_reset_ms: 0,
            handle: None,
        }
    }

    pub(crate) fn limit(&self) -> Option<f64> {
        self.limit
    }

    /// Switches to limited mode at `ratio`, resetting the anchors to the
    /// current simulated and real time.
    pub(crate) fn enable(&mut self, ratio: f64, clock_us: u64) {
        let now = self.now_ms();
        self.enable_at(ratio, clock_us, now);
    }

    fn enable_at(&mut self, ratio: f64, clock_us: u64, now_ms: u64) {
        debug!("speed limit set to {ratio}");
        self.limit = Some(ratio);
        self.anchor_sim_ms = to_millis(clock_us);
        self.anchor_real_ms = now_ms;
        self.last_reset_ms = now_ms;
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    /// Switches to unlimited mode and cancels the self-scheduled event.
    pub(crate) fn disable(&mut self) {
        debug!("speed limit cleared");
        self.limit = None;
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    pub(crate) fn fire(&mut self, time_us: u64) -> GovernorStep {
        let now = self.now_ms();
        self.plan(time_us, now)
    }

    fn plan(&mut self, time_us: u64, now_ms: u64) -> GovernorStep {
        let Some(ratio) = self.limit else {
            return GovernorStep::Idle;
        };

        if now_ms.saturating_sub(self.last_reset_ms) >= ANCHOR_RESET_MS {
            self.anchor_sim_ms = to_millis(time_us);
            self.anchor_real_ms = now_ms;
            self.last_reset_ms = now_ms;
        }

        let d_sim = to_millis(time_us).saturating_sub(self.anchor_sim_ms);
        let d_real = now_ms.saturating_sub(self.anchor_real_ms) as i64;
        let expected_real = (d_sim as f64 / ratio) as i64;
        let sleep = expected_real - d_real;

        if sleep >= 0 {
            GovernorStep::Sleep {
                millis: sleep as u64,
                next: time_us + MILLISECOND,
            }
        } else {
            GovernorStep::SkipTo {
                next: time_us + (-sleep) as u64 * MILLISECOND,
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// The governor's self-rescheduling queue entry.
pub(crate) struct GovernorEvent;

impl TimeEvent for GovernorEvent {
    fn execute(self: Box<Self>, sim: &mut Simulation, time: u64) -> Result<(), EventError> {
        match sim.governor.fire(time) {
            GovernorStep::Idle => {}
            GovernorStep::Sleep { millis, next } => {
                if millis > 0 {
                    trace!("governor sleeping {millis} ms at {time} us");
                    thread::sleep(Duration::from_millis(millis));
                }
                let handle = sim.schedule_event(self, next);
                sim.governor.handle = Some(handle);
            }
            GovernorStep::SkipTo { next } => {
                trace!("governor skipping ahead to {next} us");
                let handle = sim.schedule_event(self, next);
                sim.governor.handle = Some(handle);
            }
        }
        Ok(())
    }

    fn label(&self) -> &str {
        "speed governor"
    }
}
