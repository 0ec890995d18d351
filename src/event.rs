use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::Arc;

use crate::error::EventError;
use crate::mote::MoteId;
use crate::sim::Simulation;

/// A unit of simulated work: fires once at its scheduled time.
///
/// `execute` consumes the event, which is what lets an event put itself
/// back into the queue; the speed governor reschedules itself this way on
/// every firing.
///
/// Events run on the simulation thread with exclusive access to the
/// [`Simulation`]. They must not block on I/O; collaborators that need I/O
/// hand the work to other threads and come back through
/// [`Kernel::invoke_in_sim_thread`].
///
/// [`Kernel::invoke_in_sim_thread`]: crate::Kernel::invoke_in_sim_thread
pub trait TimeEvent: Send {
    /// Runs the event. `time` equals the kernel clock at dispatch.
    fn execute(self: Box<Self>, sim: &mut Simulation, time: u64) -> Result<(), EventError>;

    /// Debug label shown in logs and error reports.
    fn label(&self) -> &str {
        "event"
    }

    /// Mote context, if the event belongs to one. Used to annotate loop
    /// failures and to cancel a removed mote's remaining events.
    fn mote(&self) -> Option<MoteId> {
        None
    }
}

/// Shared state between a queue entry and the handles pointing at it.
///
/// The `queue` tag identifies the owning queue; handles never touch the
/// queue's internal chain, they only flip the tombstone flag.
#[derive(Debug)]
pub(crate) struct EventSlot {
    pub(crate) removed: AtomicBool,
    pub(crate) fired: AtomicBool,
    pub(crate) queue: u64,
    pub(crate) time: u64,
}

impl EventSlot {
    pub(crate) fn new(queue: u64, time: u64) -> Arc<EventSlot> {
        Arc::new(EventSlot {
            removed: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            queue,
            time,
        })
    }
}

/// Handle to a scheduled event.
///
/// Cloning is cheap; the handle does not keep the event alive and may
/// outlive its dispatch. `cancel` is safe from any thread: it marks the
/// entry as logically removed and the pop path consumes it without
/// invoking the callback.
#[derive(Debug, Clone)]
pub struct EventHandle {
    slot: Arc<EventSlot>,
}

impl EventHandle {
    pub(crate) fn new(slot: Arc<EventSlot>) -> EventHandle {
        EventHandle { slot }
    }

    /// Tombstones the event. Safe from any thread; a no-op after dispatch.
    pub fn cancel(&self) {
        self.slot.removed.store(true, Release);
    }

    /// True once `cancel` was called.
    pub fn is_cancelled(&self) -> bool {
        self.slot.removed.load(Acquire)
    }

    /// True while the event is still waiting for dispatch.
    pub fn is_scheduled(&self) -> bool {
        !self.slot.fired.load(Acquire) && !self.slot.removed.load(Acquire)
    }

    /// Simulated time the event was scheduled for.
    pub fn time(&self) -> u64 {
        self.slot.time
    }
}

/// Adapter turning a closure into a [`TimeEvent`].
pub(crate) struct FnEvent<F> {
    pub(crate) label: &'static str,
    pub(crate) f: F,
}

impl<F> TimeEvent for FnEvent<F>
where
    F: FnOnce(&mut Simulation, u64) + Send,
{
    fn execute(self: Box<Self>, sim: &mut Simulation, time: u64) -> Result<(), EventError> {
        (self.f)(sim, time);
        Ok(())
    }

    fn label(&self) -> &str {
        self.label
    }
}
