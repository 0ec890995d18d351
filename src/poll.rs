use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::Arc;

use concurrent_queue::ConcurrentQueue;
use log::trace;

use crate::sim::Simulation;

/// An action to run on the simulation thread between events.
pub type Action = Box<dyn FnOnce(&mut Simulation) + Send>;

/// FIFO of actions to run on the simulation thread between events.
///
/// `submit` is safe from any thread. The simulation thread drains the
/// channel before every event dispatch; an action submitted during a
/// drain runs within that same drain. Failures inside an action are the
/// loop's business, never the submitter's.
pub struct PollChannel {
    inner: Arc<PollInner>,
}

struct PollInner {
    queue: ConcurrentQueue<Action>,
    pending: AtomicUsize,
}

impl PollChannel {
    pub fn new() -> PollChannel {
        PollChannel {
            inner: Arc::new(PollInner {
                queue: ConcurrentQueue::unbounded(),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    /// Appends an action. Safe from any thread.
    pub fn submit<F>(&self, action: F)
    where
        F: FnOnce(&mut Simulation) + Send + 'static,
    {
        // The queue is unbounded and never closed, so push cannot fail.
        let pushed = self.inner.queue.push(Box::new(action));
        debug_assert!(pushed.is_ok());
        self.inner.pending.fetch_add(1, Release);
    }

    /// Fast check for queued actions.
    pub fn has_pending(&self) -> bool {
        self.inner.pending.load(Acquire) > 0
    }

    /// Runs queued actions in submission order until none remain.
    /// Simulation thread only.
    pub(crate) fn drain(&self, sim: &mut Simulation) {
        while let Ok(action) = self.inner.queue.pop() {
            self.inner.pending.fetch_sub(1, Relaxed);
            trace!("running poll action at {} us", sim.time());
            action(sim);
        }
    }
}

impl Clone for PollChannel {
    fn clone(&self) -> PollChannel {
        PollChannel {
            inner: self.inner.clone(),
        }
    }
}

impl Default for PollChannel {
    fn default() -> PollChannel {
        PollChannel::new()
    }
}
