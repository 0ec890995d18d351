use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::SimError;
use crate::event::{EventHandle, EventSlot, TimeEvent};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Ordered store of future events.
///
/// The sorted side is a binary heap ordered by `(time, seq)`, where `seq`
/// is assigned at link time: two events at the same simulated time
/// dispatch in the order they were linked, which is what makes replays
/// deterministic. Logical deletion is a tombstone flag on the entry's
/// slot, consumed by the pop path.
///
/// The heap is only touched on the simulation thread. Other threads
/// schedule through [`ExternalQueue`], which appends to a monitored
/// pending list; the simulation thread merges it, in submission order,
/// before every pop.
pub struct EventQueue {
    id: u64,
    heap: BinaryHeap<Entry>,
    seq: u64,
    shared: Arc<Pending>,
}

/// Cross-thread scheduling side of an [`EventQueue`].
///
/// Cloning is cheap. External schedulers never touch the sorted chain;
/// they only append under the pending monitor.
#[derive(Clone)]
pub struct ExternalQueue {
    shared: Arc<Pending>,
}

struct Pending {
    queue: u64,
    list: Mutex<Vec<PendingEntry>>,
    flag: AtomicBool,
}

struct PendingEntry {
    time: u64,
    slot: Arc<EventSlot>,
    event: Box<dyn TimeEvent>,
}

struct Entry {
    time: u64,
    seq: u64,
    slot: Arc<EventSlot>,
    event: Box<dyn TimeEvent>,
}

impl Eq for Entry {}

impl PartialEq for Entry {
    fn eq(&self, other: &Entry) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Entry) -> Ordering {
        match (self.time, self.seq).cmp(&(other.time, other.seq)) {
            Ordering::Less => Ordering::Greater,
            Ordering::Greater => Ordering::Less,
            Ordering::Equal => Ordering::Equal,
        }
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Entry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl EventQueue {
    pub fn new() -> EventQueue {
        let id = NEXT_QUEUE_ID.fetch_add(1, Relaxed);

        EventQueue {
            id,
            heap: BinaryHeap::new(),
            seq: 0,
            shared: Arc::new(Pending {
                queue: id,
                list: Mutex::new(Vec::new()),
                flag: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the cross-thread scheduling side.
    pub fn external(&self) -> ExternalQueue {
        ExternalQueue {
            shared: self.shared.clone(),
        }
    }

    /// Links an event at `time`. Simulation thread only.
    pub fn schedule(&mut self, event: Box<dyn TimeEvent>, time: u64) -> EventHandle {
        let slot = EventSlot::new(self.id, time);
        trace!("scheduling `{}` at {} us", event.label(), time);
        self.link(slot.clone(), event, time);
        EventHandle::new(slot)
    }

    fn link(&mut self, slot: Arc<EventSlot>, event: Box<dyn TimeEvent>, time: u64) {
        self.seq += 1;
        self.heap.push(Entry {
            time,
            seq: self.seq,
            slot,
            event,
        });
    }

    fn merge_pending(&mut self) {
        if !self.shared.flag.load(Acquire) {
            return;
        }

        let pending: Vec<_> = self.shared.list.lock().unwrap().drain(..).collect();
        for pe in pending {
            trace!("merging external `{}` at {} us", pe.event.label(), pe.time);
            self.link(pe.slot, pe.event, pe.time);
        }
        self.shared.flag.store(false, Release);
    }

    /// Unlinks and returns the earliest live event. Simulation thread only.
    ///
    /// Tombstoned entries are consumed without being returned. Fails with
    /// [`SimError::StarvedLoop`] when no live event remains.
    pub fn pop_first(&mut self) -> Result<(u64, Box<dyn TimeEvent>), SimError> {
        self.merge_pending();

        loop {
            let entry = self.heap.pop().ok_or(SimError::StarvedLoop)?;
            debug_assert_eq!(entry.slot.queue, self.id);

            entry.slot.fired.store(true, Release);
            if entry.slot.removed.load(Acquire) {
                trace!("skipping removed `{}` at {} us", entry.event.label(), entry.time);
                continue;
            }

            return Ok((entry.time, entry.event));
        }
    }

    /// Time of the earliest live event, without unlinking it. Simulation
    /// thread only. Tombstones ahead of it are consumed.
    pub fn peek_first_time(&mut self) -> Option<u64> {
        self.merge_pending();

        while let Some(entry) = self.heap.peek() {
            if entry.slot.removed.load(Acquire) {
                let entry = self.heap.pop().unwrap();
                entry.slot.fired.store(true, Release);
                continue;
            }
            return Some(entry.time);
        }
        None
    }

    /// Tombstones every live event matching `pred`. Simulation thread
    /// only. Entries stay linked until popped.
    pub fn cancel_where<P>(&mut self, pred: P)
    where
        P: Fn(&dyn TimeEvent) -> bool,
    {
        self.merge_pending();

        for entry in self.heap.iter() {
            if !entry.slot.removed.load(Acquire) && pred(&*entry.event) {
                trace!("removing `{}` at {} us", entry.event.label(), entry.time);
                entry.slot.removed.store(true, Release);
            }
        }
    }

    /// Drains the queue, pending side included. Simulation thread only.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.shared.list.lock().unwrap().clear();
        self.shared.flag.store(false, Release);
    }

    /// Number of linked live events.
    pub fn len(&self) -> usize {
        self.heap
            .iter()
            .filter(|e| !e.slot.removed.load(Acquire))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> EventQueue {
        EventQueue::new()
    }
}

impl ExternalQueue {
    /// Schedules an event at `time` from any thread.
    ///
    /// The event becomes visible to the simulation thread at its next
    /// merge, before the next pop. Events submitted during the same poll
    /// window keep their submission order.
    pub fn schedule(&self, event: Box<dyn TimeEvent>, time: u64) -> EventHandle {
        let slot = EventSlot::new(self.shared.queue, time);

        let mut list = self.shared.list.lock().unwrap();
        list.push(PendingEntry {
            time,
            slot: slot.clone(),
            event,
        });
        self.shared.flag.store(true, Release);
        drop(list);

        EventHandle::new(slot)
    }
}
