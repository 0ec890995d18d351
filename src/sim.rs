use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};
use rand::Rng;

use crate::central::EventCentral;
use crate::event::{EventHandle, FnEvent, TimeEvent};
use crate::governor::{GovernorEvent, SpeedGovernor};
use crate::kernel::{KernelEvent, Shared};
use crate::mote::{Mote, MoteId, MoteType, RadioMedium};
use crate::observers::Observers;
use crate::queue::EventQueue;
use crate::rng::SimRng;
use crate::time::{to_millis, SECOND};

/// Simulation state: the clock, the event queue, the registries and the
/// random generator.
///
/// All of it is kernel-thread-exclusive: while the simulation runs, only
/// event callbacks and poll actions see `&mut Simulation`; while it is
/// stopped, [`Kernel::with_simulation`] gives the mutator thread the same
/// access inline. There is no third way in, which is what keeps runs
/// deterministic.
///
/// [`Kernel::with_simulation`]: crate::Kernel::with_simulation
pub struct Simulation {
    title: String,
    pub(crate) clock: u64,
    pub(crate) queue: EventQueue,
    pub(crate) governor: SpeedGovernor,
    rng: SimRng,
    motes: IndexMap<MoteId, Box<dyn Mote>>,
    mote_types: IndexMap<String, Box<dyn MoteType>>,
    radio_medium: Option<Box<dyn RadioMedium>>,
    max_startup_delay: u64,
    central: EventCentral,
    pub(crate) observers: Observers<KernelEvent>,
    pub(crate) shared: Arc<Shared>,
}

impl Simulation {
    pub(crate) fn new(
        shared: Arc<Shared>,
        observers: Observers<KernelEvent>,
        seed: Option<u64>,
    ) -> Simulation {
        Simulation {
            title: "Untitled simulation".to_string(),
            clock: 0,
            queue: EventQueue::new(),
            governor: SpeedGovernor::new(),
            rng: seed.map(SimRng::new).unwrap_or_else(SimRng::generated),
            motes: IndexMap::new(),
            mote_types: IndexMap::new(),
            radio_medium: None,
            max_startup_delay: SECOND,
            central: EventCentral::new(),
            observers,
            shared,
        }
    }

    /// Current simulated time in microseconds.
    pub fn time(&self) -> u64 {
        self.clock
    }

    /// Current simulated time in whole milliseconds.
    pub fn time_millis(&self) -> u64 {
        to_millis(self.clock)
    }

    /// Schedules `event` at `time`. Must not be in the past.
    pub fn schedule_event(&mut self, event: Box<dyn TimeEvent>, time: u64) -> EventHandle {
        assert!(
            time >= self.clock,
            "event `{}` scheduled at {} us, behind the clock at {} us",
            event.label(),
            time,
            self.clock
        );
        self.queue.schedule(event, time)
    }

    /// Schedules a one-shot closure at `time`.
    pub fn schedule_fn<F>(&mut self, time: u64, f: F) -> EventHandle
    where
        F: FnOnce(&mut Simulation, u64) + Send + 'static,
    {
        self.schedule_event(Box::new(FnEvent { label: "closure", f }), time)
    }

    /// Number of live events waiting in the queue.
    pub fn event_count(&self) -> usize {
        self.queue.len()
    }

    /// Asks the loop to exit after the current event.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title<T: Into<String>>(&mut self, title: T) {
        self.title = title.into();
        self.observers.notify(&KernelEvent::TitleChanged);
    }

    /// The deterministic random generator.
    ///
    /// Draws that affect simulated state must happen on the simulation
    /// thread, or inline while stopped; ownership already enforces this,
    /// and a debug assertion double-checks it.
    pub fn rng(&mut self) -> &mut SimRng {
        debug_assert!(
            self.shared.is_simulation_thread() || !self.shared.is_running(),
            "random draw from a foreign thread while the simulation is running"
        );
        &mut self.rng
    }

    pub fn random_seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn seed_is_generated(&self) -> bool {
        self.rng.is_generated()
    }

    /// Reseeds the generator, resetting its stream.
    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng.reseed(seed);
        debug!("random seed set to {seed}");
        self.observers.notify(&KernelEvent::SeedChanged);
    }

    /// Reseeds from entropy; the configuration will record the seed as
    /// generated, so every load produces a fresh one.
    pub fn set_generated_seed(&mut self) {
        self.rng = SimRng::generated();
        debug!("random seed generated: {}", self.rng.seed());
        self.observers.notify(&KernelEvent::SeedChanged);
    }

    /// Real-time speed limit, or `None` for unlimited.
    pub fn speed_limit(&self) -> Option<f64> {
        self.governor.limit()
    }

    /// Sets the real-time speed limit. `Some(1.0)` is real time.
    pub fn set_speed_limit(&mut self, limit: Option<f64>) {
        match limit {
            Some(ratio) => {
                self.governor.enable(ratio, self.clock);
                let handle = self.schedule_event(Box::new(GovernorEvent), self.clock);
                self.governor.handle = Some(handle);
            }
            None => self.governor.disable(),
        }
        self.observers.notify(&KernelEvent::SpeedLimitChanged);
    }

    /// Upper bound, in microseconds, of the random per-mote startup delay.
    pub fn max_startup_delay(&self) -> u64 {
        self.max_startup_delay
    }

    pub fn set_max_startup_delay(&mut self, delay_us: u64) {
        self.max_startup_delay = delay_us;
    }

    pub fn event_central(&self) -> &EventCentral {
        &self.central
    }

    pub fn event_central_mut(&mut self) -> &mut EventCentral {
        &mut self.central
    }

    /// Registers a mote. A duplicate id is dropped with a warning.
    ///
    /// When a startup-delay bound is set, the mote is handed a drift drawn
    /// uniformly in `[0, max_startup_delay)`, which staggers boot across
    /// the network.
    pub fn add_mote(&mut self, mut mote: Box<dyn Mote>) -> bool {
        let id = mote.id();
        if self.motes.contains_key(&id) {
            warn!("{id} already exists, mote skipped");
            return false;
        }

        if self.max_startup_delay > 0 {
            let bound = self.max_startup_delay;
            let delay = self.rng().gen_range(0..bound);
            mote.set_startup_delay(delay);
        }

        if let Some(radio) = self.radio_medium.as_mut() {
            radio.mote_added(id);
        }

        self.motes.insert(id, mote);
        debug!("added {id}");
        self.observers.notify(&KernelEvent::MoteAdded(id));
        true
    }

    /// Unregisters a mote.
    ///
    /// Every queued event carrying this mote's context is tombstoned
    /// first, so the mote receives no further dispatches.
    pub fn remove_mote(&mut self, id: MoteId) -> bool {
        let Some(mut mote) = self.motes.shift_remove(&id) else {
            warn!("{id} does not exist, nothing removed");
            return false;
        };

        self.queue.cancel_where(|ev| ev.mote() == Some(id));
        if let Some(radio) = self.radio_medium.as_mut() {
            radio.mote_removed(id);
        }
        mote.removed();

        debug!("removed {id}");
        self.observers.notify(&KernelEvent::MoteRemoved(id));
        true
    }

    pub fn mote(&self, id: MoteId) -> Option<&dyn Mote> {
        self.motes.get(&id).map(|m| &**m)
    }

    pub fn mote_mut(&mut self, id: MoteId) -> Option<&mut (dyn Mote + '_)> {
        match self.motes.get_mut(&id) {
            Some(m) => Some(&mut **m),
            None => None,
        }
    }

    /// Motes in registration order.
    pub fn motes(&self) -> impl Iterator<Item = &dyn Mote> {
        self.motes.values().map(|m| &**m)
    }

    pub fn mote_ids(&self) -> Vec<MoteId> {
        self.motes.keys().copied().collect()
    }

    pub fn mote_count(&self) -> usize {
        self.motes.len()
    }

    /// Smallest positive mote id not yet in use. The configuration loader
    /// suggests this id when creating a mote; embedders creating motes
    /// programmatically can do the same.
    pub fn unique_mote_id(&self) -> MoteId {
        let mut id = 1;
        while self.motes.contains_key(&MoteId(id)) {
            id += 1;
        }
        MoteId(id)
    }

    /// Registers a mote type. A duplicate identifier is dropped with a
    /// warning.
    pub fn add_mote_type(&mut self, mote_type: Box<dyn MoteType>) -> bool {
        let identifier = mote_type.identifier().to_string();
        if self.mote_types.contains_key(&identifier) {
            warn!("mote type `{identifier}` already exists, skipped");
            return false;
        }

        self.mote_types.insert(identifier.clone(), mote_type);
        debug!("added mote type `{identifier}`");
        self.observers
            .notify(&KernelEvent::MoteTypeAdded(identifier));
        true
    }

    /// Unregisters a mote type, removing its motes first.
    pub fn remove_mote_type(&mut self, identifier: &str) -> bool {
        if !self.mote_types.contains_key(identifier) {
            return false;
        }

        let orphans: Vec<MoteId> = self
            .motes
            .values()
            .filter(|m| m.type_identifier() == identifier)
            .map(|m| m.id())
            .collect();
        for id in orphans {
            self.remove_mote(id);
        }

        let mut mote_type = self.mote_types.shift_remove(identifier).unwrap();
        mote_type.removed();

        debug!("removed mote type `{identifier}`");
        self.observers
            .notify(&KernelEvent::MoteTypeRemoved(identifier.to_string()));
        true
    }

    pub fn mote_type(&self, identifier: &str) -> Option<&dyn MoteType> {
        self.mote_types.get(identifier).map(|t| &**t)
    }

    pub fn mote_type_mut(&mut self, identifier: &str) -> Option<&mut (dyn MoteType + '_)> {
        match self.mote_types.get_mut(identifier) {
            Some(t) => Some(&mut **t),
            None => None,
        }
    }

    /// Mote types in registration order.
    pub fn mote_types(&self) -> impl Iterator<Item = &dyn MoteType> {
        self.mote_types.values().map(|t| &**t)
    }

    /// Installs a radio medium, registering every existing mote with it.
    pub fn set_radio_medium(&mut self, medium: Option<Box<dyn RadioMedium>>) {
        self.radio_medium = medium;
        if let Some(radio) = self.radio_medium.as_mut() {
            for id in self.motes.keys() {
                radio.mote_added(*id);
            }
        }
        self.observers.notify(&KernelEvent::RadioMediumChanged);
    }

    pub fn radio_medium(&self) -> Option<&dyn RadioMedium> {
        self.radio_medium.as_deref()
    }

    pub fn radio_medium_mut(&mut self) -> Option<&mut (dyn RadioMedium + '_)> {
        match self.radio_medium.as_mut() {
            Some(m) => Some(&mut **m),
            None => None,
        }
    }
}
