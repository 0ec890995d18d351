use std::io::{Read, Write};
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::config::{self, Factories};
use crate::error::{ConfigError, EventError, SimError};
use crate::event::{EventHandle, TimeEvent};
use crate::mote::{Mote, MoteId};
use crate::observers::{Observers, Subscription};
use crate::poll::PollChannel;
use crate::queue::ExternalQueue;
use crate::sim::Simulation;
use crate::time::{to_millis, MILLISECOND};

/// How long a blocking [`Kernel::stop`] waits for the simulation thread.
/// Bounded so a caller is never deadlocked on a kernel stuck inside a
/// user callback.
const STOP_WAIT: Duration = Duration::from_millis(100);

/// Lifecycle notification delivered to kernel observers.
///
/// Delivery is serial, from the simulation thread, or from the mutator
/// thread while the simulation is stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    Started,
    Stopped,
    MoteAdded(MoteId),
    MoteRemoved(MoteId),
    MoteTypeAdded(String),
    MoteTypeRemoved(String),
    RadioMediumChanged,
    TitleChanged,
    SpeedLimitChanged,
    SeedChanged,
    ConfigChanged,
}

/// State shared between the kernel handle and the simulation thread.
pub(crate) struct Shared {
    pub(crate) clock_us: AtomicU64,
    pub(crate) stop_requested: AtomicBool,
    state: Mutex<RunState>,
    stopped: Condvar,
}

/// `running` and the thread identity form one snapshot: readers never see
/// a running simulation without its thread id, or a stale id after exit.
struct RunState {
    running: bool,
    thread: Option<ThreadId>,
}

impl Shared {
    fn new() -> Shared {
        Shared {
            clock_us: AtomicU64::new(0),
            stop_requested: AtomicBool::new(false),
            state: Mutex::new(RunState {
                running: false,
                thread: None,
            }),
            stopped: Condvar::new(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    pub(crate) fn is_simulation_thread(&self) -> bool {
        self.state.lock().unwrap().thread == Some(thread::current().id())
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Release);
    }
}

/// The simulation kernel.
///
/// Owns the simulation thread, the clock, the event queue, the poll
/// channel and the speed governor. Simulated work is single-threaded:
/// a dedicated kernel thread executes all events sequentially, and
/// external threads interact exclusively through [`schedule_external`]
/// (future events) and [`invoke_in_sim_thread`] (arbitrary actions).
///
/// The handle is cheap to clone and safe to share.
///
/// # Example
///
/// ```
/// use motesim::{Kernel, MILLISECOND};
///
/// let kernel = Kernel::new(Some(42));
///
/// kernel
///     .with_simulation(|sim| {
///         sim.set_title("hello");
///         sim.schedule_fn(5 * MILLISECOND, |sim, t| {
///             assert_eq!(t, 5 * MILLISECOND);
///             sim.request_stop();
///         });
///     })
///     .unwrap();
///
/// kernel.start().unwrap();
/// kernel.join().unwrap();
/// assert_eq!(kernel.simulation_time(), 5 * MILLISECOND);
/// ```
///
/// [`schedule_external`]: Kernel::schedule_external
/// [`invoke_in_sim_thread`]: Kernel::invoke_in_sim_thread
pub struct Kernel {
    inner: Arc<Inner>,
}

struct Inner {
    sim: Mutex<Simulation>,
    poll: PollChannel,
    external: ExternalQueue,
    shared: Arc<Shared>,
    observers: Observers<KernelEvent>,
    outcome: Mutex<Option<SimError>>,
}

impl Kernel {
    /// Creates a stopped kernel. `seed` seeds the deterministic random
    /// generator; `None` draws a seed from entropy.
    pub fn new(seed: Option<u64>) -> Kernel {
        let shared = Arc::new(Shared::new());
        let observers = Observers::new();
        let sim = Simulation::new(shared.clone(), observers.clone(), seed);
        let external = sim.queue.external();

        Kernel {
            inner: Arc::new(Inner {
                sim: Mutex::new(sim),
                poll: PollChannel::new(),
                external,
                shared,
                observers,
                outcome: Mutex::new(None),
            }),
        }
    }

    /// Spawns the simulation thread and starts the loop.
    pub fn start(&self) -> Result<(), SimError> {
        let mut state = self.inner.shared.state.lock().unwrap();
        if state.running {
            return Err(SimError::AlreadyRunning);
        }

        self.inner.shared.stop_requested.store(false, Release);
        *self.inner.outcome.lock().unwrap() = None;
        state.running = true;

        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || run_simulation(inner));

        match spawned {
            Ok(handle) => {
                state.thread = Some(handle.thread().id());
                debug!("simulation thread spawned");
                Ok(())
            }
            Err(err) => {
                state.running = false;
                Err(SimError::Spawn(err))
            }
        }
    }

    /// Requests the loop to exit after the current event.
    ///
    /// With `block` set, and when called off the simulation thread, waits
    /// up to 100 ms for the thread to finish; called from the simulation
    /// thread it returns immediately and the loop honors the request
    /// after the current event.
    pub fn stop(&self, block: bool) {
        self.inner.shared.request_stop();
        debug!("stop requested");

        if !block || self.inner.shared.is_simulation_thread() {
            return;
        }

        let deadline = Instant::now() + STOP_WAIT;
        let mut state = self.inner.shared.state.lock().unwrap();
        while state.running {
            let now = Instant::now();
            if now >= deadline {
                warn!("simulation thread still running after {STOP_WAIT:?}");
                return;
            }
            let (guard, _) = self
                .inner
                .shared
                .stopped
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    /// Runs exactly one simulated millisecond, then stops.
    ///
    /// Only valid while stopped: schedules a stop sentinel at
    /// `clock + 1 ms` and starts the loop. Events already queued for that
    /// exact time run before the sentinel.
    pub fn step_millisecond(&self) -> Result<(), SimError> {
        if self.is_running() {
            return Err(SimError::AlreadyRunning);
        }
        {
            let mut sim = self.inner.sim.lock().unwrap();
            let at = sim.time() + MILLISECOND;
            sim.schedule_event(Box::new(StopEvent), at);
        }
        self.start()
    }

    /// Blocks until the loop exits, returning its outcome.
    pub fn join(&self) -> Result<(), SimError> {
        let mut state = self.inner.shared.state.lock().unwrap();
        while state.running {
            state = self.inner.shared.stopped.wait(state).unwrap();
        }
        drop(state);

        match self.inner.outcome.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Last loop failure, formatted, without consuming it.
    pub fn last_error(&self) -> Option<String> {
        self.inner.outcome.lock().unwrap().as_ref().map(|e| e.to_string())
    }

    pub fn is_running(&self) -> bool {
        self.inner.shared.is_running()
    }

    /// True on the thread currently executing simulated work.
    pub fn is_simulation_thread(&self) -> bool {
        self.inner.shared.is_simulation_thread()
    }

    /// Current simulated time in microseconds. Safe from any thread.
    pub fn simulation_time(&self) -> u64 {
        self.inner.shared.clock_us.load(Acquire)
    }

    /// Current simulated time in whole milliseconds. Safe from any thread.
    pub fn simulation_time_millis(&self) -> u64 {
        to_millis(self.simulation_time())
    }

    /// Submits an action to run on the simulation thread between events.
    /// Safe from any thread; queued actions also run during configuration
    /// load and at loop start.
    pub fn invoke_in_sim_thread<F>(&self, action: F)
    where
        F: FnOnce(&mut Simulation) + Send + 'static,
    {
        self.inner.poll.submit(action);
    }

    /// Schedules an event from any thread. The event becomes visible to
    /// the loop before its next pop.
    pub fn schedule_external(&self, event: Box<dyn TimeEvent>, time: u64) -> EventHandle {
        self.inner.external.schedule(event, time)
    }

    /// Schedules an event inline. Only valid while stopped; a running
    /// simulation must be reached through [`schedule_external`] or
    /// [`invoke_in_sim_thread`], and calling this instead is a
    /// programming error.
    ///
    /// [`schedule_external`]: Kernel::schedule_external
    /// [`invoke_in_sim_thread`]: Kernel::invoke_in_sim_thread
    pub fn schedule_event(&self, event: Box<dyn TimeEvent>, time: u64) -> EventHandle {
        assert!(
            !self.is_running(),
            "schedule_event on a running simulation; use schedule_external or invoke_in_sim_thread"
        );
        self.inner.sim.lock().unwrap().schedule_event(event, time)
    }

    /// Inline access to the simulation state while stopped.
    ///
    /// Fails with [`SimError::AlreadyRunning`] while the loop owns the
    /// state.
    pub fn with_simulation<R, F>(&self, f: F) -> Result<R, SimError>
    where
        F: FnOnce(&mut Simulation) -> R,
    {
        if self.is_running() {
            return Err(SimError::AlreadyRunning);
        }
        let mut sim = self.inner.sim.lock().unwrap();
        Ok(f(&mut sim))
    }

    /// Registers a mote: inline while stopped, deferred to the simulation
    /// thread while running.
    pub fn add_mote(&self, mote: Box<dyn Mote>) {
        if self.is_running() {
            self.inner.poll.submit(move |sim| {
                sim.add_mote(mote);
            });
        } else {
            self.inner.sim.lock().unwrap().add_mote(mote);
        }
    }

    /// Unregisters a mote: inline while stopped, deferred to the
    /// simulation thread while running. Once the removal action has run,
    /// the mote receives no further events.
    pub fn remove_mote(&self, id: MoteId) {
        if self.is_running() {
            self.inner.poll.submit(move |sim| {
                sim.remove_mote(id);
            });
        } else {
            self.inner.sim.lock().unwrap().remove_mote(id);
        }
    }

    /// Sets the speed limit: inline while stopped, deferred to the
    /// simulation thread while running.
    pub fn set_speed_limit(&self, limit: Option<f64>) {
        if self.is_running() {
            self.inner.poll.submit(move |sim| sim.set_speed_limit(limit));
        } else {
            self.inner.sim.lock().unwrap().set_speed_limit(limit);
        }
    }

    /// Reseeds the random generator: inline while stopped, deferred to
    /// the simulation thread while running.
    pub fn set_random_seed(&self, seed: u64) {
        if self.is_running() {
            self.inner.poll.submit(move |sim| sim.set_random_seed(seed));
        } else {
            self.inner.sim.lock().unwrap().set_random_seed(seed);
        }
    }

    /// Subscribes to lifecycle notifications.
    pub fn observe<F>(&self, observer: F) -> Subscription
    where
        F: FnMut(&KernelEvent) + Send + 'static,
    {
        self.inner.observers.subscribe(observer)
    }

    /// Loads a configuration. Only valid while stopped. After the state
    /// is applied the radio medium is signaled and queued poll actions
    /// run, so collaborator setup completes before the first `start`.
    pub fn load_config<R: Read>(&self, reader: R, factories: &Factories) -> Result<(), ConfigError> {
        if self.is_running() {
            return Err(ConfigError::SimulationRunning);
        }
        let mut sim = self.inner.sim.lock().unwrap();

        config::load(&mut sim, factories, reader)?;
        if let Some(radio) = sim.radio_medium_mut() {
            radio.load_finished();
        }
        self.inner.poll.drain(&mut sim);
        drop(sim);

        self.inner.observers.notify(&KernelEvent::ConfigChanged);
        Ok(())
    }

    /// Writes the configuration. Only valid while stopped.
    pub fn save_config<W: Write>(&self, writer: W) -> Result<(), ConfigError> {
        if self.is_running() {
            return Err(ConfigError::SimulationRunning);
        }
        let sim = self.inner.sim.lock().unwrap();
        config::save(&sim, writer)
    }
}

impl Clone for Kernel {
    fn clone(&self) -> Kernel {
        Kernel {
            inner: self.inner.clone(),
        }
    }
}

/// Stop sentinel used by [`Kernel::step_millisecond`].
struct StopEvent;

impl TimeEvent for StopEvent {
    fn execute(self: Box<Self>, sim: &mut Simulation, _time: u64) -> Result<(), EventError> {
        sim.request_stop();
        Ok(())
    }

    fn label(&self) -> &str {
        "stop"
    }
}

/// Clears the `{running, thread}` snapshot when the loop exits, panics
/// included, so `stop` and `join` never wait on a dead thread.
struct RunGuard {
    shared: Arc<Shared>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.running = false;
        state.thread = None;
        self.shared.stopped.notify_all();
    }
}

fn run_simulation(inner: Arc<Inner>) {
    let guard = RunGuard {
        shared: inner.shared.clone(),
    };

    let mut sim = inner.sim.lock().unwrap();
    inner.observers.notify(&KernelEvent::Started);
    debug!("simulation started at {} us", sim.time());

    let outcome = event_loop(&inner, &mut sim);
    match &outcome {
        Ok(()) => debug!("simulation stopped at {} us", sim.time()),
        Err(err) => error!("simulation thread died: {err}"),
    }
    if let Err(err) = outcome {
        *inner.outcome.lock().unwrap() = Some(err);
    }

    drop(sim);
    drop(guard);
    inner.observers.notify(&KernelEvent::Stopped);
}

fn event_loop(inner: &Inner, sim: &mut Simulation) -> Result<(), SimError> {
    loop {
        inner.poll.drain(sim);

        if inner.shared.stop_requested.load(Acquire) {
            return Ok(());
        }

        let (time, event) = sim.queue.pop_first()?;
        assert!(
            time >= sim.clock,
            "event time regressed: {} us behind the clock at {} us",
            time,
            sim.clock
        );
        sim.clock = time;
        inner.shared.clock_us.store(time, Release);

        let label = event.label().to_string();
        let mote = event.mote();

        match event.execute(sim, time) {
            Ok(()) => {}
            Err(EventError::Stop(reason)) => {
                debug!("stopped by `{label}`: {reason}");
                return Ok(());
            }
            Err(EventError::Failed(source)) => {
                return Err(SimError::EventExecution {
                    label,
                    mote,
                    source,
                })
            }
        }

        if inner.shared.stop_requested.load(Acquire) {
            return Ok(());
        }
    }
}
