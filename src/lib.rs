//! A discrete-event simulation kernel for wireless sensor network
//! simulators.
//!
//! Simulated time advances in integer microsecond ticks by dequeuing the
//! earliest pending event, executing it, and repeating. All simulated
//! work runs on one dedicated kernel thread; external threads (UI,
//! emulated radios, user scripts) inject work through two monitored
//! channels: future events via [`Kernel::schedule_external`] and
//! arbitrary actions via [`Kernel::invoke_in_sim_thread`]. Poll actions
//! drain fully between events, equal-time events dispatch in schedule
//! order, and every random draw comes from one seeded generator, which
//! together make runs replayable bit for bit.
//!
//! # Example
//!
//! ```
//! use motesim::{Kernel, MILLISECOND};
//!
//! let kernel = Kernel::new(Some(42));
//!
//! // Set the simulation up while it is stopped.
//! kernel
//!     .with_simulation(|sim| {
//!         sim.set_title("ping");
//!         sim.schedule_fn(10 * MILLISECOND, |sim, time| {
//!             println!("fired at {time} us");
//!             sim.request_stop();
//!         });
//!     })
//!     .unwrap();
//!
//! kernel.start().unwrap();
//! kernel.join().unwrap();
//!
//! assert_eq!(kernel.simulation_time_millis(), 10);
//! ```
//!
//! Collaborators implement [`TimeEvent`] for scheduled work, and the
//! [`Mote`], [`MoteType`] and [`RadioMedium`] traits to take part in the
//! registries and the XML configuration round-trip (see [`config`]).

mod central;
mod error;
mod event;
mod governor;
mod kernel;
mod mote;
mod observers;
mod poll;
mod queue;
mod rng;
mod sim;
mod time;

pub mod config;

pub use central::{EventCentral, MoteOutput};

pub use error::{BoxError, ConfigError, EventError, SimError};

pub use event::{EventHandle, TimeEvent};

pub use kernel::{Kernel, KernelEvent};

pub use mote::{Mote, MoteId, MoteType, RadioMedium};

pub use observers::{Observers, Subscription};

pub use poll::{Action, PollChannel};

pub use queue::{EventQueue, ExternalQueue};

pub use rng::SimRng;

pub use sim::Simulation;

pub use config::Factories;

pub use time::{to_millis, MILLISECOND, SECOND};
