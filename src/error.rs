use std::error;
use std::io;

use thiserror::Error;

use crate::mote::MoteId;

/// Boxed error carried out of event callbacks and collaborators.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// Outcome of a single event callback, as seen by the kernel loop.
#[derive(Debug, Error)]
pub enum EventError {
    /// Graceful stop requested from inside an event, e.g. by an emulator
    /// hitting a breakpoint. The loop exits cleanly.
    #[error("stop requested: {0}")]
    Stop(String),

    /// Unhandled failure. Ends the loop; the kernel annotates it with the
    /// failing event's mote context.
    #[error("{0}")]
    Failed(BoxError),
}

impl EventError {
    /// Wraps an arbitrary error as an event failure.
    pub fn failed<E>(err: E) -> EventError
    where
        E: Into<BoxError>,
    {
        EventError::Failed(err.into())
    }
}

/// Errors surfaced by the kernel lifecycle and loop.
#[derive(Debug, Error)]
pub enum SimError {
    /// The loop popped an empty queue. The kernel presumes at least the
    /// governor or a user event is always pending, so this is a
    /// programming error in the embedding.
    #[error("event queue is empty: simulation loop starved (programming error)")]
    StarvedLoop,

    /// An event callback failed and the loop shut down.
    #[error("event `{label}` failed{}: {source}", mote_context(.mote))]
    EventExecution {
        label: String,
        mote: Option<MoteId>,
        source: BoxError,
    },

    #[error("simulation is already running")]
    AlreadyRunning,

    #[error("failed to spawn simulation thread: {0}")]
    Spawn(#[source] io::Error),
}

impl SimError {
    /// Process exit code for headless embedders: `0` for a normal stop is
    /// the absence of an error; any loop failure maps to `1`.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

fn mote_context(mote: &Option<MoteId>) -> String {
    match mote {
        Some(id) => format!(" ({id})"),
        None => String::new(),
    }
}

/// Errors raised while reading or writing a simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration XML: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("failed to write configuration XML: {0}")]
    Write(#[from] xmltree::Error),

    #[error("configuration I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("simulation must be stopped to load or save configuration")]
    SimulationRunning,

    #[error("unknown type tag `{0}`")]
    UnknownType(String),

    #[error("mote element is missing <motetype_identifier>")]
    MissingMoteType,

    #[error("mote references unknown mote type `{0}`")]
    UnknownMoteType(String),

    #[error("invalid value `{value}` for <{element}>")]
    InvalidValue { element: String, value: String },

    #[error("collaborator rejected configuration: {0}")]
    Collaborator(BoxError),
}
