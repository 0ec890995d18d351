//! Collaborator interfaces: motes, mote types and the radio medium.
//!
//! The kernel never looks inside a mote. It registers them, assigns
//! startup delays, routes configuration to them and guarantees that a
//! removed mote receives no further events. Everything else is the
//! collaborator's business.

use std::fmt;

use xmltree::Element;

use crate::error::BoxError;

/// Identifier of a simulated node, unique within one simulation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoteId(pub u32);

impl From<u32> for MoteId {
    #[inline]
    fn from(val: u32) -> MoteId {
        MoteId(val)
    }
}

impl From<MoteId> for u32 {
    #[inline]
    fn from(val: MoteId) -> u32 {
        val.0
    }
}

impl fmt::Display for MoteId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mote {}", self.0)
    }
}

/// A simulated node.
///
/// Motes are owned by the simulation and only ever touched on the
/// simulation thread, or inline through the kernel while stopped.
pub trait Mote: Send {
    /// Identifier of this mote, unique within the simulation.
    fn id(&self) -> MoteId;

    /// Identifier of the mote type this mote was created from.
    fn type_identifier(&self) -> &str;

    /// Startup clock drift in microseconds, drawn by the kernel in
    /// `[0, max_startup_delay)` when the mote is added. The default
    /// implementation ignores it.
    fn set_startup_delay(&mut self, _delay_us: u64) {}

    /// Configuration children written under this mote's `<mote>` element.
    fn export_config(&self) -> Vec<Element>;

    /// Applies configuration children read from a `<mote>` element. A
    /// failure aborts the configuration load.
    fn import_config(&mut self, config: &[Element]) -> Result<(), BoxError>;

    /// Teardown hook, called on the simulation thread after the mote has
    /// been unlinked from every registry and its events cancelled.
    fn removed(&mut self) {}
}

/// Blueprint for creating motes.
pub trait MoteType: Send {
    /// Identifier referenced by `<motetype_identifier>` in mote configs.
    fn identifier(&self) -> &str;

    /// Type tag written as the text content of the `<motetype>` element.
    fn type_tag(&self) -> &str;

    /// Human readable description.
    fn description(&self) -> String {
        self.identifier().to_string()
    }

    /// Creates an unconfigured mote of this type. `id` is the smallest
    /// identifier not yet in use; a mote's own configuration may replace
    /// it.
    fn create_mote(&mut self, id: MoteId) -> Result<Box<dyn Mote>, BoxError>;

    /// Configuration children written under the `<motetype>` element.
    fn export_config(&self) -> Vec<Element>;

    /// Applies configuration children read from a `<motetype>` element. A
    /// failure aborts the configuration load.
    fn import_config(&mut self, config: &[Element]) -> Result<(), BoxError>;

    /// Teardown hook, called when the type is unregistered.
    fn removed(&mut self) {}
}

/// Collaborator distributing radio traffic between motes.
///
/// The kernel only drives its registration hooks; propagation models,
/// interference and the rest live entirely in the implementation.
pub trait RadioMedium: Send {
    /// Type tag written as the text content of the `<radiomedium>` element.
    fn type_tag(&self) -> &str;

    /// A mote joined the simulation.
    fn mote_added(&mut self, _id: MoteId) {}

    /// A mote left the simulation.
    fn mote_removed(&mut self, _id: MoteId) {}

    /// All configuration has been applied; positions and registrations are
    /// final. Called once after a configuration load.
    fn load_finished(&mut self) {}

    /// Configuration children written under the `<radiomedium>` element.
    fn export_config(&self) -> Vec<Element>;

    /// Applies configuration children read from a `<radiomedium>` element.
    /// A failure aborts the configuration load.
    fn import_config(&mut self, config: &[Element]) -> Result<(), BoxError>;
}
