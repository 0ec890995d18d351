use std::collections::VecDeque;

use log::warn;
use xmltree::Element;
use xmltree::XMLNode;

use crate::error::ConfigError;
use crate::mote::MoteId;
use crate::observers::{Observers, Subscription};

const DEFAULT_BUFFER_SIZE: usize = 40_000;

/// A line of output produced by a mote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoteOutput {
    pub mote: MoteId,
    pub time: u64,
    pub message: String,
}

/// Fan-out point for mote output.
///
/// Mote emulators publish their serial/log lines here; interested
/// collaborators subscribe once instead of attaching to every mote. A
/// bounded history of recent lines is kept for late subscribers.
pub struct EventCentral {
    buffer_size: usize,
    recent: VecDeque<MoteOutput>,
    output: Observers<MoteOutput>,
}

impl EventCentral {
    pub fn new() -> EventCentral {
        EventCentral {
            buffer_size: DEFAULT_BUFFER_SIZE,
            recent: VecDeque::new(),
            output: Observers::new(),
        }
    }

    /// Publishes a line of mote output. Simulation thread only.
    pub fn publish(&mut self, output: MoteOutput) {
        if self.recent.len() >= self.buffer_size {
            self.recent.pop_front();
        }
        self.recent.push_back(output.clone());
        self.output.notify(&output);
    }

    /// Subscribes to mote output lines.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: FnMut(&MoteOutput) + Send + 'static,
    {
        self.output.subscribe(observer)
    }

    /// Recent output lines, oldest first.
    pub fn recent_output(&self) -> impl Iterator<Item = &MoteOutput> {
        self.recent.iter()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
        while self.recent.len() > size {
            self.recent.pop_front();
        }
    }

    pub(crate) fn export_config(&self) -> Vec<Element> {
        let mut logoutput = Element::new("logoutput");
        logoutput
            .children
            .push(XMLNode::Text(self.buffer_size.to_string()));
        vec![logoutput]
    }

    pub(crate) fn import_config(&mut self, config: &[Element]) -> Result<(), ConfigError> {
        for child in config {
            match child.name.as_str() {
                "logoutput" => {
                    let text = child
                        .get_text()
                        .map(|t| t.trim().to_string())
                        .unwrap_or_default();
                    let size = text.parse().map_err(|_| ConfigError::InvalidValue {
                        element: child.name.clone(),
                        value: text.clone(),
                    })?;
                    self.set_buffer_size(size);
                }
                other => warn!("ignoring unknown event central element <{other}>"),
            }
        }
        Ok(())
    }
}

impl Default for EventCentral {
    fn default() -> EventCentral {
        EventCentral::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded() {
        let mut central = EventCentral::new();
        central.set_buffer_size(2);

        for i in 0..4 {
            central.publish(MoteOutput {
                mote: MoteId(1),
                time: i,
                message: format!("line {i}"),
            });
        }

        let times: Vec<u64> = central.recent_output().map(|o| o.time).collect();
        assert_eq!(times, vec![2, 3]);
    }

    #[test]
    fn config_round_trip() {
        let mut central = EventCentral::new();
        central.set_buffer_size(123);

        let exported = central.export_config();
        let mut other = EventCentral::new();
        other.import_config(&exported).unwrap();
        assert_eq!(other.buffer_size(), 123);
    }
}
