//! Test collaborators: a minimal mote type, mote and radio medium, plus
//! an event that records its dispatches.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use xmltree::{Element, XMLNode};

use motesim::{
    BoxError, EventError, Mote, MoteId, MoteType, RadioMedium, Simulation, TimeEvent,
};

pub const TEST_TYPE_TAG: &str = "org.motesim.TestMoteType";
pub const TEST_RADIO_TAG: &str = "org.motesim.TestRadioMedium";

pub type Trace = Arc<Mutex<Vec<(u64, String)>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn trace_names(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().iter().map(|(_, n)| n.clone()).collect()
}

fn text_element(name: &str, text: String) -> Element {
    let mut el = Element::new(name);
    el.children.push(XMLNode::Text(text));
    el
}

fn text_of(el: &Element) -> String {
    el.get_text()
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

pub struct TestMote {
    id: MoteId,
    type_id: String,
    pub startup_delay: u64,
}

impl TestMote {
    pub fn new(id: u32, type_id: &str) -> Box<TestMote> {
        Box::new(TestMote {
            id: MoteId(id),
            type_id: type_id.to_string(),
            startup_delay: 0,
        })
    }
}

impl Mote for TestMote {
    fn id(&self) -> MoteId {
        self.id
    }

    fn type_identifier(&self) -> &str {
        &self.type_id
    }

    fn set_startup_delay(&mut self, delay_us: u64) {
        self.startup_delay = delay_us;
    }

    fn export_config(&self) -> Vec<Element> {
        vec![text_element("id", self.id.0.to_string())]
    }

    fn import_config(&mut self, config: &[Element]) -> Result<(), BoxError> {
        for el in config {
            if el.name == "id" {
                let text = text_of(el);
                let id = text
                    .parse()
                    .map_err(|_| format!("invalid mote id `{text}`"))?;
                self.id = MoteId(id);
            }
        }
        Ok(())
    }
}

pub struct TestMoteType {
    identifier: String,
}

impl TestMoteType {
    pub fn new(identifier: &str) -> Box<TestMoteType> {
        Box::new(TestMoteType {
            identifier: identifier.to_string(),
        })
    }
}

impl MoteType for TestMoteType {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn type_tag(&self) -> &str {
        TEST_TYPE_TAG
    }

    fn create_mote(&mut self, id: MoteId) -> Result<Box<dyn Mote>, BoxError> {
        Ok(TestMote::new(id.0, &self.identifier))
    }

    fn export_config(&self) -> Vec<Element> {
        vec![text_element("identifier", self.identifier.clone())]
    }

    fn import_config(&mut self, config: &[Element]) -> Result<(), BoxError> {
        for el in config {
            if el.name == "identifier" {
                self.identifier = text_of(el);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct TestRadioMedium {
    pub registered: Vec<MoteId>,
    pub load_finished: bool,
}

impl RadioMedium for TestRadioMedium {
    fn type_tag(&self) -> &str {
        TEST_RADIO_TAG
    }

    fn mote_added(&mut self, id: MoteId) {
        self.registered.push(id);
    }

    fn mote_removed(&mut self, id: MoteId) {
        self.registered.retain(|m| *m != id);
    }

    fn load_finished(&mut self) {
        self.load_finished = true;
    }

    fn export_config(&self) -> Vec<Element> {
        Vec::new()
    }

    fn import_config(&mut self, _config: &[Element]) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Records `(time, name)` into a shared trace; optionally carries a mote
/// context and optionally requests a stop after firing.
pub struct Recorder {
    pub name: String,
    pub trace: Trace,
    pub mote: Option<MoteId>,
    pub stop_after: bool,
}

impl Recorder {
    pub fn new(name: &str, trace: &Trace) -> Box<Recorder> {
        Box::new(Recorder {
            name: name.to_string(),
            trace: trace.clone(),
            mote: None,
            stop_after: false,
        })
    }

    pub fn for_mote(name: &str, trace: &Trace, mote: MoteId) -> Box<Recorder> {
        Box::new(Recorder {
            name: name.to_string(),
            trace: trace.clone(),
            mote: Some(mote),
            stop_after: false,
        })
    }

    pub fn stopping(name: &str, trace: &Trace) -> Box<Recorder> {
        Box::new(Recorder {
            name: name.to_string(),
            trace: trace.clone(),
            mote: None,
            stop_after: true,
        })
    }
}

impl TimeEvent for Recorder {
    fn execute(self: Box<Self>, sim: &mut Simulation, time: u64) -> Result<(), EventError> {
        self.trace.lock().unwrap().push((time, self.name.clone()));
        if self.stop_after {
            sim.request_stop();
        }
        Ok(())
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn mote(&self) -> Option<MoteId> {
        self.mote
    }
}
