//! XML configuration round-trip.
//!
//! A simulation is saved as an XML tree: an ordered sequence of named
//! elements with text content and child sequences. Collaborators
//! (mote types, motes, the radio medium, the event central) store their
//! own opaque children under their element; the kernel only owns the
//! skeleton. Type tags written with the legacy prefix are rewritten to
//! the current one on read; writes always emit the current prefix.
//!
//! Encoding is deterministic: loading a file and saving it again yields
//! byte-identical output for the canonical form.

use std::collections::HashMap;
use std::io::{Read, Write};

use log::warn;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::ConfigError;
use crate::mote::{MoteType, RadioMedium};
use crate::sim::Simulation;
use crate::time::MILLISECOND;

/// Current type-tag prefix.
pub const TAG_PREFIX: &str = "org.motesim.";

/// Type-tag prefix accepted from legacy files and rewritten on read.
pub const LEGACY_TAG_PREFIX: &str = "net.motesim.";

type MoteTypeCtor = Box<dyn Fn() -> Box<dyn MoteType> + Send + Sync>;
type RadioMediumCtor = Box<dyn Fn() -> Box<dyn RadioMedium> + Send + Sync>;

/// Per-kernel constructor table mapping type tags to collaborators.
///
/// Nothing here is process-global; every embedding builds its own table
/// and hands it to [`load`].
#[derive(Default)]
pub struct Factories {
    mote_types: HashMap<String, MoteTypeCtor>,
    radio_mediums: HashMap<String, RadioMediumCtor>,
}

impl Factories {
    pub fn new() -> Factories {
        Factories::default()
    }

    pub fn register_mote_type<F>(&mut self, tag: impl Into<String>, ctor: F)
    where
        F: Fn() -> Box<dyn MoteType> + Send + Sync + 'static,
    {
        self.mote_types.insert(tag.into(), Box::new(ctor));
    }

    pub fn register_radio_medium<F>(&mut self, tag: impl Into<String>, ctor: F)
    where
        F: Fn() -> Box<dyn RadioMedium> + Send + Sync + 'static,
    {
        self.radio_mediums.insert(tag.into(), Box::new(ctor));
    }
}

/// Rewrites a legacy type tag to the current prefix.
pub fn normalize_tag(tag: &str) -> String {
    match tag.strip_prefix(LEGACY_TAG_PREFIX) {
        Some(rest) => format!("{TAG_PREFIX}{rest}"),
        None => tag.to_string(),
    }
}

/// Reads a configuration and applies it to `sim`.
pub fn load<R: Read>(
    sim: &mut Simulation,
    factories: &Factories,
    reader: R,
) -> Result<(), ConfigError> {
    let root = Element::parse(reader)?;
    apply(sim, factories, &root)
}

/// Applies an already-parsed configuration tree to `sim`.
pub fn apply(
    sim: &mut Simulation,
    factories: &Factories,
    root: &Element,
) -> Result<(), ConfigError> {
    for node in &root.children {
        let Some(el) = node.as_element() else {
            continue;
        };

        match el.name.as_str() {
            "title" => {
                sim.set_title(text_of(el));
            }
            "speedlimit" => {
                let text = text_of(el);
                if text == "null" {
                    sim.set_speed_limit(None);
                } else {
                    let ratio = text
                        .parse::<f64>()
                        .map_err(|_| invalid(el, &text))?;
                    sim.set_speed_limit(Some(ratio));
                }
            }
            "randomseed" => {
                let text = text_of(el);
                if text == "generated" {
                    sim.set_generated_seed();
                } else {
                    let seed = text
                        .parse::<i64>()
                        .map_err(|_| invalid(el, &text))?;
                    sim.set_random_seed(seed as u64);
                }
            }
            "motedelay" => {
                let text = text_of(el);
                let millis = text
                    .parse::<u64>()
                    .map_err(|_| invalid(el, &text))?;
                sim.set_max_startup_delay(millis * MILLISECOND);
            }
            "motedelay_us" => {
                let text = text_of(el);
                let micros = text
                    .parse::<u64>()
                    .map_err(|_| invalid(el, &text))?;
                sim.set_max_startup_delay(micros);
            }
            "radiomedium" => {
                let tag = normalize_tag(&text_of(el));
                let ctor = factories
                    .radio_mediums
                    .get(&tag)
                    .ok_or_else(|| ConfigError::UnknownType(tag.clone()))?;
                let mut medium = ctor();
                medium
                    .import_config(&children_of(el))
                    .map_err(ConfigError::Collaborator)?;
                sim.set_radio_medium(Some(medium));
            }
            "events" => {
                sim.event_central_mut().import_config(&children_of(el))?;
            }
            "motetype" => {
                let tag = normalize_tag(&text_of(el));
                let ctor = factories
                    .mote_types
                    .get(&tag)
                    .ok_or_else(|| ConfigError::UnknownType(tag.clone()))?;
                let mut mote_type = ctor();
                mote_type
                    .import_config(&children_of(el))
                    .map_err(ConfigError::Collaborator)?;
                sim.add_mote_type(mote_type);
            }
            "mote" => {
                let children = children_of(el);
                let type_id = children
                    .iter()
                    .find(|c| c.name == "motetype_identifier")
                    .map(|c| text_of(c))
                    .ok_or(ConfigError::MissingMoteType)?;

                // Suggest the smallest free id; the mote's own <id>
                // element, when present, replaces it.
                let suggested = sim.unique_mote_id();
                let mut mote = {
                    let mote_type = sim
                        .mote_type_mut(&type_id)
                        .ok_or_else(|| ConfigError::UnknownMoteType(type_id.clone()))?;
                    mote_type
                        .create_mote(suggested)
                        .map_err(ConfigError::Collaborator)?
                };
                mote.import_config(&children)
                    .map_err(ConfigError::Collaborator)?;
                sim.add_mote(mote);
            }
            other => warn!("ignoring unknown configuration element <{other}>"),
        }
    }

    Ok(())
}

/// Writes `sim`'s configuration as indented XML.
pub fn save<W: Write>(sim: &Simulation, writer: W) -> Result<(), ConfigError> {
    let root = export(sim);
    let emitter = EmitterConfig::new().perform_indent(true);
    root.write_with_config(writer, emitter)?;
    Ok(())
}

/// Builds the configuration tree for `sim`.
pub fn export(sim: &Simulation) -> Element {
    let mut root = Element::new("simulation");

    push_element(&mut root, text_element("title", sim.title()));
    push_element(
        &mut root,
        text_element(
            "speedlimit",
            match sim.speed_limit() {
                Some(ratio) => ratio.to_string(),
                None => "null".to_string(),
            },
        ),
    );
    push_element(
        &mut root,
        text_element(
            "randomseed",
            if sim.seed_is_generated() {
                "generated".to_string()
            } else {
                sim.random_seed().to_string()
            },
        ),
    );
    push_element(
        &mut root,
        text_element("motedelay_us", sim.max_startup_delay().to_string()),
    );

    if let Some(medium) = sim.radio_medium() {
        push_element(
            &mut root,
            tagged_element("radiomedium", medium.type_tag(), medium.export_config()),
        );
    }

    let mut events = Element::new("events");
    for child in sim.event_central().export_config() {
        push_element(&mut events, child);
    }
    push_element(&mut root, events);

    for mote_type in sim.mote_types() {
        push_element(
            &mut root,
            tagged_element("motetype", mote_type.type_tag(), mote_type.export_config()),
        );
    }

    for mote in sim.motes() {
        let mut el = Element::new("mote");
        push_element(
            &mut el,
            text_element("motetype_identifier", mote.type_identifier()),
        );
        for child in mote.export_config() {
            push_element(&mut el, child);
        }
        push_element(&mut root, el);
    }

    root
}

fn text_of(el: &Element) -> String {
    el.get_text()
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn children_of(el: &Element) -> Vec<Element> {
    el.children
        .iter()
        .filter_map(|node| node.as_element().cloned())
        .collect()
}

fn invalid(el: &Element, text: &str) -> ConfigError {
    ConfigError::InvalidValue {
        element: el.name.clone(),
        value: text.to_string(),
    }
}

fn text_element(name: &str, text: impl Into<String>) -> Element {
    let mut el = Element::new(name);
    el.children.push(XMLNode::Text(text.into()));
    el
}

fn tagged_element(name: &str, tag: &str, children: Vec<Element>) -> Element {
    let mut el = Element::new(name);
    el.children.push(XMLNode::Text(tag.to_string()));
    for child in children {
        push_element(&mut el, child);
    }
    el
}

fn push_element(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}
