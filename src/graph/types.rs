/// Core graph type definitions
///
/// Ports, links and layout metadata. Port values are textual scalars, the same
/// representation the editor interchange format uses, so the engine never has
/// to convert between a typed value and its wire form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default panel for nodes that do not name one
pub const MAIN_PANEL_ID: &str = "Main";

/// Node settings as exchanged with the editor (`properties` in LiteGraph terms)
pub type Settings = BTreeMap<String, String>;

/// Declared data kind of a port
///
/// This is a label for the editor, not a type system: links are never
/// rejected because two kinds differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Number,
    Logical,
    Text,
}

/// Which side of a node a port sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// Where a port lives: owning node, side and positional slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortLocation {
    pub node_id: String,
    pub direction: PortDirection,
    pub slot: usize,
}

/// Input port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// Globally unique port id
    pub id: String,
    pub name: String,
    pub kind: DataKind,
    /// Current value, `None` when nothing has arrived yet
    pub value: Option<String>,
    /// An optional input does not need a link or a value for the node to evaluate
    pub optional: bool,
    /// The single link feeding this input, if any
    pub incoming_link_id: Option<String>,
    /// Back-reference to the owning node
    pub node_id: String,
}

/// Output port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Globally unique port id
    pub id: String,
    pub name: String,
    pub kind: DataKind,
    pub value: Option<String>,
    /// Back-reference to the owning node
    pub node_id: String,
}

impl Input {
    pub(crate) fn new(node_id: &str, name: &str, kind: DataKind, optional: bool) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            kind,
            value: None,
            optional,
            incoming_link_id: None,
            node_id: node_id.to_string(),
        }
    }

    /// True if this input does not block evaluation of its node
    pub fn is_satisfied(&self) -> bool {
        self.optional || self.value.is_some()
    }
}

impl Output {
    pub(crate) fn new(node_id: &str, name: &str, kind: DataKind) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            kind,
            value: None,
            node_id: node_id.to_string(),
        }
    }
}

/// Directed edge from exactly one output to exactly one input
///
/// A link only references its endpoints by id; it owns neither of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub output_id: String,
    pub input_id: String,
    pub panel_id: String,
}

/// Editor position, opaque to execution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Editor size, opaque to execution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

/// Layout and settings mutation applied by `Engine::update_node`
///
/// Fields left as `None` are not touched. Topology never changes through an
/// update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub id: String,
    pub title: Option<String>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub settings: Option<Settings>,
}

impl NodeUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Mint a fresh id for nodes, ports and links
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
