/// LiteGraph interchange format
///
/// The browser editor speaks LiteGraph: ports are addressed by owning node id
/// plus positional slot, and node settings travel as `properties`. These types
/// mirror that JSON shape and convert to and from engine snapshots. The engine
/// itself never sees them.

use crate::error::{EngineError, Result};
use crate::graph::node::NodeSnapshot;
use crate::graph::types::{Link, Position, Settings, Size};
use crate::runtime::engine::Engine;
use serde::{Deserialize, Serialize};

/// Property key carrying the node type tag
pub const OBJECT_TYPE_PROPERTY: &str = "objectType";

/// Port type reported to the editor
///
/// Values are textual everywhere, so every slot accepts every link.
const PORT_TYPE: &str = "string";

/// Editor view of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteGraphNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub panel_id: Option<String>,
    #[serde(default)]
    pub pos: Option<[f32; 2]>,
    #[serde(default)]
    pub size: Option<[f32; 2]>,
    #[serde(default)]
    pub properties: Settings,
    #[serde(default)]
    pub inputs: Vec<LiteGraphInput>,
    #[serde(default)]
    pub outputs: Vec<LiteGraphOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteGraphInput {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub port_type: String,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteGraphOutput {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub port_type: String,
    /// `None` when the output has no outgoing links
    #[serde(default)]
    pub links: Option<Vec<String>>,
}

/// Editor view of a link: endpoints as (node id, slot) pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteGraphLink {
    #[serde(default)]
    pub id: String,
    pub origin_id: String,
    pub origin_slot: usize,
    pub target_id: String,
    pub target_slot: usize,
    #[serde(default)]
    pub panel_id: Option<String>,
}

impl LiteGraphNode {
    /// Convert an engine node; `links` is the engine's link set
    pub fn from_snapshot(snapshot: &NodeSnapshot, links: &[Link]) -> Self {
        let mut properties = snapshot.settings.clone();
        properties.insert(OBJECT_TYPE_PROPERTY.to_string(), snapshot.type_tag.clone());

        let inputs = snapshot
            .inputs
            .iter()
            .map(|input| LiteGraphInput {
                name: input.name.clone(),
                port_type: PORT_TYPE.to_string(),
                link: input.incoming_link_id.clone(),
            })
            .collect();

        let outputs = snapshot
            .outputs
            .iter()
            .map(|output| LiteGraphOutput {
                name: output.name.clone(),
                port_type: PORT_TYPE.to_string(),
                links: Some(
                    links
                        .iter()
                        .filter(|link| link.output_id == output.id)
                        .map(|link| link.id.clone())
                        .collect::<Vec<_>>(),
                )
                .filter(|ids| !ids.is_empty()),
            })
            .collect();

        Self {
            id: snapshot.id.clone(),
            title: snapshot.title.clone(),
            node_type: snapshot.type_tag.clone(),
            panel_id: Some(snapshot.panel_id.clone()),
            pos: snapshot.position.map(|p| [p.x, p.y]),
            size: snapshot.size.map(|s| [s.width, s.height]),
            properties,
            inputs,
            outputs,
        }
    }

    /// Type tag to instantiate: `objectType` first, then `type`
    pub fn type_tag(&self) -> &str {
        self.properties
            .get(OBJECT_TYPE_PROPERTY)
            .map(String::as_str)
            .filter(|tag| !tag.is_empty())
            .unwrap_or(&self.node_type)
    }

    /// Properties other than `objectType`, as node settings
    pub fn settings(&self) -> Settings {
        self.properties
            .iter()
            .filter(|(key, _)| key.as_str() != OBJECT_TYPE_PROPERTY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn position(&self) -> Option<Position> {
        self.pos.map(|[x, y]| Position { x, y })
    }

    pub fn layout_size(&self) -> Option<Size> {
        self.size.map(|[width, height]| Size { width, height })
    }
}

impl LiteGraphLink {
    /// Convert an engine link, resolving port ids back to (node, slot)
    ///
    /// Returns `None` if either endpoint is no longer attached.
    pub fn from_link(link: &Link, engine: &Engine) -> Option<Self> {
        let origin = engine.locate_port(&link.output_id)?;
        let target = engine.locate_port(&link.input_id)?;

        Some(Self {
            id: link.id.clone(),
            origin_id: origin.node_id,
            origin_slot: origin.slot,
            target_id: target.node_id,
            target_slot: target.slot,
            panel_id: Some(link.panel_id.clone()),
        })
    }

    /// Resolve the (output id, input id) pair this link addresses
    ///
    /// A missing node or an out-of-range slot is `NotFound`.
    pub fn resolve_ports(&self, engine: &Engine) -> Result<(String, String)> {
        let origin = engine
            .get_node(&self.origin_id)
            .ok_or_else(|| EngineError::node_not_found(&self.origin_id))?;
        let target = engine
            .get_node(&self.target_id)
            .ok_or_else(|| EngineError::node_not_found(&self.target_id))?;

        let output_id = origin
            .outputs
            .get(self.origin_slot)
            .map(|output| output.id.clone())
            .ok_or_else(|| {
                EngineError::port_not_found(format!("{}[out {}]", self.origin_id, self.origin_slot))
            })?;
        let input_id = target
            .inputs
            .get(self.target_slot)
            .map(|input| input.id.clone())
            .ok_or_else(|| {
                EngineError::port_not_found(format!("{}[in {}]", self.target_id, self.target_slot))
            })?;

        Ok((output_id, input_id))
    }
}
