/// Panel nodes: nested sub-graphs
///
/// A `Basic/Panel` node opens a panel whose id is the panel node's own id.
/// Every `Basic/PanelInput` placed on that panel shows up as an input port on
/// the panel node, every `Basic/PanelOutput` as an output port. The engine
/// wires those ports through, so these behaviors only carry names.

use crate::error::{EngineError, Result};
use crate::graph::node::{Node, NodeBehavior, NodeContext, PanelRole};
use crate::graph::types::{DataKind, Settings};

pub const PANEL_TYPE_TAG: &str = "Basic/Panel";
pub const INPUT_TYPE_TAG: &str = "Basic/PanelInput";
pub const OUTPUT_TYPE_TAG: &str = "Basic/PanelOutput";

fn required<'a>(settings: &'a Settings, key: &str, node: &str) -> Result<&'a String> {
    settings
        .get(key)
        .ok_or_else(|| EngineError::invalid(format!("{} requires a '{}' setting", node, key)))
}

/// Container behind `Basic/Panel`
#[derive(Debug)]
pub struct PanelNode {
    name: String,
}

pub fn create_panel() -> Node {
    Node::new(
        PANEL_TYPE_TAG,
        "Panel",
        PanelNode {
            name: "Panel".to_string(),
        },
    )
}

impl NodeBehavior for PanelNode {
    fn settings(&self) -> Settings {
        Settings::from([("panelname".to_string(), self.name.clone())])
    }

    fn apply_settings(&mut self, settings: &Settings, _ctx: &mut NodeContext<'_>) -> Result<()> {
        self.name = required(settings, "panelname", "Panel")?.clone();
        Ok(())
    }

    fn panel_role(&self) -> Option<PanelRole> {
        Some(PanelRole::Container)
    }
}

/// Named end of a panel boundary, shared by input and output nodes
#[derive(Debug)]
pub struct PanelPortNode {
    name: String,
    role: PanelRole,
}

/// Value entering the panel: the container's matching input feeds `Value`
pub fn create_input() -> Node {
    Node::new(
        INPUT_TYPE_TAG,
        "Panel Input",
        PanelPortNode {
            name: "Input".to_string(),
            role: PanelRole::Input,
        },
    )
    .with_output("Value", DataKind::Text)
}

/// Value leaving the panel through the container's matching output
pub fn create_output() -> Node {
    Node::new(
        OUTPUT_TYPE_TAG,
        "Panel Output",
        PanelPortNode {
            name: "Output".to_string(),
            role: PanelRole::Output,
        },
    )
    .with_optional_input("Value", DataKind::Text)
}

impl NodeBehavior for PanelPortNode {
    fn settings(&self) -> Settings {
        Settings::from([("name".to_string(), self.name.clone())])
    }

    fn apply_settings(&mut self, settings: &Settings, _ctx: &mut NodeContext<'_>) -> Result<()> {
        self.name = required(settings, "name", "Panel input/output")?.clone();
        Ok(())
    }

    fn panel_role(&self) -> Option<PanelRole> {
        Some(self.role)
    }
}
