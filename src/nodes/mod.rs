/// Built-in node types
///
/// `register_builtin_nodes` is called once at startup to fill the node type
/// registry; the editor can only instantiate what is registered here.

pub mod constant;
pub mod delayed_value;
pub mod panel;
pub mod slider;

use crate::graph::registry::NodeTypeRegistry;

/// Register all built-in nodes
pub fn register_builtin_nodes(registry: &NodeTypeRegistry) {
    registry.register(constant::TYPE_TAG, "Constant", constant::create);
    registry.register(delayed_value::TYPE_TAG, "Delayed Value", delayed_value::create);
    registry.register(panel::PANEL_TYPE_TAG, "Panel", panel::create_panel);
    registry.register(panel::INPUT_TYPE_TAG, "Panel Input", panel::create_input);
    registry.register(panel::OUTPUT_TYPE_TAG, "Panel Output", panel::create_output);
    registry.register(slider::TYPE_TAG, "Slider", slider::create);

    tracing::info!("Registered {} built-in node types", registry.len());
}
