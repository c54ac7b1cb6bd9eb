/// Graph model layer
///
/// Ports, links, nodes and the node type registry. Nothing in here executes a
/// graph; the runtime module owns the node set and drives the hooks.

// Port, link and layout type definitions
pub mod types;

// Node struct, node behavior contract and hook context
pub mod node;

// Type tag -> factory registry using ArcSwap
pub mod registry;

// Re-export commonly used types
pub use node::{Node, NodeBehavior, NodeContext, NodeSnapshot, OutputWrite, PanelRole};
pub use registry::{NodeTypeInfo, NodeTypeRegistry};
pub use types::{
    DataKind, Input, Link, NodeUpdate, Output, PortDirection, PortLocation, Position, Settings,
    Size, MAIN_PANEL_ID,
};
