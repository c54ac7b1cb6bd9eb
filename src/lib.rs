/// Nodeloop: reactive and tick-driven dataflow engine
///
/// This library provides the graph engine behind a node-based automation
/// editor: ports, nodes and links, depth-first cycle-safe value propagation,
/// a periodic tick pass and the HTTP bridge the browser editor talks to.

// Core configuration and setup
pub mod config;

// Engine error taxonomy
pub mod error;

// Graph model layer - ports, links, nodes and the node type registry
pub mod graph;

// Built-in node implementations
pub mod nodes;

// Runtime execution engine - structural API, propagation and tick scheduling
pub mod runtime;

// HTTP API layer - node editor endpoints in the LiteGraph format
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{EngineError, Result};
pub use graph::{Node, NodeBehavior, NodeContext, NodeSnapshot, NodeTypeRegistry};
pub use runtime::{Clock, Engine, ManualClock, MonotonicClock, TickSchedulerService};
pub use server::start_server;
