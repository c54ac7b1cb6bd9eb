/// Engine error taxonomy
///
/// Every rejected structural operation maps to one of these variants. They are
/// returned as values (never panics) so the editor bridge can report a failed
/// operation without aborting the rest of a batch.

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by the graph engine's structural API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A node or port with this id is already present in the engine
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Node, link or port could not be resolved
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Link endpoints are swapped or otherwise malformed
    #[error("Invalid link endpoint: {0}")]
    InvalidEndpoint(String),

    /// Type tag is not present in the node type registry
    #[error("Unknown node type: {0}")]
    UnknownType(String),

    /// Node settings were rejected by the node itself
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl EngineError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "Node", id: id.into() }
    }

    pub fn port_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "Port", id: id.into() }
    }

    pub fn link_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "Link", id: id.into() }
    }

    /// Create a validation error with a message
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }
}
