/// HTTP API Layer
///
/// Editor bridge between the browser node editor and the engine:
/// - LiteGraph interchange types and conversions
/// - Node, link and settings endpoints
/// - Node palette and the recent error log

// LiteGraph JSON shapes and engine conversions
pub mod litegraph;

// Node editor endpoints (GET/POST/PUT/DELETE)
pub mod editor;

// Re-export router builder and state
pub use editor::{create_editor_routes, EditorState};
