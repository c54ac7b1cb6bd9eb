/// Node type registry using ArcSwap
///
/// Maps a type tag (e.g. "Time/DelayedValue") to the factory that builds a new
/// node of that type with its ports already declared. Reads are lock-free;
/// registration clones the map and swaps the pointer, the same copy-on-write
/// pattern used for hot-reloading anything else read on every request.

use crate::error::{EngineError, Result};
use crate::graph::node::Node;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::{collections::HashMap, fmt, sync::Arc};

/// Factory producing a fresh, unattached node
pub type NodeFactory = Arc<dyn Fn() -> Node + Send + Sync>;

/// A registered node type
#[derive(Clone)]
struct NodeTypeEntry {
    info: NodeTypeInfo,
    factory: NodeFactory,
}

/// Palette entry describing a node type to the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeTypeInfo {
    pub type_tag: String,
    pub title: String,
    pub category: String,
}

/// Lock-free registry of node types
pub struct NodeTypeRegistry {
    /// Key: type tag, Value: palette info and factory
    entries: ArcSwap<HashMap<String, NodeTypeEntry>>,
}

impl fmt::Debug for NodeTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeRegistry")
            .field("types", &self.type_tags())
            .finish()
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Create a registry pre-populated with the built-in node types
    pub fn with_builtin_nodes() -> Self {
        let registry = Self::new();
        crate::nodes::register_builtin_nodes(&registry);
        registry
    }

    /// Register (or replace) a node type
    ///
    /// The category is the part of the tag before the first `/`.
    pub fn register<F>(&self, type_tag: &str, title: &str, factory: F)
    where
        F: Fn() -> Node + Send + Sync + 'static,
    {
        let category = type_tag
            .split_once('/')
            .map(|(category, _)| category)
            .unwrap_or("Other")
            .to_string();

        let entry = NodeTypeEntry {
            info: NodeTypeInfo {
                type_tag: type_tag.to_string(),
                title: title.to_string(),
                category,
            },
            factory: Arc::new(factory),
        };

        self.entries.rcu(|current| {
            let mut updated = (**current).clone();
            updated.insert(type_tag.to_string(), entry.clone());
            updated
        });

        tracing::debug!("🧩 Registered node type: {}", type_tag);
    }

    /// Build a new node of the given type
    ///
    /// The node gets freshly minted node and port ids and is not attached to
    /// any engine.
    pub fn create(&self, type_tag: &str) -> Result<Node> {
        let factory = self
            .entries
            .load()
            .get(type_tag)
            .map(|entry| Arc::clone(&entry.factory))
            .ok_or_else(|| EngineError::UnknownType(type_tag.to_string()))?;

        Ok(factory())
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.entries.load().contains_key(type_tag)
    }

    /// All registered types, sorted by tag for a stable palette
    pub fn list(&self) -> Vec<NodeTypeInfo> {
        let mut types: Vec<NodeTypeInfo> = self
            .entries
            .load()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        types.sort_by(|a, b| a.type_tag.cmp(&b.type_tag));
        types
    }

    pub fn type_tags(&self) -> Vec<String> {
        self.list().into_iter().map(|info| info.type_tag).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}
