/// Graph engine
///
/// Owns the node set and the link set, enforces the structural invariants and
/// runs both execution modes: reactive propagation and the periodic tick pass.
///
/// Nodes and links live in a petgraph `StableDiGraph`: nodes are the vertices,
/// every link is an edge from the node owning its output to the node owning
/// its input. Stable indices survive removals, so the id -> index map never
/// has to be rebuilt.
///
/// A single mutex guards the whole graph. Every structural mutation, every
/// propagation walk and every tick pass run under it, so no caller can ever
/// observe a graph that is half way through a propagation or a tick.

use crate::error::{EngineError, Result};
use crate::graph::node::{panic_message, Node, NodeSnapshot, OutputWrite, PanelRole};
use crate::graph::registry::NodeTypeRegistry;
use crate::graph::types::{
    new_id, Input, Link, NodeUpdate, Output, PortDirection, PortLocation, Settings,
};
use crate::runtime::clock::Clock;
use crate::runtime::propagation::{
    deliveries_for, invoke_hook, propagate, Delivery, PropagationReport,
};
use parking_lot::Mutex;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

/// How many rejected operations `recent_errors` keeps
const ERROR_HISTORY_LIMIT: usize = 100;

/// Edge weight: the link plus its creation sequence
///
/// petgraph lists a node's edges newest first; `seq` restores insertion order.
#[derive(Debug, Clone)]
pub(crate) struct LinkEdge {
    pub(crate) link: Link,
    seq: u64,
}

/// Node and link collections guarded by the engine lock
#[derive(Default)]
pub(crate) struct GraphState {
    pub(crate) graph: StableDiGraph<Node, LinkEdge>,
    /// Node id -> graph index
    pub(crate) node_index: HashMap<String, NodeIndex>,
    /// Insertion order, which is also the tick order
    pub(crate) order: Vec<NodeIndex>,
    /// Port id -> owning node, direction and slot
    pub(crate) ports: HashMap<String, PortLocation>,
    /// Input id -> output id receiving every value that input receives
    pub(crate) bridges: HashMap<String, String>,
    /// Panel input/output node id -> the port it owns on its container
    panel_ports: HashMap<String, String>,
    next_seq: u64,
}

impl GraphState {
    pub(crate) fn node(&self, id: &str) -> Option<&Node> {
        self.node_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let index = *self.node_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    pub(crate) fn nodes_in_order(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order
            .iter()
            .filter_map(|&index| self.graph.node_weight(index))
    }

    /// Every link, in creation order
    pub(crate) fn links_in_order(&self) -> Vec<&Link> {
        let mut edges: Vec<&LinkEdge> = self
            .graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_weight(edge))
            .collect();
        edges.sort_by_key(|edge| edge.seq);
        edges.into_iter().map(|edge| &edge.link).collect()
    }

    /// Links leaving one output, in creation order
    pub(crate) fn outgoing_links(&self, output_id: &str) -> Vec<&Link> {
        let Some(index) = self
            .ports
            .get(output_id)
            .and_then(|location| self.node_index.get(&location.node_id))
        else {
            return Vec::new();
        };

        let mut edges: Vec<&LinkEdge> = self
            .graph
            .edges_directed(*index, Direction::Outgoing)
            .map(|edge| edge.weight())
            .filter(|edge| edge.link.output_id == output_id)
            .collect();
        edges.sort_by_key(|edge| edge.seq);
        edges.into_iter().map(|edge| &edge.link).collect()
    }

    /// The edge feeding an input, if any
    fn incoming_edge(&self, input_id: &str) -> Option<EdgeIndex> {
        let location = self.ports.get(input_id)?;
        let index = *self.node_index.get(&location.node_id)?;
        self.graph
            .edges_directed(index, Direction::Incoming)
            .find(|edge| edge.weight().link.input_id == input_id)
            .map(|edge| edge.id())
    }

    /// Edges touching a node in either direction, self-loops once
    fn incident_edges(&self, index: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .chain(self.graph.edges_directed(index, Direction::Incoming))
            .map(|edge| edge.id())
            .collect();
        edges.sort();
        edges.dedup();
        edges
    }

    fn port_value(&self, port_id: &str) -> Option<Option<String>> {
        let location = self.ports.get(port_id)?;
        let node = self.node(&location.node_id)?;
        match location.direction {
            PortDirection::Input => node.inputs().get(location.slot).map(|p| p.value.clone()),
            PortDirection::Output => node.outputs().get(location.slot).map(|p| p.value.clone()),
        }
    }

    /// Set an output from outside its node's hooks, as a bridge does
    pub(crate) fn write_output(&mut self, output_id: &str, value: Option<String>) -> Option<OutputWrite> {
        let location = self.ports.get(output_id).cloned()?;
        let output = self
            .node_mut(&location.node_id)?
            .output_mut(location.slot)?;
        output.value = value.clone();

        Some(OutputWrite {
            slot: location.slot,
            output_id: output_id.to_string(),
            value,
        })
    }

    fn insert_node(&mut self, node: Node) -> Result<String> {
        if self.node_index.contains_key(node.id()) {
            return Err(EngineError::DuplicateId(node.id().to_string()));
        }

        let mut port_locations = Vec::new();
        for (slot, input) in node.inputs().iter().enumerate() {
            port_locations.push((input.id.clone(), PortDirection::Input, slot));
        }
        for (slot, output) in node.outputs().iter().enumerate() {
            port_locations.push((output.id.clone(), PortDirection::Output, slot));
        }

        let mut seen = HashSet::new();
        for (port_id, _, _) in &port_locations {
            if self.ports.contains_key(port_id) || !seen.insert(port_id.as_str()) {
                return Err(EngineError::DuplicateId(port_id.clone()));
            }
        }

        for (port_id, direction, slot) in port_locations {
            self.ports.insert(
                port_id,
                PortLocation {
                    node_id: node.id().to_string(),
                    direction,
                    slot,
                },
            );
        }

        let id = node.id().to_string();
        let role = node.panel_role();
        tracing::info!(
            "➕ Added node: '{}' (type: {}, panel: {})",
            id,
            node.type_tag(),
            node.panel_id
        );
        let index = self.graph.add_node(node);
        self.node_index.insert(id.clone(), index);
        self.order.push(index);

        match role {
            Some(PanelRole::Input) | Some(PanelRole::Output) => self.attach_panel_port(&id),
            Some(PanelRole::Container) => {
                // Input/output nodes may have been placed before their container
                let waiting: Vec<String> = self
                    .nodes_in_order()
                    .filter(|inner| inner.panel_id == id && inner.id() != id)
                    .map(|inner| inner.id().to_string())
                    .collect();
                for inner_id in waiting {
                    self.attach_panel_port(&inner_id);
                }
            }
            None => {}
        }

        Ok(id)
    }

    /// Give a panel input/output node its port on the panel's container
    ///
    /// No-op when the node's panel has no container node.
    fn attach_panel_port(&mut self, inner_id: &str) {
        if self.panel_ports.contains_key(inner_id) {
            return;
        }
        let Some(inner) = self.node(inner_id) else {
            return;
        };
        let (role, panel_id, name) = (inner.panel_role(), inner.panel_id.clone(), inner.port_label());
        let inner_input = inner.inputs().first().map(|input| (input.id.clone(), input.kind));
        let inner_output = inner.outputs().first().map(|output| (output.id.clone(), output.kind));

        if self.node(&panel_id).and_then(Node::panel_role) != Some(PanelRole::Container) {
            return;
        }

        let (port_id, direction, slot) = match (role, inner_input, inner_output) {
            (Some(PanelRole::Input), _, Some((inner_output_id, kind))) => {
                let port = Input::new(&panel_id, &name, kind, true);
                let port_id = port.id.clone();
                let Some(container) = self.node_mut(&panel_id) else {
                    return;
                };
                let slot = container.push_input(port);
                self.bridges.insert(port_id.clone(), inner_output_id);
                (port_id, PortDirection::Input, slot)
            }
            (Some(PanelRole::Output), Some((inner_input_id, kind)), _) => {
                let port = Output::new(&panel_id, &name, kind);
                let port_id = port.id.clone();
                let Some(container) = self.node_mut(&panel_id) else {
                    return;
                };
                let slot = container.push_output(port);
                self.bridges.insert(inner_input_id, port_id.clone());
                (port_id, PortDirection::Output, slot)
            }
            _ => return,
        };

        self.ports.insert(
            port_id.clone(),
            PortLocation {
                node_id: panel_id.clone(),
                direction,
                slot,
            },
        );
        self.panel_ports.insert(inner_id.to_string(), port_id);
        tracing::info!(
            "🪟 Panel '{}' gained {:?} port '{}' for node '{}'",
            panel_id,
            direction,
            name,
            inner_id
        );
    }

    /// Drop the container port owned by a panel input/output node
    fn detach_panel_port(&mut self, inner_id: &str) -> Vec<Link> {
        let Some(port_id) = self.panel_ports.remove(inner_id) else {
            return Vec::new();
        };
        self.bridges
            .retain(|input_id, output_id| *input_id != port_id && *output_id != port_id);

        let Some(location) = self.ports.remove(&port_id) else {
            return Vec::new();
        };
        let Some(&index) = self.node_index.get(&location.node_id) else {
            return Vec::new();
        };

        let touching: Vec<EdgeIndex> = self
            .incident_edges(index)
            .into_iter()
            .filter(|&edge| {
                self.graph.edge_weight(edge).is_some_and(|weight| {
                    weight.link.output_id == port_id || weight.link.input_id == port_id
                })
            })
            .collect();
        let removed: Vec<Link> = touching
            .into_iter()
            .filter_map(|edge| self.remove_edge(edge))
            .collect();

        let Some(container) = self.graph.node_weight_mut(index) else {
            return removed;
        };
        container.remove_port(location.direction, location.slot);

        // Later ports moved down one slot
        let shifted: Vec<String> = match location.direction {
            PortDirection::Input => container.inputs().iter().map(|p| p.id.clone()).collect(),
            PortDirection::Output => container.outputs().iter().map(|p| p.id.clone()).collect(),
        };
        for (slot, id) in shifted.iter().enumerate() {
            if let Some(entry) = self.ports.get_mut(id) {
                entry.slot = slot;
            }
        }

        tracing::info!(
            "🪟 Panel '{}' lost port '{}' with node '{}'",
            location.node_id,
            port_id,
            inner_id
        );
        removed
    }

    /// Keep a container port's name in step with its input/output node
    fn sync_panel_port_name(&mut self, inner_id: &str) {
        let Some(port_id) = self.panel_ports.get(inner_id) else {
            return;
        };
        let Some(location) = self.ports.get(port_id).cloned() else {
            return;
        };
        let Some(name) = self.node(inner_id).map(Node::port_label) else {
            return;
        };
        if let Some(container) = self.node_mut(&location.node_id) {
            container.rename_port(location.direction, location.slot, &name);
        }
    }

    /// Nodes inside the panel a container opens, nested panels included
    fn panel_contents(&self, container_id: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([container_id.to_string()]);
        let mut pending = vec![container_id.to_string()];

        while let Some(panel_id) = pending.pop() {
            for node in self.nodes_in_order() {
                if node.panel_id != panel_id || !seen.insert(node.id().to_string()) {
                    continue;
                }
                found.push(node.id().to_string());
                if node.panel_role() == Some(PanelRole::Container) {
                    pending.push(node.id().to_string());
                }
            }
        }

        found
    }

    fn remove_node(&mut self, id: &str) -> Result<Vec<Link>> {
        let index = *self
            .node_index
            .get(id)
            .ok_or_else(|| EngineError::node_not_found(id))?;

        let mut removed = Vec::new();
        if self.graph.node_weight(index).and_then(Node::panel_role) == Some(PanelRole::Container) {
            for inner_id in self.panel_contents(id) {
                removed.extend(self.remove_single(&inner_id));
            }
        }
        removed.extend(self.remove_single(id));

        Ok(removed)
    }

    fn remove_single(&mut self, id: &str) -> Vec<Link> {
        let Some(&index) = self.node_index.get(id) else {
            return Vec::new();
        };

        let mut removed = self.detach_panel_port(id);
        for edge in self.incident_edges(index) {
            removed.extend(self.remove_edge(edge));
        }

        let Some(node) = self.graph.remove_node(index) else {
            return removed;
        };
        self.node_index.remove(id);
        self.order.retain(|&other| other != index);

        let port_ids: HashSet<&str> = node
            .inputs()
            .iter()
            .map(|input| input.id.as_str())
            .chain(node.outputs().iter().map(|output| output.id.as_str()))
            .collect();
        self.ports.retain(|port_id, _| !port_ids.contains(port_id.as_str()));
        self.bridges.retain(|input_id, output_id| {
            !port_ids.contains(input_id.as_str()) && !port_ids.contains(output_id.as_str())
        });

        tracing::info!(
            "🗑️ Removed node: '{}' (type: {}) and {} link(s)",
            id,
            node.type_tag(),
            removed.len()
        );

        removed
    }

    /// Remove one edge and reset the input it fed
    fn remove_edge(&mut self, edge: EdgeIndex) -> Option<Link> {
        let LinkEdge { link, .. } = self.graph.remove_edge(edge)?;
        self.clear_incoming(&link.input_id, &link.id);
        Some(link)
    }

    /// Reset an input's incoming link marker if it still points at `link_id`
    fn clear_incoming(&mut self, input_id: &str, link_id: &str) {
        let Some(location) = self.ports.get(input_id).cloned() else {
            return;
        };
        if let Some(input) = self
            .node_mut(&location.node_id)
            .and_then(|node| node.input_mut(location.slot))
        {
            if input.incoming_link_id.as_deref() == Some(link_id) {
                input.incoming_link_id = None;
            }
        }
    }

    /// Resolve both endpoints of a prospective link
    fn resolve_endpoints(
        &self,
        output_id: &str,
        input_id: &str,
    ) -> Result<(PortLocation, PortLocation)> {
        let output = self
            .ports
            .get(output_id)
            .cloned()
            .ok_or_else(|| EngineError::port_not_found(output_id))?;
        let input = self
            .ports
            .get(input_id)
            .cloned()
            .ok_or_else(|| EngineError::port_not_found(input_id))?;

        if output.direction != PortDirection::Output {
            return Err(EngineError::InvalidEndpoint(format!(
                "link origin '{}' is not an output",
                output_id
            )));
        }
        if input.direction != PortDirection::Input {
            return Err(EngineError::InvalidEndpoint(format!(
                "link target '{}' is not an input",
                input_id
            )));
        }

        Ok((output, input))
    }

    fn connect(&mut self, output_id: &str, input_id: &str) -> Result<(Link, Option<String>)> {
        let (output_location, input_location) = self.resolve_endpoints(output_id, input_id)?;

        let source = *self
            .node_index
            .get(&output_location.node_id)
            .ok_or_else(|| EngineError::node_not_found(&output_location.node_id))?;
        let target = *self
            .node_index
            .get(&input_location.node_id)
            .ok_or_else(|| EngineError::node_not_found(&input_location.node_id))?;
        let panel_id = self
            .graph
            .node_weight(target)
            .map(|node| node.panel_id.clone())
            .ok_or_else(|| EngineError::node_not_found(&input_location.node_id))?;

        if let Some(previous) = self.incoming_edge(input_id) {
            if let Some(replaced) = self.remove_edge(previous) {
                tracing::info!(
                    "🔁 Input '{}' already linked, replaced link '{}' from '{}'",
                    input_id,
                    replaced.id,
                    replaced.output_id
                );
            }
        }

        let link = Link {
            id: new_id(),
            output_id: output_id.to_string(),
            input_id: input_id.to_string(),
            panel_id,
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.graph.add_edge(
            source,
            target,
            LinkEdge {
                link: link.clone(),
                seq,
            },
        );

        if let Some(input) = self
            .graph
            .node_weight_mut(target)
            .and_then(|node| node.input_mut(input_location.slot))
        {
            input.incoming_link_id = Some(link.id.clone());
        }

        let current = self
            .graph
            .node_weight(source)
            .and_then(|node| node.outputs().get(output_location.slot))
            .and_then(|output| output.value.clone());

        tracing::info!(
            "🔗 Added link '{}': {} → {}",
            link.id,
            output_location.node_id,
            input_location.node_id
        );

        Ok((link, current))
    }
}

/// A rejected operation as recorded by `Engine::log_engine_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineErrorRecord {
    pub message: String,
    /// RFC 3339 timestamp
    pub at: String,
}

/// Counters for one tick pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub nodes_ticked: usize,
    /// Tick hooks that returned an error or panicked
    pub tick_failures: usize,
    /// Everything propagated from the values written during the tick
    pub propagation: PropagationReport,
}

/// Dataflow graph engine
///
/// Shared as `Arc<Engine>` with the tick scheduler and the editor bridge.
pub struct Engine {
    state: Mutex<GraphState>,
    registry: Arc<NodeTypeRegistry>,
    clock: Arc<dyn Clock>,
    errors: Mutex<VecDeque<EngineErrorRecord>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.node_count())
            .field("links", &self.link_count())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an empty engine with a node type registry and a time source
    pub fn new(registry: Arc<NodeTypeRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            registry,
            clock,
            errors: Mutex::new(VecDeque::new()),
        }
    }

    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    /// Error-reporting hook for every rejected operation
    ///
    /// Logs the message and keeps it in a bounded history so the editor bridge
    /// can show what went wrong without the failure aborting anything else.
    pub fn log_engine_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("❌ Engine error: {}", message);

        let mut errors = self.errors.lock();
        if errors.len() == ERROR_HISTORY_LIMIT {
            errors.pop_front();
        }
        errors.push_back(EngineErrorRecord {
            message,
            at: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// Most recent rejected operations, oldest first
    pub fn recent_errors(&self) -> Vec<EngineErrorRecord> {
        self.errors.lock().iter().cloned().collect()
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.log_engine_error(e.to_string());
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────
    // Structural API
    // ─────────────────────────────────────────────────────────────────────

    /// Build a new, unattached node of the given type
    ///
    /// The graph is never touched; the caller decides whether to `add_node` it.
    pub fn create_node(&self, type_tag: &str) -> Result<Node> {
        self.report(self.registry.create(type_tag))
    }

    /// Build a node and apply initial settings before it is attached
    ///
    /// Empty settings leave the type's defaults alone. Writes made while the
    /// settings are applied stay on the node's outputs and reach links made later.
    pub fn create_configured_node(&self, type_tag: &str, settings: &Settings) -> Result<Node> {
        let now = self.clock.now();
        let result = self.registry.create(type_tag).and_then(|mut node| {
            if settings.is_empty() {
                return Ok(node);
            }
            let (_, outcome) =
                node.run_hook(now, |behavior, ctx| behavior.apply_settings(settings, ctx));
            match outcome {
                Ok(Ok(())) => Ok(node),
                Ok(Err(e)) => Err(e),
                Err(payload) => Err(EngineError::invalid(format!(
                    "settings for new '{}' node panicked: {}",
                    type_tag,
                    panic_message(payload.as_ref())
                ))),
            }
        });
        self.report(result)
    }

    /// Insert a node; returns its id
    pub fn add_node(&self, node: Node) -> Result<String> {
        let result = self.state.lock().insert_node(node);
        self.report(result)
    }

    /// Remove a node and every link touching any of its ports
    pub fn remove_node(&self, id: &str) -> Result<Vec<Link>> {
        let result = self.state.lock().remove_node(id);
        self.report(result)
    }

    /// Link an output to an input
    ///
    /// An existing link into the input is replaced. The output's current value
    /// is pushed through the new link right away, so the target sees upstream
    /// state without waiting for the next change.
    pub fn add_link(&self, output_id: &str, input_id: &str) -> Result<Link> {
        let now = self.clock.now();
        let result = {
            let mut state = self.state.lock();
            state.connect(output_id, input_id).map(|(link, current)| {
                let root = Delivery::root(Some(link.id.clone()), link.input_id.clone(), current);
                let report = propagate(&mut state, now, vec![root]);
                tracing::debug!("📤 Initial propagation for link '{}': {:?}", link.id, report);
                link
            })
        };
        self.report(result)
    }

    /// Remove the link between an output and an input
    ///
    /// The input keeps its last value; disconnecting never resets state.
    pub fn remove_link(&self, output_id: &str, input_id: &str) -> Result<Link> {
        let result = {
            let mut state = self.state.lock();
            let edge = state
                .incoming_edge(input_id)
                .filter(|&edge| {
                    state
                        .graph
                        .edge_weight(edge)
                        .is_some_and(|weight| weight.link.output_id == output_id)
                });
            match edge.and_then(|edge| state.remove_edge(edge)) {
                Some(link) => {
                    tracing::info!("✂️ Removed link '{}': {} → {}", link.id, output_id, input_id);
                    Ok(link)
                }
                None => Err(EngineError::link_not_found(format!(
                    "{} → {}",
                    output_id, input_id
                ))),
            }
        };
        self.report(result)
    }

    /// Change layout, title or settings of a node without touching topology
    ///
    /// Settings are validated by the node first; a rejected update leaves the
    /// node untouched, including any outputs the node wrote before rejecting.
    pub fn update_node(&self, update: NodeUpdate) -> Result<NodeSnapshot> {
        let now = self.clock.now();
        let result = {
            let mut state = self.state.lock();
            Self::apply_update(&mut state, update, now)
        };
        self.report(result)
    }

    fn apply_update(
        state: &mut GraphState,
        update: NodeUpdate,
        now: std::time::Duration,
    ) -> Result<NodeSnapshot> {
        let node = state
            .node_mut(&update.id)
            .ok_or_else(|| EngineError::node_not_found(&update.id))?;

        let mut writes = Vec::new();
        if let Some(settings) = &update.settings {
            let before = node.output_values();
            let (settings_writes, result) =
                node.run_hook(now, |behavior, ctx| behavior.apply_settings(settings, ctx));
            let rejected = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(EngineError::invalid(format!(
                    "settings for node '{}' panicked: {}",
                    update.id,
                    panic_message(payload.as_ref())
                ))),
            };
            if let Some(e) = rejected {
                node.restore_output_values(before);
                return Err(e);
            }
            writes = settings_writes;
        }

        if let Some(title) = update.title {
            node.title = title;
        }
        if let Some(position) = update.position {
            node.position = Some(position);
        }
        if let Some(size) = update.size {
            node.size = Some(size);
        }

        tracing::info!("✏️ Updated node: '{}'", update.id);

        if update.settings.is_some() {
            state.sync_panel_port_name(&update.id);
        }

        let roots = deliveries_for(state, &writes, &Rc::from(Vec::new()));
        propagate(state, now, roots);

        state
            .node(&update.id)
            .map(Node::snapshot)
            .ok_or_else(|| EngineError::node_not_found(&update.id))
    }

    /// Feed a value into an unlinked input from outside the graph
    ///
    /// This is the entry point for external sources such as gateways. A linked
    /// input always mirrors its upstream output and rejects injected values.
    pub fn set_input_value(&self, input_id: &str, value: Option<String>) -> Result<PropagationReport> {
        let now = self.clock.now();
        let result = {
            let mut state = self.state.lock();
            Self::inject(&mut state, input_id, value, now)
        };
        self.report(result)
    }

    fn inject(
        state: &mut GraphState,
        input_id: &str,
        value: Option<String>,
        now: std::time::Duration,
    ) -> Result<PropagationReport> {
        let location = state
            .ports
            .get(input_id)
            .cloned()
            .ok_or_else(|| EngineError::port_not_found(input_id))?;
        if location.direction != PortDirection::Input {
            return Err(EngineError::InvalidEndpoint(format!(
                "'{}' is not an input",
                input_id
            )));
        }

        let linked = state
            .node(&location.node_id)
            .and_then(|node| node.inputs().get(location.slot))
            .and_then(|input| input.incoming_link_id.clone());
        if let Some(link_id) = linked {
            return Err(EngineError::InvalidEndpoint(format!(
                "input '{}' is fed by link '{}'",
                input_id, link_id
            )));
        }

        let root = Delivery::root(None, input_id.to_string(), value);
        Ok(propagate(state, now, vec![root]))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tick pass
    // ─────────────────────────────────────────────────────────────────────

    /// Run every node's periodic hook once, in insertion order
    ///
    /// Each node's writes are propagated before the next node ticks. A failing
    /// node is logged and skipped; it never stops the pass.
    pub fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let mut report = TickReport::default();

        let order = state.order.clone();
        for index in order {
            let Some(node) = state.graph.node_weight_mut(index) else {
                continue;
            };
            let (writes, ok) = invoke_hook(node, now, "tick", |behavior, ctx| behavior.on_tick(ctx));
            report.nodes_ticked += 1;
            if !ok {
                report.tick_failures += 1;
            }

            if !writes.is_empty() {
                let roots = deliveries_for(&state, &writes, &Rc::from(Vec::new()));
                report.propagation.absorb(propagate(&mut state, now, roots));
            }
        }

        report
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> Option<NodeSnapshot> {
        self.state.lock().node(id).map(Node::snapshot)
    }

    /// All nodes in insertion order, optionally limited to one panel
    pub fn nodes(&self, panel_id: Option<&str>) -> Vec<NodeSnapshot> {
        self.state
            .lock()
            .nodes_in_order()
            .filter(|node| panel_id.map_or(true, |panel| node.panel_id == panel))
            .map(Node::snapshot)
            .collect()
    }

    /// All links in insertion order, optionally limited to one panel
    pub fn links(&self, panel_id: Option<&str>) -> Vec<Link> {
        self.state
            .lock()
            .links_in_order()
            .into_iter()
            .filter(|link| panel_id.map_or(true, |panel| link.panel_id == panel))
            .cloned()
            .collect()
    }

    pub fn links_for_output(&self, output_id: &str) -> Vec<Link> {
        self.state
            .lock()
            .outgoing_links(output_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn link_for_input(&self, input_id: &str) -> Option<Link> {
        let state = self.state.lock();
        state
            .incoming_edge(input_id)
            .and_then(|edge| state.graph.edge_weight(edge))
            .map(|edge| edge.link.clone())
    }

    /// Node owning the given input port
    pub fn input_owner(&self, input_id: &str) -> Option<NodeSnapshot> {
        self.owner(input_id, PortDirection::Input)
    }

    /// Node owning the given output port
    pub fn output_owner(&self, output_id: &str) -> Option<NodeSnapshot> {
        self.owner(output_id, PortDirection::Output)
    }

    fn owner(&self, port_id: &str, direction: PortDirection) -> Option<NodeSnapshot> {
        let state = self.state.lock();
        let location = state.ports.get(port_id)?;
        if location.direction != direction {
            return None;
        }
        state.node(&location.node_id).map(Node::snapshot)
    }

    /// Owning node, side and positional slot of a port
    pub fn locate_port(&self, port_id: &str) -> Option<PortLocation> {
        self.state.lock().ports.get(port_id).cloned()
    }

    /// Current value of any port; `None` if the port is unknown or empty
    pub fn port_value(&self, port_id: &str) -> Option<String> {
        self.state.lock().port_value(port_id).flatten()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{NodeBehavior, NodeContext};
    use crate::graph::types::{DataKind, Position, Settings};
    use crate::nodes::panel;
    use crate::runtime::clock::ManualClock;

    /// Copies input 0 to output 0 and counts reactive calls
    #[derive(Default)]
    struct Relay;

    impl NodeBehavior for Relay {
        fn on_input_changed(&mut self, ctx: &mut NodeContext<'_>, slot: usize) -> anyhow::Result<()> {
            let value = ctx.input_value(slot).map(str::to_string);
            ctx.set_output(0, value)
        }
    }

    struct Source {
        value: String,
    }

    impl NodeBehavior for Source {
        fn on_tick(&mut self, ctx: &mut NodeContext<'_>) -> anyhow::Result<()> {
            ctx.set_output(0, Some(self.value.clone()))
        }

        fn settings(&self) -> Settings {
            Settings::from([("value".to_string(), self.value.clone())])
        }

        fn apply_settings(&mut self, settings: &Settings, _ctx: &mut NodeContext<'_>) -> Result<()> {
            let value = settings
                .get("value")
                .ok_or_else(|| EngineError::invalid("missing value"))?;
            self.value = value.clone();
            Ok(())
        }
    }

    /// Ticks out "stable"; settings write "partial" before failing
    struct Flaky {
        panic: bool,
    }

    impl NodeBehavior for Flaky {
        fn on_tick(&mut self, ctx: &mut NodeContext<'_>) -> anyhow::Result<()> {
            ctx.set_output(0, Some("stable".to_string()))
        }

        fn apply_settings(&mut self, _settings: &Settings, ctx: &mut NodeContext<'_>) -> Result<()> {
            ctx.set_output(0, Some("partial".to_string()))
                .map_err(|e| EngineError::invalid(e.to_string()))?;
            if self.panic {
                panic!("settings blew up");
            }
            Err(EngineError::invalid("second thoughts"))
        }
    }

    struct Failing;

    impl NodeBehavior for Failing {
        fn on_tick(&mut self, _ctx: &mut NodeContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("sensor offline")
        }
    }

    fn relay(id: &str) -> Node {
        Node::new("Test/Relay", "Relay", Relay)
            .with_input("in", DataKind::Number)
            .with_output("out", DataKind::Number)
            .with_id(id)
    }

    fn source(id: &str, value: &str) -> Node {
        Node::new(
            "Test/Source",
            "Source",
            Source {
                value: value.to_string(),
            },
        )
        .with_output("out", DataKind::Number)
        .with_id(id)
    }

    fn engine() -> Engine {
        Engine::new(
            Arc::new(NodeTypeRegistry::with_builtin_nodes()),
            Arc::new(ManualClock::new()),
        )
    }

    fn out(engine: &Engine, node: &str) -> String {
        engine.get_node(node).unwrap().outputs[0].id.clone()
    }

    fn inp(engine: &Engine, node: &str) -> String {
        engine.get_node(node).unwrap().inputs[0].id.clone()
    }

    #[test]
    fn test_add_node_rejects_duplicate_id() {
        let engine = engine();
        engine.add_node(relay("a")).unwrap();

        let err = engine.add_node(relay("a")).unwrap_err();
        assert_eq!(err, EngineError::DuplicateId("a".to_string()));
        assert_eq!(engine.node_count(), 1);
        assert_eq!(engine.recent_errors().len(), 1);
    }

    #[test]
    fn test_remove_missing_node() {
        let engine = engine();
        let err = engine.remove_node("ghost").unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "Node", .. }));
    }

    #[test]
    fn test_add_link_pushes_current_value() {
        let engine = engine();
        engine.add_node(source("src", "42")).unwrap();
        engine.add_node(relay("dst")).unwrap();
        engine.tick();

        engine.add_link(&out(&engine, "src"), &inp(&engine, "dst")).unwrap();

        assert_eq!(engine.port_value(&inp(&engine, "dst")).as_deref(), Some("42"));
        assert_eq!(engine.port_value(&out(&engine, "dst")).as_deref(), Some("42"));
    }

    #[test]
    fn test_add_link_replaces_existing_link() {
        let engine = engine();
        engine.add_node(source("a", "1")).unwrap();
        engine.add_node(source("b", "2")).unwrap();
        engine.add_node(relay("dst")).unwrap();
        let input = inp(&engine, "dst");

        let first = engine.add_link(&out(&engine, "a"), &input).unwrap();
        let second = engine.add_link(&out(&engine, "b"), &input).unwrap();

        assert_eq!(engine.link_count(), 1);
        assert_eq!(engine.link_for_input(&input), Some(second.clone()));
        assert!(engine.links_for_output(&out(&engine, "a")).is_empty());
        assert_ne!(first.id, second.id);
        assert_eq!(
            engine.get_node("dst").unwrap().inputs[0].incoming_link_id,
            Some(second.id)
        );
    }

    #[test]
    fn test_add_link_rejects_swapped_endpoints() {
        let engine = engine();
        engine.add_node(relay("a")).unwrap();
        engine.add_node(relay("b")).unwrap();

        let err = engine.add_link(&inp(&engine, "a"), &inp(&engine, "b")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEndpoint(_)));

        let err = engine.add_link(&out(&engine, "a"), &out(&engine, "b")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEndpoint(_)));
        assert_eq!(engine.link_count(), 0);
    }

    #[test]
    fn test_add_link_unknown_port() {
        let engine = engine();
        engine.add_node(relay("a")).unwrap();

        let err = engine.add_link("nope", &inp(&engine, "a")).unwrap_err();
        assert_eq!(err, EngineError::port_not_found("nope"));
    }

    #[test]
    fn test_remove_link_keeps_last_value() {
        let engine = engine();
        engine.add_node(source("src", "5")).unwrap();
        engine.add_node(relay("dst")).unwrap();
        engine.tick();
        let (output, input) = (out(&engine, "src"), inp(&engine, "dst"));
        engine.add_link(&output, &input).unwrap();

        engine.remove_link(&output, &input).unwrap();

        assert_eq!(engine.link_count(), 0);
        assert_eq!(engine.port_value(&input).as_deref(), Some("5"));
        assert_eq!(engine.get_node("dst").unwrap().inputs[0].incoming_link_id, None);

        let err = engine.remove_link(&output, &input).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "Link", .. }));
    }

    #[test]
    fn test_remove_node_cascades_links() {
        let engine = engine();
        engine.add_node(source("src", "1")).unwrap();
        engine.add_node(relay("mid")).unwrap();
        engine.add_node(relay("dst")).unwrap();
        engine.add_link(&out(&engine, "src"), &inp(&engine, "mid")).unwrap();
        engine.add_link(&out(&engine, "mid"), &inp(&engine, "dst")).unwrap();
        let dst_input = inp(&engine, "dst");

        let removed = engine.remove_node("mid").unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(engine.link_count(), 0);
        assert!(engine.get_node("mid").is_none());
        assert_eq!(engine.get_node("dst").unwrap().inputs[0].incoming_link_id, None);
        assert!(engine.locate_port(&dst_input).is_some());
    }

    #[test]
    fn test_update_node_applies_layout_and_settings() {
        let engine = engine();
        engine.add_node(source("src", "1")).unwrap();

        let mut update = NodeUpdate::new("src");
        update.position = Some(Position { x: 10.0, y: 20.0 });
        update.settings = Some(Settings::from([("value".to_string(), "9".to_string())]));
        let snapshot = engine.update_node(update).unwrap();

        assert_eq!(snapshot.position, Some(Position { x: 10.0, y: 20.0 }));
        assert_eq!(snapshot.settings.get("value").map(String::as_str), Some("9"));
    }

    #[test]
    fn test_rejected_settings_leave_node_untouched() {
        let engine = engine();
        engine.add_node(source("src", "1")).unwrap();

        let mut update = NodeUpdate::new("src");
        update.position = Some(Position { x: 1.0, y: 1.0 });
        update.settings = Some(Settings::new());
        let err = engine.update_node(update).unwrap_err();

        assert!(matches!(err, EngineError::ValidationFailed(_)));
        assert_eq!(engine.get_node("src").unwrap().position, None);
    }

    #[test]
    fn test_set_input_value_runs_reactive_hook() {
        let engine = engine();
        engine.add_node(relay("a")).unwrap();
        engine.add_node(relay("b")).unwrap();
        engine.add_link(&out(&engine, "a"), &inp(&engine, "b")).unwrap();

        let report = engine
            .set_input_value(&inp(&engine, "a"), Some("3".to_string()))
            .unwrap();

        assert_eq!(report.deliveries, 2);
        assert_eq!(engine.port_value(&out(&engine, "b")).as_deref(), Some("3"));
    }

    #[test]
    fn test_set_input_value_rejects_linked_input() {
        let engine = engine();
        engine.add_node(relay("a")).unwrap();
        engine.add_node(relay("b")).unwrap();
        engine.add_link(&out(&engine, "a"), &inp(&engine, "b")).unwrap();

        let err = engine
            .set_input_value(&inp(&engine, "b"), Some("1".to_string()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_tick_isolates_failing_nodes() {
        let engine = engine();
        engine
            .add_node(Node::new("Test/Failing", "Failing", Failing).with_id("bad"))
            .unwrap();
        engine.add_node(source("src", "7")).unwrap();
        engine.add_node(relay("dst")).unwrap();
        engine.add_link(&out(&engine, "src"), &inp(&engine, "dst")).unwrap();

        let report = engine.tick();

        assert_eq!(report.nodes_ticked, 3);
        assert_eq!(report.tick_failures, 1);
        assert_eq!(engine.port_value(&out(&engine, "dst")).as_deref(), Some("7"));
    }

    #[test]
    fn test_create_node_unknown_type_leaves_graph_alone() {
        let engine = engine();
        engine.add_node(relay("a")).unwrap();

        let err = engine.create_node("Foo.Bar.DoesNotExist").unwrap_err();

        assert_eq!(err, EngineError::UnknownType("Foo.Bar.DoesNotExist".to_string()));
        assert_eq!(engine.node_count(), 1);
    }

    #[test]
    fn test_panel_filters_and_owner_lookups() {
        let engine = engine();
        engine.add_node(source("src", "1").with_panel("Sub")).unwrap();
        engine.add_node(relay("dst").with_panel("Sub")).unwrap();
        engine.add_node(relay("main")).unwrap();
        let link = engine.add_link(&out(&engine, "src"), &inp(&engine, "dst")).unwrap();

        assert_eq!(engine.nodes(Some("Sub")).len(), 2);
        assert_eq!(engine.nodes(None).len(), 3);
        assert_eq!(link.panel_id, "Sub");
        assert_eq!(engine.links(Some("Sub")).len(), 1);
        assert!(engine.links(Some("Main")).is_empty());

        assert_eq!(engine.output_owner(&link.output_id).unwrap().id, "src");
        assert_eq!(engine.input_owner(&link.input_id).unwrap().id, "dst");
        assert!(engine.input_owner(&link.output_id).is_none());

        let location = engine.locate_port(&link.input_id).unwrap();
        assert_eq!(location.direction, PortDirection::Input);
        assert_eq!(location.slot, 0);
    }

    #[test]
    fn test_error_history_is_bounded() {
        let engine = engine();
        for i in 0..(ERROR_HISTORY_LIMIT + 5) {
            engine.log_engine_error(format!("failure {}", i));
        }

        let errors = engine.recent_errors();
        assert_eq!(errors.len(), ERROR_HISTORY_LIMIT);
        assert_eq!(errors[0].message, "failure 5");
    }

    #[test]
    fn test_order_survives_removals() {
        let engine = engine();
        for id in ["a", "b", "c", "d"] {
            engine.add_node(relay(id)).unwrap();
        }
        for target in ["b", "c", "d"] {
            engine.add_link(&out(&engine, "a"), &inp(&engine, target)).unwrap();
        }

        engine.remove_node("c").unwrap();
        // Lands in the graph slot freed by "c"
        engine.add_node(relay("e")).unwrap();
        engine.add_link(&out(&engine, "a"), &inp(&engine, "e")).unwrap();

        let ids: Vec<String> = engine.nodes(None).into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a", "b", "d", "e"]);

        let targets: Vec<String> = engine
            .links_for_output(&out(&engine, "a"))
            .iter()
            .map(|link| engine.input_owner(&link.input_id).unwrap().id)
            .collect();
        assert_eq!(targets, vec!["b", "d", "e"]);
        assert_eq!(engine.links(None).len(), 3);
    }

    #[test]
    fn test_rejected_settings_restore_outputs() {
        for panic in [false, true] {
            let engine = engine();
            engine
                .add_node(
                    Node::new("Test/Flaky", "Flaky", Flaky { panic })
                        .with_output("out", DataKind::Text)
                        .with_id("flaky"),
                )
                .unwrap();
            engine.add_node(relay("dst")).unwrap();
            engine.add_link(&out(&engine, "flaky"), &inp(&engine, "dst")).unwrap();
            engine.tick();

            let mut update = NodeUpdate::new("flaky");
            update.settings = Some(Settings::new());
            assert!(engine.update_node(update).is_err());

            assert_eq!(engine.port_value(&out(&engine, "flaky")).as_deref(), Some("stable"));
            assert_eq!(engine.port_value(&out(&engine, "dst")).as_deref(), Some("stable"));
        }
    }

    #[test]
    fn test_create_configured_node() {
        let engine = engine();
        let settings = Settings::from([("value".to_string(), "on".to_string())]);

        let node = engine
            .create_configured_node(crate::nodes::constant::TYPE_TAG, &settings)
            .unwrap();
        assert_eq!(node.settings(), settings);
        assert_eq!(node.outputs()[0].value.as_deref(), Some("on"));

        let err = engine
            .create_configured_node(crate::nodes::slider::TYPE_TAG, &Settings::from([
                ("min".to_string(), "3".to_string()),
                ("max".to_string(), "1".to_string()),
            ]))
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
        assert_eq!(engine.recent_errors().len(), 1);
    }

    fn panel_port(engine: &Engine, tag: &str, id: &str, panel_id: &str, name: &str) -> Node {
        engine
            .create_configured_node(tag, &Settings::from([("name".to_string(), name.to_string())]))
            .unwrap()
            .with_id(id)
            .with_panel(panel_id)
    }

    fn container(engine: &Engine, id: &str) -> Node {
        engine.create_node(panel::PANEL_TYPE_TAG).unwrap().with_id(id)
    }

    #[test]
    fn test_panel_input_forwards_into_panel() {
        let engine = engine();
        engine.add_node(container(&engine, "p")).unwrap();
        engine
            .add_node(panel_port(&engine, panel::INPUT_TYPE_TAG, "pin", "p", "Level"))
            .unwrap();
        engine.add_node(relay("inner").with_panel("p")).unwrap();
        engine.add_link(&out(&engine, "pin"), &inp(&engine, "inner")).unwrap();

        let boundary = inp(&engine, "p");
        assert_eq!(engine.get_node("p").unwrap().inputs[0].name, "Level");
        let report = engine.set_input_value(&boundary, Some("5".to_string())).unwrap();

        assert_eq!(report.deliveries, 2);
        assert_eq!(engine.port_value(&out(&engine, "pin")).as_deref(), Some("5"));
        assert_eq!(engine.port_value(&out(&engine, "inner")).as_deref(), Some("5"));
    }

    #[test]
    fn test_panel_output_forwards_out_of_panel() {
        let engine = engine();
        engine.add_node(container(&engine, "p")).unwrap();
        engine
            .add_node(panel_port(&engine, panel::OUTPUT_TYPE_TAG, "pout", "p", "Result"))
            .unwrap();
        engine.add_node(relay("src").with_panel("p")).unwrap();
        engine.add_node(relay("outside")).unwrap();
        engine.add_link(&out(&engine, "src"), &inp(&engine, "pout")).unwrap();
        engine.add_link(&out(&engine, "p"), &inp(&engine, "outside")).unwrap();

        engine.set_input_value(&inp(&engine, "src"), Some("x".to_string())).unwrap();

        assert_eq!(engine.port_value(&out(&engine, "p")).as_deref(), Some("x"));
        assert_eq!(engine.port_value(&out(&engine, "outside")).as_deref(), Some("x"));
    }

    #[test]
    fn test_container_ports_follow_inner_nodes() {
        let engine = engine();
        // Inner nodes first: the container picks them up when it arrives
        engine
            .add_node(panel_port(&engine, panel::INPUT_TYPE_TAG, "in1", "p", "A"))
            .unwrap();
        engine
            .add_node(panel_port(&engine, panel::INPUT_TYPE_TAG, "in2", "p", "B"))
            .unwrap();
        engine.add_node(container(&engine, "p")).unwrap();
        engine.add_node(source("feed", "1")).unwrap();

        let names = |engine: &Engine| -> Vec<String> {
            engine.get_node("p").unwrap().inputs.iter().map(|i| i.name.clone()).collect()
        };
        assert_eq!(names(&engine), vec!["A", "B"]);

        let port_b = engine.get_node("p").unwrap().inputs[1].id.clone();
        engine.add_link(&out(&engine, "feed"), &port_b).unwrap();

        engine.remove_node("in1").unwrap();
        assert_eq!(names(&engine), vec!["B"]);
        assert_eq!(engine.locate_port(&port_b).unwrap().slot, 0);
        assert_eq!(engine.link_count(), 1);

        let removed = engine.remove_node("in2").unwrap();
        assert_eq!(removed.len(), 1);
        assert!(names(&engine).is_empty());
        assert!(engine.locate_port(&port_b).is_none());
        assert_eq!(engine.link_count(), 0);
    }

    #[test]
    fn test_renaming_inner_node_renames_container_port() {
        let engine = engine();
        engine.add_node(container(&engine, "p")).unwrap();
        engine
            .add_node(panel_port(&engine, panel::OUTPUT_TYPE_TAG, "pout", "p", "Old"))
            .unwrap();

        let mut update = NodeUpdate::new("pout");
        update.settings = Some(Settings::from([("name".to_string(), "New".to_string())]));
        engine.update_node(update).unwrap();

        assert_eq!(engine.get_node("p").unwrap().outputs[0].name, "New");
    }

    #[test]
    fn test_removing_panel_removes_its_contents() {
        let engine = engine();
        engine.add_node(container(&engine, "p").with_panel("q")).unwrap();
        engine.add_node(container(&engine, "q").with_panel("p")).unwrap();
        engine.add_node(relay("in_p").with_panel("p")).unwrap();
        engine.add_node(relay("in_q").with_panel("q")).unwrap();
        engine.add_node(relay("main")).unwrap();
        engine.add_link(&out(&engine, "in_q"), &inp(&engine, "main")).unwrap();

        engine.remove_node("p").unwrap();

        assert_eq!(engine.node_count(), 1);
        assert!(engine.get_node("main").is_some());
        assert_eq!(engine.link_count(), 0);
        assert_eq!(engine.get_node("main").unwrap().inputs[0].incoming_link_id, None);
    }
}
