/// Node model and the contract every node implementation honors
///
/// A `Node` owns its ordered input and output ports plus a boxed
/// `NodeBehavior`. The behavior only ever sees its own ports through a
/// `NodeContext`: it can read inputs and write outputs, but it has no handle on
/// the engine, so it can never add or remove nodes or links from inside a hook.

use crate::graph::types::{
    new_id, DataKind, Input, Output, PortDirection, Position, Settings, Size, MAIN_PANEL_ID,
};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Behavior of a concrete node type
///
/// Both hooks run while the engine lock is held and must return promptly.
/// `on_tick` is called on every scheduler tick, potentially far more often than
/// the node's own notion of time, so per-tick work has to stay bounded.
pub trait NodeBehavior: Send {
    /// Periodic hook, called once per tick whether or not any input changed
    fn on_tick(&mut self, _ctx: &mut NodeContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Reactive hook, called after the engine pushed a new value into input `slot`
    fn on_input_changed(&mut self, _ctx: &mut NodeContext<'_>, _slot: usize) -> anyhow::Result<()> {
        Ok(())
    }

    /// Current settings as shown in the editor
    fn settings(&self) -> Settings {
        Settings::new()
    }

    /// Validate and apply settings coming from the editor
    fn apply_settings(
        &mut self,
        settings: &Settings,
        _ctx: &mut NodeContext<'_>,
    ) -> crate::error::Result<()> {
        if settings.is_empty() {
            Ok(())
        } else {
            Err(crate::error::EngineError::invalid("node type has no settings"))
        }
    }

    /// Part this node plays in nesting panels, if any
    fn panel_role(&self) -> Option<PanelRole> {
        None
    }
}

/// Part a node plays in nesting panels
///
/// A container opens a panel whose id is the container's own node id. Input
/// and output nodes placed on that panel each get a matching port on the
/// container, and the engine forwards values across the panel boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PanelRole {
    Container,
    /// Value arriving on the container's port leaves through this node's output
    Input,
    /// Value arriving on this node's input leaves through the container's port
    Output,
}

/// One output write made from inside a hook
///
/// Writes are recorded in order and replayed by the propagation walk. The value
/// is captured at write time, so a later write in the same hook does not
/// overwrite what an earlier one delivers.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputWrite {
    pub slot: usize,
    pub output_id: String,
    pub value: Option<String>,
}

/// A node's view of itself while one of its hooks runs
pub struct NodeContext<'a> {
    node_id: &'a str,
    inputs: &'a [Input],
    outputs: &'a mut [Output],
    writes: &'a mut Vec<OutputWrite>,
    now: Duration,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(
        node_id: &'a str,
        inputs: &'a [Input],
        outputs: &'a mut [Output],
        writes: &'a mut Vec<OutputWrite>,
        now: Duration,
    ) -> Self {
        Self {
            node_id,
            inputs,
            outputs,
            writes,
            now,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    /// Monotonic time of the current tick or propagation pass
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn input(&self, slot: usize) -> Option<&Input> {
        self.inputs.get(slot)
    }

    pub fn input_value(&self, slot: usize) -> Option<&str> {
        self.inputs.get(slot).and_then(|input| input.value.as_deref())
    }

    pub fn output_value(&self, slot: usize) -> Option<&str> {
        self.outputs.get(slot).and_then(|output| output.value.as_deref())
    }

    /// True when every non-optional input holds a value
    pub fn inputs_ready(&self) -> bool {
        self.inputs.iter().all(Input::is_satisfied)
    }

    /// Set an output value; the engine propagates it once the hook returns
    ///
    /// Every call is an event, even when the value does not change.
    pub fn set_output(&mut self, slot: usize, value: Option<String>) -> anyhow::Result<()> {
        let output = self.outputs.get_mut(slot).ok_or_else(|| {
            anyhow::anyhow!("Node {} has no output slot {}", self.node_id, slot)
        })?;
        output.value = value.clone();
        self.writes.push(OutputWrite {
            slot,
            output_id: output.id.clone(),
            value,
        });
        Ok(())
    }
}

/// A unit of computation with ordered, typed ports
///
/// Port order is fixed when the node is built; the editor addresses ports by
/// their index, so it must never change afterwards. Panel containers are the
/// one exception: the engine appends and removes their ports as input and
/// output nodes come and go on the panel.
pub struct Node {
    id: String,
    type_tag: String,
    pub title: String,
    pub panel_id: String,
    pub position: Option<Position>,
    pub size: Option<Size>,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    behavior: Box<dyn NodeBehavior>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("title", &self.title)
            .field("panel_id", &self.panel_id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create a node with a fresh id on the main panel and no ports
    pub fn new(
        type_tag: impl Into<String>,
        title: impl Into<String>,
        behavior: impl NodeBehavior + 'static,
    ) -> Self {
        Self {
            id: new_id(),
            type_tag: type_tag.into(),
            title: title.into(),
            panel_id: MAIN_PANEL_ID.to_string(),
            position: None,
            size: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            behavior: Box::new(behavior),
        }
    }

    pub fn with_input(mut self, name: &str, kind: DataKind) -> Self {
        self.inputs.push(Input::new(&self.id, name, kind, false));
        self
    }

    pub fn with_optional_input(mut self, name: &str, kind: DataKind) -> Self {
        self.inputs.push(Input::new(&self.id, name, kind, true));
        self
    }

    pub fn with_output(mut self, name: &str, kind: DataKind) -> Self {
        self.outputs.push(Output::new(&self.id, name, kind));
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    pub fn with_panel(mut self, panel_id: impl Into<String>) -> Self {
        self.panel_id = panel_id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Change the node id, rewriting the back-reference held by every port
    ///
    /// Only reachable before the node is handed to the engine, which never
    /// gives out mutable access to attached nodes.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
        for input in &mut self.inputs {
            input.node_id = self.id.clone();
        }
        for output in &mut self.outputs {
            output.node_id = self.id.clone();
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn settings(&self) -> Settings {
        self.behavior.settings()
    }

    pub fn panel_role(&self) -> Option<PanelRole> {
        self.behavior.panel_role()
    }

    /// True when every non-optional input holds a value
    pub fn inputs_ready(&self) -> bool {
        self.inputs.iter().all(Input::is_satisfied)
    }

    /// Name shown for the port this node owns on its panel container
    pub fn port_label(&self) -> String {
        self.settings()
            .remove("name")
            .unwrap_or_else(|| self.title.clone())
    }

    /// Read-only copy for callers outside the engine lock
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            type_tag: self.type_tag.clone(),
            panel_id: self.panel_id.clone(),
            position: self.position,
            size: self.size,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            settings: self.behavior.settings(),
        }
    }

    pub(crate) fn input_mut(&mut self, slot: usize) -> Option<&mut Input> {
        self.inputs.get_mut(slot)
    }

    pub(crate) fn output_mut(&mut self, slot: usize) -> Option<&mut Output> {
        self.outputs.get_mut(slot)
    }

    /// Append an input port; returns its slot
    pub(crate) fn push_input(&mut self, input: Input) -> usize {
        self.inputs.push(input);
        self.inputs.len() - 1
    }

    /// Append an output port; returns its slot
    pub(crate) fn push_output(&mut self, output: Output) -> usize {
        self.outputs.push(output);
        self.outputs.len() - 1
    }

    /// Remove a port, shifting the later ones down one slot
    pub(crate) fn remove_port(&mut self, direction: PortDirection, slot: usize) {
        match direction {
            PortDirection::Input if slot < self.inputs.len() => {
                self.inputs.remove(slot);
            }
            PortDirection::Output if slot < self.outputs.len() => {
                self.outputs.remove(slot);
            }
            _ => {}
        }
    }

    pub(crate) fn rename_port(&mut self, direction: PortDirection, slot: usize, name: &str) {
        let port_name = match direction {
            PortDirection::Input => self.inputs.get_mut(slot).map(|input| &mut input.name),
            PortDirection::Output => self.outputs.get_mut(slot).map(|output| &mut output.name),
        };
        if let Some(port_name) = port_name {
            *port_name = name.to_string();
        }
    }

    pub(crate) fn output_values(&self) -> Vec<Option<String>> {
        self.outputs.iter().map(|output| output.value.clone()).collect()
    }

    /// Put back values taken with `output_values`
    pub(crate) fn restore_output_values(&mut self, values: Vec<Option<String>>) {
        for (output, value) in self.outputs.iter_mut().zip(values) {
            output.value = value;
        }
    }

    /// Run `f` against the behavior with a fresh context, catching panics
    ///
    /// Returns the output writes made before `f` finished (or panicked) along
    /// with `f`'s result, or the panic payload.
    pub(crate) fn run_hook<R>(
        &mut self,
        now: Duration,
        f: impl FnOnce(&mut dyn NodeBehavior, &mut NodeContext<'_>) -> R,
    ) -> (Vec<OutputWrite>, std::thread::Result<R>) {
        let mut writes = Vec::new();
        let Node {
            id,
            inputs,
            outputs,
            behavior,
            ..
        } = self;

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = NodeContext::new(id, inputs, outputs, &mut writes, now);
            f(behavior.as_mut(), &mut ctx)
        }));

        (writes, result)
    }
}

/// Read-only copy of a node as returned by engine queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub title: String,
    pub type_tag: String,
    pub panel_id: String,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub settings: Settings,
}

impl NodeSnapshot {
    pub fn input_slot(&self, input_id: &str) -> Option<usize> {
        self.inputs.iter().position(|input| input.id == input_id)
    }

    pub fn output_slot(&self, output_id: &str) -> Option<usize> {
        self.outputs.iter().position(|output| output.id == output_id)
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
