/// Value propagation walk
///
/// Pushes output writes along their links into target inputs and runs each
/// target's reactive hook. The walk is depth-first: everything a target node
/// writes is delivered before the next sibling link of the output that fed it.
/// It runs on an explicit stack instead of recursion.
///
/// Every delivery carries the links already traversed on its way from the
/// root. A link that is already on that path closes a feedback loop and is
/// skipped, so a cycle is walked once around and then stops. Links reached
/// again along a different path (a diamond, or a node writing the same output
/// twice) are delivered again, so an input always ends up mirroring the last
/// value written to its upstream output.
///
/// Ordering follows the insertion order of links and of the writes made inside
/// a hook. That is deterministic for a fixed graph but carries no meaning
/// across structural mutations (a replaced link moves to the end).

use crate::graph::node::{panic_message, Node, NodeBehavior, NodeContext, OutputWrite};
use crate::runtime::engine::GraphState;
use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;

/// One value on its way into an input
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    /// `None` for values injected from outside the graph
    pub link_id: Option<String>,
    pub input_id: String,
    pub value: Option<String>,
    /// Links traversed from the root up to, not including, `link_id`
    pub path: Rc<[String]>,
}

impl Delivery {
    /// Delivery starting a new propagation path
    pub(crate) fn root(link_id: Option<String>, input_id: String, value: Option<String>) -> Self {
        Self {
            link_id,
            input_id,
            value,
            path: Rc::from(Vec::new()),
        }
    }
}

/// Counters for one propagation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    /// Values written into inputs
    pub deliveries: usize,
    /// Deliveries dropped because their link was already on the path behind them
    pub skipped_cycles: usize,
    /// Reactive hooks not run because a required input had no value
    pub deferred: usize,
    /// Reactive hooks that returned an error or panicked
    pub failures: usize,
}

impl PropagationReport {
    pub fn absorb(&mut self, other: PropagationReport) {
        self.deliveries += other.deliveries;
        self.skipped_cycles += other.skipped_cycles;
        self.deferred += other.deferred;
        self.failures += other.failures;
    }
}

/// Run a node hook with per-node failure isolation
///
/// Errors and panics are logged and reported as `false`; the writes made
/// before the failure are still returned and will be propagated.
pub(crate) fn invoke_hook(
    node: &mut Node,
    now: Duration,
    hook: &str,
    f: impl FnOnce(&mut dyn NodeBehavior, &mut NodeContext<'_>) -> anyhow::Result<()>,
) -> (Vec<OutputWrite>, bool) {
    let (writes, result) = node.run_hook(now, f);

    let ok = match result {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(
                "❌ Node '{}' ({}) failed in {} hook: {}",
                node.id(),
                node.type_tag(),
                hook,
                e
            );
            false
        }
        Err(payload) => {
            tracing::error!(
                "💥 Node '{}' ({}) panicked in {} hook: {}",
                node.id(),
                node.type_tag(),
                hook,
                panic_message(payload.as_ref())
            );
            false
        }
    };

    (writes, ok)
}

/// Turn output writes into deliveries, one per outgoing link, in order
pub(crate) fn deliveries_for(
    state: &GraphState,
    writes: &[OutputWrite],
    path: &Rc<[String]>,
) -> Vec<Delivery> {
    writes
        .iter()
        .flat_map(|write| {
            state
                .outgoing_links(&write.output_id)
                .into_iter()
                .map(move |link| Delivery {
                    link_id: Some(link.id.clone()),
                    input_id: link.input_id.clone(),
                    value: write.value.clone(),
                    path: Rc::clone(path),
                })
        })
        .collect()
}

/// Walk the graph from the given root deliveries until nothing is left to deliver
pub(crate) fn propagate(
    state: &mut GraphState,
    now: Duration,
    roots: Vec<Delivery>,
) -> PropagationReport {
    let mut report = PropagationReport::default();

    // Reversed so the first delivery is popped first
    let mut stack: Vec<Delivery> = roots;
    stack.reverse();

    while let Some(delivery) = stack.pop() {
        let path = match &delivery.link_id {
            Some(link_id) if delivery.path.contains(link_id) => {
                tracing::debug!("🔄 Link '{}' closes a cycle on this path, skipping", link_id);
                report.skipped_cycles += 1;
                continue;
            }
            Some(link_id) => {
                let mut extended = delivery.path.to_vec();
                extended.push(link_id.clone());
                Rc::from(extended)
            }
            None => Rc::clone(&delivery.path),
        };

        let Some(location) = state.ports.get(&delivery.input_id).cloned() else {
            tracing::warn!("⚠️ Delivery to unknown input '{}' dropped", delivery.input_id);
            continue;
        };
        let bridged = state.bridges.get(&delivery.input_id).cloned();

        let Some(node) = state.node_mut(&location.node_id) else {
            continue;
        };
        let Some(input) = node.input_mut(location.slot) else {
            continue;
        };
        input.value = delivery.value.clone();
        report.deliveries += 1;

        let mut writes = Vec::new();
        if node.inputs_ready() {
            let slot = location.slot;
            let (hook_writes, ok) = invoke_hook(node, now, "input", |behavior, ctx| {
                behavior.on_input_changed(ctx, slot)
            });
            if !ok {
                report.failures += 1;
            }
            writes = hook_writes;
        } else {
            tracing::debug!(
                "⏸️ Node '{}' waits for required inputs, input hook deferred",
                location.node_id
            );
            report.deferred += 1;
        }

        // Panel boundary: the value crosses over before the node's own writes
        let mut next = Vec::new();
        if let Some(output_id) = bridged {
            if let Some(write) = state.write_output(&output_id, delivery.value) {
                next.extend(deliveries_for(state, &[write], &path));
            }
        }
        next.extend(deliveries_for(state, &writes, &path));

        next.reverse();
        stack.extend(next);
    }

    report
}
