/// Delayed value node
///
/// Re-emits every value it receives after a configurable delay. Arriving values
/// are queued with their arrival time; each tick releases at most one value,
/// the oldest one that has waited at least the current interval.
///
/// The queue has no capacity bound. If values arrive faster than one per tick
/// it grows without limit; there is deliberately no back-pressure here.

use crate::graph::node::{Node, NodeBehavior, NodeContext};
use crate::graph::types::DataKind;
use std::collections::VecDeque;
use std::time::Duration;

pub const TYPE_TAG: &str = "Time/DelayedValue";

/// Interval used until the `Interval` input says otherwise, in milliseconds
pub const DEFAULT_INTERVAL_MS: f64 = 1000.0;

/// Requested intervals below this are raised to it
pub const MIN_INTERVAL_MS: f64 = 1.0;

const VALUE_INPUT: usize = 0;
const INTERVAL_INPUT: usize = 1;
const VALUE_OUTPUT: usize = 0;

#[derive(Debug, Clone)]
struct DelayedEntry {
    value: Option<String>,
    arrival: Duration,
}

/// Behavior behind `Time/DelayedValue`
#[derive(Debug)]
pub struct DelayedValueNode {
    interval_ms: f64,
    queue: VecDeque<DelayedEntry>,
}

impl Default for DelayedValueNode {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            queue: VecDeque::new(),
        }
    }
}

/// Build a delayed value node with its ports declared
///
/// The output is labelled Logical although it carries whatever came in on
/// `Value` unchanged.
pub fn create() -> Node {
    Node::new(TYPE_TAG, "Delayed Value", DelayedValueNode::default())
        .with_input("Value", DataKind::Number)
        .with_optional_input("Interval", DataKind::Number)
        .with_output("Value", DataKind::Logical)
}

impl DelayedValueNode {
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Number of values still waiting
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Absent resets to the default; unparseable text counts as 0 and is clamped
    fn set_interval(&mut self, raw: Option<&str>) {
        let requested = match raw {
            None => DEFAULT_INTERVAL_MS,
            Some(text) => text.trim().parse::<f64>().unwrap_or(0.0),
        };

        // Also catches NaN
        self.interval_ms = if requested >= MIN_INTERVAL_MS {
            requested
        } else {
            MIN_INTERVAL_MS
        };
    }

    /// Follow the `Interval` input, which may change while `Value` is still empty
    fn sync_interval(&mut self, ctx: &NodeContext<'_>) {
        let previous = self.interval_ms;
        self.set_interval(ctx.input_value(INTERVAL_INPUT));
        if self.interval_ms != previous {
            tracing::info!(
                "⏱️ Node '{}': interval changed to {} ms",
                ctx.node_id(),
                self.interval_ms
            );
        }
    }
}

fn age_ms(now: Duration, arrival: Duration) -> f64 {
    now.saturating_sub(arrival).as_nanos() as f64 / 1_000_000.0
}

impl NodeBehavior for DelayedValueNode {
    fn on_tick(&mut self, ctx: &mut NodeContext<'_>) -> anyhow::Result<()> {
        self.sync_interval(ctx);
        let now = ctx.now();
        let due = self
            .queue
            .iter()
            .position(|entry| age_ms(now, entry.arrival) >= self.interval_ms);

        if let Some(entry) = due.and_then(|index| self.queue.remove(index)) {
            ctx.set_output(VALUE_OUTPUT, entry.value)?;
        }

        Ok(())
    }

    fn on_input_changed(&mut self, ctx: &mut NodeContext<'_>, slot: usize) -> anyhow::Result<()> {
        self.sync_interval(ctx);
        if slot == VALUE_INPUT {
            self.queue.push_back(DelayedEntry {
                value: ctx.input_value(VALUE_INPUT).map(str::to_string),
                arrival: ctx.now(),
            });
        }

        Ok(())
    }
}
