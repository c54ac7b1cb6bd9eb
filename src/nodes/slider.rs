/// Slider node
///
/// Editor-driven numeric source bounded by `[min, max]`. The position of the
/// slider arrives as the `value` setting and is clamped into range before it is
/// written to the output.

use crate::error::{EngineError, Result};
use crate::graph::node::{Node, NodeBehavior, NodeContext};
use crate::graph::types::{DataKind, Settings};

pub const TYPE_TAG: &str = "UI/Slider";

const VALUE_OUTPUT: usize = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct SliderNode {
    name: String,
    min: i64,
    max: i64,
    value: i64,
}

impl Default for SliderNode {
    fn default() -> Self {
        Self {
            name: "Slider".to_string(),
            min: 0,
            max: 100,
            value: 0,
        }
    }
}

pub fn create() -> Node {
    Node::new(TYPE_TAG, "Slider", SliderNode::default()).with_output("Value", DataKind::Number)
}

fn parse_setting(settings: &Settings, key: &str, current: i64) -> Result<i64> {
    match settings.get(key) {
        None => Ok(current),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::invalid(format!("'{}' must be an integer, got '{}'", key, raw))),
    }
}

impl NodeBehavior for SliderNode {
    fn settings(&self) -> Settings {
        Settings::from([
            ("name".to_string(), self.name.clone()),
            ("min".to_string(), self.min.to_string()),
            ("max".to_string(), self.max.to_string()),
            ("value".to_string(), self.value.to_string()),
        ])
    }

    fn apply_settings(&mut self, settings: &Settings, ctx: &mut NodeContext<'_>) -> Result<()> {
        let min = parse_setting(settings, "min", self.min)?;
        let max = parse_setting(settings, "max", self.max)?;
        if min >= max {
            return Err(EngineError::invalid(format!(
                "Min must be less than Max (min: {}, max: {})",
                min, max
            )));
        }
        let value = parse_setting(settings, "value", self.value)?.clamp(min, max);

        if let Some(name) = settings.get("name") {
            self.name = name.clone();
        }
        self.min = min;
        self.max = max;
        self.value = value;

        let text = value.to_string();
        if ctx.output_value(VALUE_OUTPUT) != Some(text.as_str()) {
            ctx.set_output(VALUE_OUTPUT, Some(text))
                .map_err(|e| EngineError::invalid(e.to_string()))?;
        }

        Ok(())
    }
}
