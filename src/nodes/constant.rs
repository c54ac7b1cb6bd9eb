/// Constant node: outputs whatever text was configured in the editor

use crate::error::{EngineError, Result};
use crate::graph::node::{Node, NodeBehavior, NodeContext};
use crate::graph::types::{DataKind, Settings};

pub const TYPE_TAG: &str = "Basic/Constant";

const VALUE_OUTPUT: usize = 0;

#[derive(Debug, Default)]
pub struct ConstantNode {
    value: Option<String>,
}

pub fn create() -> Node {
    Node::new(TYPE_TAG, "Constant", ConstantNode::default()).with_output("Value", DataKind::Text)
}

impl NodeBehavior for ConstantNode {
    fn settings(&self) -> Settings {
        self.value
            .iter()
            .map(|value| ("value".to_string(), value.clone()))
            .collect()
    }

    /// Setting `value` writes it straight to the output
    fn apply_settings(&mut self, settings: &Settings, ctx: &mut NodeContext<'_>) -> Result<()> {
        let value = settings
            .get("value")
            .ok_or_else(|| EngineError::invalid("Constant requires a 'value' setting"))?;

        self.value = Some(value.clone());
        ctx.set_output(VALUE_OUTPUT, Some(value.clone()))
            .map_err(|e| EngineError::invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_apply_settings_sets_output() {
        let mut node = create();
        let settings = Settings::from([("value".to_string(), "on".to_string())]);

        let (writes, result) = node.run_hook(Duration::ZERO, |behavior, ctx| {
            behavior.apply_settings(&settings, ctx)
        });

        result.unwrap().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(node.outputs()[0].value.as_deref(), Some("on"));
        assert_eq!(node.settings(), settings);
    }

    #[test]
    fn test_missing_value_rejected() {
        let mut node = create();
        let (writes, result) = node.run_hook(Duration::ZERO, |behavior, ctx| {
            behavior.apply_settings(&Settings::new(), ctx)
        });

        assert!(matches!(result.unwrap(), Err(EngineError::ValidationFailed(_))));
        assert!(writes.is_empty());
        assert!(node.settings().is_empty());
    }
}
