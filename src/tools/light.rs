//! Light plugin - a switchable light exposed as two tools

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use colored::Colorize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::Result;

use super::{Tool, ToolRunner};

/// Shared light state behind the `get_state` and `change_state` tools
#[derive(Debug, Clone, Default)]
pub struct LightPlugin {
    is_on: Arc<AtomicBool>,
}

impl LightPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.is_on.load(Ordering::SeqCst)
    }

    fn state(&self) -> &'static str {
        if self.is_on() { "on" } else { "off" }
    }

    /// Register both tools, sharing this plugin's state
    pub fn register(&self, runner: &mut ToolRunner) {
        runner.register(GetStateTool(self.clone()));
        runner.register(ChangeStateTool(self.clone()));
    }
}

struct GetStateTool(LightPlugin);

#[async_trait]
impl Tool for GetStateTool {
    fn name(&self) -> &str { "get_state" }
    fn description(&self) -> &str { "Gets the state of the light." }
    fn parameters(&self) -> Value { json!({"type": "object", "properties": {}}) }

    async fn execute(&self, _params: Value) -> Result<String> {
        Ok(self.0.state().to_string())
    }
}

struct ChangeStateTool(LightPlugin);

#[async_trait]
impl Tool for ChangeStateTool {
    fn name(&self) -> &str { "change_state" }
    fn description(&self) -> &str { "Changes the state of the light." }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "new_state": {
                    "type": "boolean",
                    "description": "true to switch the light on, false to switch it off"
                }
            },
            "required": ["new_state"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let new_state = params.get("new_state")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| Error::Tool("Missing 'new_state' parameter".to_string()))?;

        self.0.is_on.store(new_state, Ordering::SeqCst);
        let state = self.0.state();
        println!("{}", format!("[Light is now {}]", state).blue());
        Ok(state.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_light_tools_share_state() {
        let light = LightPlugin::new();
        let mut runner = ToolRunner::new();
        light.register(&mut runner);

        assert_eq!(runner.execute("get_state", json!({})).await.unwrap(), "off");
        assert_eq!(runner.execute("change_state", json!({"new_state": true})).await.unwrap(), "on");
        assert_eq!(runner.execute("get_state", json!({})).await.unwrap(), "on");
        assert!(light.is_on());
    }

    #[tokio::test]
    async fn test_change_state_requires_argument() {
        let light = LightPlugin::new();
        let mut runner = ToolRunner::new();
        light.register(&mut runner);

        assert!(runner.execute("change_state", json!({})).await.is_err());
    }
}
