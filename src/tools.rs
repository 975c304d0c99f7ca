use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

/// Function-calling schema declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {name} failed: {message}")]
    Failed { name: String, message: String },
}

pub trait Tool: Send + Sync {
    fn declaration(&self) -> FunctionDeclaration;

    fn call(&self, args: &Value) -> Result<Value, ToolError>;

    fn matches(&self, name: &str) -> bool {
        self.declaration().name == name
    }
}

/// Mock weather lookup. Always reports 23C.
pub fn get_current_weather(location: &str) -> &'static str {
    info!(location, "get_current_weather called");
    "23C"
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherTool;

impl Tool for WeatherTool {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: "get_current_weather".to_string(),
            description: "Get the current weather in a given location.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g. San Francisco, CA"
                    },
                    "unit": {
                        "type": "string",
                        "enum": ["celsius", "fahrenheit"],
                        "description": "Temperature unit"
                    }
                },
                "required": ["location"]
            }),
        }
    }

    fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let location = args.get("location").and_then(Value::as_str).unwrap_or_default();
        Ok(Value::String(get_current_weather(location).to_string()))
    }
}

/// Tools available to the model, in declaration order.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.iter().map(|tool| tool.declaration()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.matches(name))
    }

    pub fn dispatch(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        self.find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?
            .call(args)
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.tools.iter().map(|t| t.declaration().name).collect();
        f.debug_struct("Toolbox").field("tools", &names).finish()
    }
}
