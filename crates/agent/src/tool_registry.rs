//! Tool registry used by the turn controller to list and look up tools.

use std::collections::HashMap;
use std::sync::Arc;

use proto::{ToolDescriptor, ToolError};
use tools::Tool;
use tracing::debug;

/// Registry of available tools, read-only once the runtime is built.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), ToolError> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        debug!("Registering tool: {name}");
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Tool descriptors for the LLM, in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor().clone()).collect()
    }

    /// Returns the list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use proto::{ParamType, ToolArguments};

    use super::*;

    struct EchoTool {
        descriptor: ToolDescriptor,
    }

    impl EchoTool {
        fn named(name: &str) -> Self {
            Self {
                descriptor: ToolDescriptor::new(name, "Echoes the input").required(
                    "value",
                    ParamType::String,
                    "text to echo",
                ),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, args: &ToolArguments) -> String {
            args.str("value").unwrap_or_default().to_string()
        }
    }

    #[tokio::test]
    async fn register_and_lookup_known_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool::named("echo")).expect("register");

        let tool = registry.lookup("echo").expect("registered");
        let args = ToolArguments::parse(r#"{"value":"hello"}"#).expect("args");
        assert_eq!(tool.execute(&args).await, "hello");
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool::named("echo")).expect("register");
        assert!(registry.lookup("Echo").is_none());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool::named("echo")).expect("register");
        let err = registry
            .register(EchoTool::named("echo"))
            .expect_err("duplicate");
        assert!(matches!(err, ToolError::Duplicate(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn descriptors_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(EchoTool::named(name)).expect("register");
        }

        assert_eq!(registry.tool_names(), vec!["zeta", "alpha", "mid"]);
        let defs = registry.descriptors();
        assert_eq!(defs[1].name, "alpha");
        assert_eq!(defs[1].description, "Echoes the input");
        assert_eq!(defs[1].required, vec!["value"]);
    }
}
