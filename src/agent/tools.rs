//! Tool definitions for the research agent.
//!
//! The model submits its final answer through a validation tool. The
//! executor checks the payload against the task schema and reports schema
//! errors back so the model can correct itself.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::agent_loop::AgentTask;
use crate::validation::ValidationError;

/// Tool definition for Ollama's tool-calling API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call made by the LLM, echoed back in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
        }
    }
}

/// Name of the tool that ends a run without an answer.
pub const FINISH_TOOL: &str = "finish";

/// Executes tool calls for one agent task.
pub struct ToolExecutor {
    task: AgentTask,
    /// Last payload that passed validation.
    accepted: Option<Value>,
    /// Why the last submission was rejected.
    rejected: Option<ValidationError>,
}

impl ToolExecutor {
    pub fn new(task: AgentTask) -> Self {
        Self {
            task,
            accepted: None,
            rejected: None,
        }
    }

    /// The validated payload, once the model has submitted one.
    pub fn take_accepted(&mut self) -> Option<Value> {
        self.accepted.take()
    }

    /// The most recent validation failure, if any submission was rejected.
    pub fn last_rejection(&self) -> Option<&ValidationError> {
        self.rejected.as_ref()
    }

    /// Execute a tool call and return the result.
    pub fn execute(&mut self, tool_call: &ToolCall) -> ToolResult {
        let name = &tool_call.function.name;
        let args = &tool_call.function.arguments;

        debug!("Executing tool: {} with args: {:?}", name, args);

        match name.as_str() {
            n if n == self.task.tool_name() => self.submit(args),
            _ => ToolResult::error(format!("Unknown tool: {}", name)),
        }
    }

    /// Validate a submitted answer.
    fn submit(&mut self, args: &Value) -> ToolResult {
        // Some models wrap the object in a "payload" argument.
        let payload = match args.get("payload") {
            Some(inner) if inner.is_object() => inner,
            _ => args,
        };

        match self.task.check(payload) {
            Ok(()) => {
                self.accepted = Some(payload.clone());
                ToolResult::success(payload.to_string())
            }
            Err(e) => {
                let result = ToolResult::error(e.to_string());
                self.rejected = Some(e);
                result
            }
        }
    }
}

/// Get the tool definitions for a task.
pub fn get_tool_definitions(task: AgentTask) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: task.tool_name().to_string(),
                description: format!(
                    "Validate and return the final {} object. Call this once with your final answer.",
                    task
                ),
                parameters: task.schema(),
            },
        },
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: FINISH_TOOL.to_string(),
                description: "Call this only if you cannot produce an answer.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            function: FunctionCall {
                name: name.to_string(),
                arguments,
            },
        }
    }

    #[test]
    fn test_submit_valid_weights() {
        let mut executor = ToolExecutor::new(AgentTask::Scoring);
        let result = executor.execute(&call(
            "return_scores",
            json!({"score_grid": 0.5, "score_network": 0.25, "score_temperature": 0.25}),
        ));

        assert!(result.success);
        assert_eq!(executor.take_accepted().unwrap()["score_grid"], 0.5);
    }

    #[test]
    fn test_submit_wrapped_payload() {
        let mut executor = ToolExecutor::new(AgentTask::Scoring);
        let result = executor.execute(&call(
            "return_scores",
            json!({"payload": {"score_grid": 1.0, "score_network": 0.0, "score_temperature": 0.0}}),
        ));

        assert!(result.success);
        assert!(executor.take_accepted().is_some());
        assert!(executor.take_accepted().is_none());
    }

    #[test]
    fn test_submit_invalid_weights_reports_error() {
        let mut executor = ToolExecutor::new(AgentTask::Scoring);
        let result = executor.execute(&call(
            "return_scores",
            json!({"score_grid": 0.9, "score_network": 0.9, "score_temperature": 0.9}),
        ));

        assert!(!result.success);
        assert!(result.error.unwrap().contains("sum"));
        assert!(executor.take_accepted().is_none());
        assert!(matches!(
            executor.last_rejection(),
            Some(ValidationError::Sum { .. })
        ));
    }

    #[test]
    fn test_wrong_task_tool_is_unknown() {
        let mut executor = ToolExecutor::new(AgentTask::Information);
        let result = executor.execute(&call("return_scores", json!({})));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
    }

    #[test]
    fn test_submit_information() {
        let mut executor = ToolExecutor::new(AgentTask::Information);
        let result = executor.execute(&call(
            "return_information",
            json!({
                "legislation": ["ICPE authorisation required above 1 MW backup generation"],
                "construction_opposition": [],
                "environmental_challenges": []
            }),
        ));
        assert!(result.success);
    }

    #[test]
    fn test_tool_definitions() {
        let tools = get_tool_definitions(AgentTask::Scoring);
        assert_eq!(tools.len(), 2);

        let names: Vec<_> = tools.iter().map(|t| t.function.name.as_str()).collect();
        assert!(names.contains(&"return_scores"));
        assert!(names.contains(&"finish"));
        assert_eq!(
            tools[0].function.parameters["required"],
            json!(["score_grid", "score_network", "score_temperature"])
        );
    }
}
