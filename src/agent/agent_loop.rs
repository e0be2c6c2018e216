//! Agent loop for the research tasks.
//!
//! This module implements both:
//! - Single-call mode: one request, JSON extracted from the reply
//! - Tool-calling mode: the model submits its answer through a validation
//!   tool and gets schema errors back until it produces a valid object

use crate::agent::prompts::{generate_information_prompt, generate_scoring_prompt};
use crate::agent::tools::{get_tool_definitions, ToolCall, ToolExecutor, FINISH_TOOL};
use crate::config::ModelConfig;
use crate::validation::{
    extract_json_object, information_schema, validate_information, validate_weights,
    weights_schema, ValidationError,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_iterations: usize,
    pub timeout_seconds: u64,
    /// Use single-call mode instead of tool-calling
    pub single_call_mode: bool,
    /// Max tool results to keep in context (sliding window)
    pub max_context_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            max_iterations: 8,
            timeout_seconds: 600,
            single_call_mode: true,
            max_context_messages: 10,
        }
    }
}

impl From<&ModelConfig> for AgentConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            ollama_url: config.ollama_url.clone(),
            model_name: config.name.clone(),
            temperature: config.temperature,
            max_iterations: config.max_iterations,
            timeout_seconds: config.timeout_seconds,
            single_call_mode: config.single_call_mode,
            ..Self::default()
        }
    }
}

/// What the agent is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentTask {
    /// Grid / network / temperature weights.
    Scoring,
    /// Sourced risk briefing.
    Information,
}

impl AgentTask {
    /// Name of the validation tool for this task.
    pub fn tool_name(&self) -> &'static str {
        match self {
            AgentTask::Scoring => "return_scores",
            AgentTask::Information => "return_information",
        }
    }

    /// JSON schema of the expected answer.
    pub fn schema(&self) -> Value {
        match self {
            AgentTask::Scoring => weights_schema(),
            AgentTask::Information => information_schema(),
        }
    }

    /// User prompt for a location.
    pub fn prompt(&self, location: &str) -> String {
        let schema = self.schema().to_string();
        match self {
            AgentTask::Scoring => generate_scoring_prompt(location, &schema),
            AgentTask::Information => generate_information_prompt(location, &schema),
        }
    }

    /// Validate a payload against this task's schema.
    pub fn check(&self, payload: &Value) -> Result<(), ValidationError> {
        match self {
            AgentTask::Scoring => validate_weights(payload).map(|_| ()),
            AgentTask::Information => validate_information(payload).map(|_| ()),
        }
    }
}

impl fmt::Display for AgentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentTask::Scoring => write!(f, "scoring"),
            AgentTask::Information => write!(f, "information"),
        }
    }
}

/// Producer of untrusted agent payloads.
#[async_trait]
pub trait Researcher: Send + Sync {
    /// Provisional weight mapping for a location.
    async fn produce_weights(&self, location: &str) -> Result<Value>;

    /// Provisional risk briefing for a location.
    async fn research_risks(&self, location: &str) -> Result<Value>;

    /// Model identifier, for report metadata.
    fn model_name(&self) -> &str;
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// The research agent, backed by an Ollama-compatible chat endpoint.
pub struct ResearchAgent {
    config: AgentConfig,
    http_client: reqwest::Client,
}

impl ResearchAgent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        info!("Initializing research agent with model {}", config.model_name);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Run one task and return the raw payload the model produced.
    pub async fn run_task(&self, task: AgentTask, location: &str) -> Result<Value> {
        if self.config.single_call_mode {
            self.run_single_call(task, location).await
        } else {
            self.run_tool_calling(task, location).await
        }
    }

    /// Single-call mode: one prompt, JSON pulled out of the answer.
    async fn run_single_call(&self, task: AgentTask, location: &str) -> Result<Value> {
        info!("Running {} task in single-call mode", task);

        let messages = vec![
            ChatMessage::new("system", SYSTEM_PROMPT),
            ChatMessage::new("user", task.prompt(location)),
        ];

        let reply = self.chat(messages, Vec::new()).await?;
        debug!("Model replied with {} chars", reply.content.len());

        // A reply without an object is a rejected payload, not a transport failure
        extract_json_object(&reply.content)
            .ok_or(ValidationError::NoPayload)
            .with_context(|| format!("Model returned no JSON object for the {} task", task))
    }

    /// Tool-calling mode: loop until the validation tool accepts a payload.
    async fn run_tool_calling(&self, task: AgentTask, location: &str) -> Result<Value> {
        info!("Running {} task in tool-calling mode", task);

        let tools: Vec<Value> = get_tool_definitions(task)
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()
            .context("Failed to encode tool definitions")?;

        let mut executor = ToolExecutor::new(task);
        let mut text_rejection: Option<ValidationError> = None;
        let mut messages = vec![
            ChatMessage::new("system", SYSTEM_PROMPT),
            ChatMessage::new("user", task.prompt(location)),
        ];

        for iteration in 0..self.config.max_iterations {
            debug!("Agent iteration {}", iteration + 1);

            let response = self.chat(messages.clone(), tools.clone()).await?;
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: response.content.clone(),
                tool_calls: response.tool_calls.clone(),
            });

            match response.tool_calls {
                Some(tool_calls) if !tool_calls.is_empty() => {
                    for tool_call in tool_calls {
                        if tool_call.function.name == FINISH_TOOL {
                            anyhow::bail!("Model gave up on the {} task", task);
                        }

                        let result = executor.execute(&tool_call);

                        if let Some(payload) = executor.take_accepted() {
                            info!("Model submitted a valid {} payload", task);
                            return Ok(payload);
                        }

                        messages.push(ChatMessage::new(
                            "tool",
                            if result.success {
                                result.output
                            } else {
                                format!("Error: {}", result.error.unwrap_or_default())
                            },
                        ));
                    }
                }
                _ => {
                    // Plain text: accept it if it already holds a valid object
                    match extract_json_object(&response.content) {
                        Some(payload) => match task.check(&payload) {
                            Ok(()) => {
                                info!("Model answered the {} task in text", task);
                                return Ok(payload);
                            }
                            Err(e) => text_rejection = Some(e),
                        },
                        None => text_rejection = Some(ValidationError::NoPayload),
                    }

                    messages.push(ChatMessage::new(
                        "user",
                        format!(
                            "Please submit your final answer with the `{}` tool.",
                            task.tool_name()
                        ),
                    ));
                }
            }

            prune_old_messages(&mut messages, self.config.max_context_messages);
        }

        warn!(
            "No valid {} payload after {} iterations",
            task, self.config.max_iterations
        );
        let message = format!(
            "Model did not submit a valid {} payload after {} iterations",
            task, self.config.max_iterations
        );

        // Keep the last validation failure so callers can report it as such
        match executor.last_rejection().cloned().or(text_rejection) {
            Some(rejection) => Err(anyhow::Error::new(rejection).context(message)),
            None => Err(anyhow::anyhow!(message)),
        }
    }

    /// Send a chat request to Ollama.
    async fn chat(&self, messages: Vec<ChatMessage>, tools: Vec<Value>) -> Result<ResponseMessage> {
        let url = format!("{}/api/chat", self.config.ollama_url);

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages,
            tools,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("Sending chat request with {} messages", request.messages.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.config.ollama_url
                    )
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat_response.message)
    }
}

#[async_trait]
impl Researcher for ResearchAgent {
    async fn produce_weights(&self, location: &str) -> Result<Value> {
        self.run_task(AgentTask::Scoring, location).await
    }

    async fn research_risks(&self, location: &str) -> Result<Value> {
        self.run_task(AgentTask::Information, location).await
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Keep the system prompt, the task prompt and the last `max` messages.
fn prune_old_messages(messages: &mut Vec<ChatMessage>, max: usize) {
    let keep_start = 2;
    let max_keep = max + keep_start;

    if messages.len() > max_keep {
        let remove_count = messages.len() - max_keep;
        messages.drain(keep_start..keep_start + remove_count);
        debug!("Pruned {} old messages to save context", remove_count);
    }
}

/// System prompt shared by both tasks
const SYSTEM_PROMPT: &str = r#"You are a site-selection analyst for data centers in France.
You research grid capacity, connectivity, climate, regulation and local opposition.
Answer with a single JSON object matching the requested schema.
Never add fields that are not in the schema."#;
