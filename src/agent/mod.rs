//! LLM research agent.
//!
//! The agent produces the weighting judgment and the sourced risk briefing
//! for a location. Its output is untrusted and is validated by the caller.

pub mod agent_loop;
pub mod prompts;
pub mod tools;

pub use agent_loop::{AgentConfig, ResearchAgent, Researcher};
