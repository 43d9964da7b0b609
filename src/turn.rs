//! Turn Framework Contract
//!
//! Types the surrounding agent framework supplies to the session layer:
//! the per-turn state bag, the tool-definition shape, and the integration
//! tool catalog. The framework invokes the three session hooks in a fixed
//! order — turn start, each model call, each tool call — and everything
//! here is plain data it threads through those calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::manifest::IntegrationName;
use crate::resolver::SessionSnapshot;

/// Tool definition as advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Tool with an empty object schema, enough for most tests and stubs
    pub fn named(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

/// Mutable per-turn state bag owned by the turn framework
#[derive(Debug, Default)]
pub struct TurnContext {
    /// Skill slugs the operator selected for this turn (raw, unvalidated)
    pub selected_skills: Vec<String>,
    /// Mutable system prompt; the session layer appends to it exactly once
    pub system_prompt: String,
    /// Resolved at turn start, never recomputed mid-turn
    pub snapshot: Option<SessionSnapshot>,
    /// Explicit single-injection guard — set by the injecting step, never
    /// inferred by scanning rendered text
    pub skills_prompt_injected: bool,
    /// Accumulated file-read tool-call history (activation is recomputed
    /// from this on every model call)
    pub file_reads: Vec<String>,
}

impl TurnContext {
    pub fn new(selected_skills: Vec<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            selected_skills,
            system_prompt: system_prompt.into(),
            snapshot: None,
            skills_prompt_injected: false,
            file_reads: Vec::new(),
        }
    }
}

/// On-demand provider of integration tool catalogs
#[async_trait]
pub trait IntegrationRegistry: Send + Sync {
    /// Tools contributed by one integration. Failures are isolated by the
    /// caller; one integration failing never blocks the others.
    async fn tools_for(&self, integration: &IntegrationName)
        -> anyhow::Result<Vec<ToolDefinition>>;
}

/// Fixed in-process integration catalog
#[derive(Debug, Default)]
pub struct StaticIntegrationRegistry {
    catalogs: HashMap<String, Vec<ToolDefinition>>,
}

impl StaticIntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, integration: &str, tools: Vec<ToolDefinition>) {
        self.catalogs.insert(integration.to_string(), tools);
    }
}

#[async_trait]
impl IntegrationRegistry for StaticIntegrationRegistry {
    async fn tools_for(
        &self,
        integration: &IntegrationName,
    ) -> anyhow::Result<Vec<ToolDefinition>> {
        self.catalogs
            .get(integration.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("integration '{}' is not configured", integration))
    }
}
