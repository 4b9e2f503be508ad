//! Decides which tools a task needs and which of them already exist.

use std::collections::HashSet;
use std::sync::Arc;

use crate::agent::state::MAX_REQUIRED_TOOLS;
use crate::error::RegistryError;
use crate::llm::{LlmProvider, complete_prompt, extract};
use crate::prompts;
use crate::tools::{RegistryEntry, ToolKind, ToolRegistry, ToolRequirement, find_match};

pub struct RequirementResolver {
    llm: Arc<dyn LlmProvider>,
    registry: ToolRegistry,
    temperature: f32,
}

impl RequirementResolver {
    pub fn new(llm: Arc<dyn LlmProvider>, registry: ToolRegistry, temperature: f32) -> Self {
        Self {
            llm,
            registry,
            temperature,
        }
    }

    /// Ask the model for the tools `subtasks` need and mark the ones the
    /// registry already holds as available.
    ///
    /// Model failures and unparsable replies resolve to no tools. Only a
    /// registry read failure is an error.
    pub async fn resolve(
        &self,
        query: &str,
        subtasks: &[String],
    ) -> Result<Vec<ToolRequirement>, RegistryError> {
        let prompt = prompts::tool_planning_request(query, subtasks);
        let specs = match complete_prompt(
            self.llm.as_ref(),
            Some(prompts::TOOL_PLANNER),
            &prompt,
            self.temperature,
        )
        .await
        {
            Ok(response) => parse_tool_specs(&response),
            Err(e) => {
                tracing::warn!("Tool planning failed, assuming no tools are needed: {}", e);
                Vec::new()
            }
        };

        let mut tools = prioritize(dedupe(specs));
        let entries = self.registry.load()?;
        attach_registry_code(&mut tools, &entries);

        tracing::info!(
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            available = tools.iter().filter(|t| t.is_available).count(),
            "Resolved required tools"
        );
        Ok(tools)
    }

    /// Re-check unavailable tools against the registry.
    pub fn refresh(&self, tools: &mut [ToolRequirement]) -> Result<(), RegistryError> {
        if tools.iter().all(|t| t.is_available) {
            return Ok(());
        }
        let entries = self.registry.load()?;
        attach_registry_code(tools, &entries);
        Ok(())
    }
}

/// Read `{name, description, kind?}` objects out of the model reply.
pub fn parse_tool_specs(response: &str) -> Vec<ToolRequirement> {
    let Some(serde_json::Value::Array(items)) = extract::json_array(response) else {
        tracing::debug!("No tool list found in planner reply");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let description = item
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .trim();
            let mut tool = ToolRequirement::new(name, description);
            if let Some(kind) = item
                .get("kind")
                .and_then(|k| k.as_str())
                .and_then(|k| k.parse::<ToolKind>().ok())
            {
                tool = tool.with_kind(kind);
            }
            Some(tool)
        })
        .collect()
}

/// Drop repeated names, keeping the first occurrence.
fn dedupe(tools: Vec<ToolRequirement>) -> Vec<ToolRequirement> {
    let mut seen = HashSet::new();
    tools
        .into_iter()
        .filter(|t| {
            let fresh = seen.insert(t.name.clone());
            if !fresh {
                tracing::debug!(tool = %t.name, "Dropping duplicate tool");
            }
            fresh
        })
        .collect()
}

/// Cap the list, keeping API tools first, then visualization, then the rest.
fn prioritize(mut tools: Vec<ToolRequirement>) -> Vec<ToolRequirement> {
    if tools.len() > MAX_REQUIRED_TOOLS {
        tools.sort_by_key(|t| t.kind.priority());
        tools.truncate(MAX_REQUIRED_TOOLS);
    }
    tools
}

fn attach_registry_code(tools: &mut [ToolRequirement], entries: &[RegistryEntry]) {
    for tool in tools.iter_mut().filter(|t| !t.is_available) {
        if let Some(entry) = find_match(entries, &tool.name, &tool.description) {
            tracing::info!(tool = %tool.name, entry = %entry.name, "Found tool in registry");
            tool.make_available(entry.function.clone());
        }
    }
}
