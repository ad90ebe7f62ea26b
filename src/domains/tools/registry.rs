//! Tool Registry - routing table of worker-declared tools.
//!
//! This module provides:
//! - Declaration and removal of tools under one coarse lock
//! - A route lookup used for every tool call
//! - Tool metadata for `tools/list`
//!
//! The lock only ever guards map access. Routes are handed out as `Arc`s so a
//! call in flight keeps its route even if the tool is removed meanwhile.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rmcp::model::Tool;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::definition::ToolDefinition;

// ============================================================================
// Routes
// ============================================================================

/// Invocation descriptor for one declared tool.
#[derive(Debug, Clone)]
pub struct ToolRoute {
    /// The definition as declared.
    pub definition: ToolDefinition,

    /// The MCP model advertised to clients, built at declaration time.
    pub tool: Tool,

    /// When this version of the tool was declared.
    pub declared_at: DateTime<Utc>,
}

impl ToolRoute {
    /// The tool name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

// ============================================================================
// Declaration outcome
// ============================================================================

/// A definition that was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedTool {
    pub name: String,
    pub reason: String,
}

/// Result of a declaration batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclareOutcome {
    /// Names that did not exist before.
    pub registered: Vec<String>,

    /// Names that replaced an existing definition.
    pub updated: Vec<String>,

    /// Definitions skipped because they were malformed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedTool>,
}

impl DeclareOutcome {
    /// Whether the advertised tool set changed.
    pub fn changed(&self) -> bool {
        !self.registered.is_empty() || !self.updated.is_empty()
    }

    /// Record a definition rejected before it reached the registry.
    pub fn reject(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.rejected.push(RejectedTool {
            name: name.into(),
            reason: reason.into(),
        });
    }
}

// ============================================================================
// Tool Registry
// ============================================================================

/// Tool registry - manages all worker-declared tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    routes: RwLock<HashMap<String, Arc<ToolRoute>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a batch of tools.
    ///
    /// Each definition is handled on its own: a malformed entry is reported in
    /// `rejected` and does not prevent the others from being installed. A name
    /// that already exists is an update and the last writer wins.
    pub fn declare(&self, definitions: Vec<ToolDefinition>) -> DeclareOutcome {
        let mut outcome = DeclareOutcome::default();
        let mut routes = self.routes.write();

        for definition in definitions {
            let tool = match definition.to_tool() {
                Ok(tool) => tool,
                Err(e) => {
                    warn!("Rejected tool definition: {}", e);
                    outcome.reject(definition.name.clone(), e.to_string());
                    continue;
                }
            };

            let name = definition.name.clone();
            let route = Arc::new(ToolRoute {
                definition,
                tool,
                declared_at: Utc::now(),
            });

            let existed = routes.insert(name.clone(), route).is_some();
            info!(tool = %name, updated = existed, "Tool registered");

            if existed {
                outcome.updated.push(name);
            } else {
                outcome.registered.push(name);
            }
        }

        outcome
    }

    /// Remove tools by name. Unknown names are ignored.
    ///
    /// Returns the names that were actually removed.
    pub fn remove(&self, names: &[String]) -> Vec<String> {
        let mut routes = self.routes.write();

        names
            .iter()
            .filter(|name| routes.remove(name.as_str()).is_some())
            .inspect(|name| info!(tool = %name, "Tool removed"))
            .cloned()
            .collect()
    }

    /// Look up the route for a tool.
    pub fn route(&self, name: &str) -> Option<Arc<ToolRoute>> {
        self.routes.read().get(name).cloned()
    }

    /// Whether a tool is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.routes.read().contains_key(name)
    }

    /// Get all tools as Tool models, sorted by name.
    pub fn list(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self
            .routes
            .read()
            .values()
            .map(|route| route.tool.clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get all tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of declared tools.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no tools are declared.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
