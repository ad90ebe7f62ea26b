//! Tools domain module.
//!
//! Tools are not implemented here. Workers declare them over the control plane
//! and execute them when called; this domain keeps the routing table and the
//! content model that travels back from workers.
//!
//! ## Architecture
//!
//! - `definition.rs` - Declared tool definitions and their MCP model
//! - `registry.rs` - Routing table from tool name to invocation descriptor
//! - `content.rs` - Worker content items and rendering into MCP content
//! - `error.rs` - Tool-specific error types

mod content;
mod definition;
mod error;
mod registry;

pub use content::{ContentItem, RenderPolicy, render_result};
pub use definition::ToolDefinition;
pub use error::ToolError;
pub use registry::{DeclareOutcome, RejectedTool, ToolRegistry, ToolRoute};
