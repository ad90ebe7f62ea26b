//! Content returned by workers for a tool call, and its rendering into MCP content.
//!
//! Workers send a flat `{type, text, data, uri, mimeType}` object per item.
//! Decoding never fails on the `type` tag: anything unrecognised is kept as
//! [`ContentItem::Unknown`] and rendered through its `text` field.

use base64::Engine;
use rmcp::model::{CallToolResult, Content, ResourceContents};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One content item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireContent", into = "WireContent")]
pub enum ContentItem {
    /// Plain text.
    Text { text: String },

    /// Base64 encoded image data.
    Image { data: String, mime_type: String },

    /// A resource reference. URI and MIME type are preserved even when the
    /// active rendering policy flattens the item to text.
    Resource {
        uri: Option<String>,
        mime_type: Option<String>,
        text: String,
    },

    /// A content type this bridge does not know about.
    Unknown { kind: String, text: String },
}

/// Flat wire representation used by workers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
}

impl From<WireContent> for ContentItem {
    fn from(wire: WireContent) -> Self {
        match wire.kind.as_str() {
            "text" => Self::Text {
                text: wire.text.unwrap_or_default(),
            },
            "image" => Self::Image {
                data: wire.data.unwrap_or_default(),
                mime_type: wire.mime_type.unwrap_or_default(),
            },
            "resource" => Self::Resource {
                uri: wire.uri,
                mime_type: wire.mime_type,
                text: wire.text.unwrap_or_default(),
            },
            _ => Self::Unknown {
                kind: wire.kind,
                text: wire.text.unwrap_or_default(),
            },
        }
    }
}

impl From<ContentItem> for WireContent {
    fn from(item: ContentItem) -> Self {
        match item {
            ContentItem::Text { text } => Self {
                kind: "text".into(),
                text: Some(text),
                ..Default::default()
            },
            ContentItem::Image { data, mime_type } => Self {
                kind: "image".into(),
                data: Some(data),
                mime_type: Some(mime_type),
                ..Default::default()
            },
            ContentItem::Resource {
                uri,
                mime_type,
                text,
            } => Self {
                kind: "resource".into(),
                text: Some(text),
                uri,
                mime_type,
                ..Default::default()
            },
            ContentItem::Unknown { kind, text } => Self {
                kind,
                text: Some(text),
                ..Default::default()
            },
        }
    }
}

/// How worker content is turned into MCP content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderPolicy {
    /// Render resources with a URI as embedded resources instead of text.
    pub embed_resources: bool,
}

impl ContentItem {
    /// Create a text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The type tag of this item.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Resource { .. } => "resource",
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Render into MCP content.
    pub fn render(&self, policy: RenderPolicy) -> Content {
        match self {
            Self::Text { text } => Content::text(text.clone()),
            Self::Image { data, mime_type } => {
                if base64::engine::general_purpose::STANDARD.decode(data).is_ok() {
                    Content::image(data.clone(), mime_type.clone())
                } else {
                    warn!(mime_type = %mime_type, "Worker returned image content that is not valid base64");
                    Content::text(format!("[invalid image content: {}]", mime_type))
                }
            }
            Self::Resource {
                uri: Some(uri),
                mime_type,
                text,
            } if policy.embed_resources => {
                Content::resource(ResourceContents::TextResourceContents {
                    uri: uri.clone(),
                    mime_type: mime_type.clone(),
                    text: text.clone(),
                    meta: None,
                })
            }
            Self::Resource { text, .. } => Content::text(text.clone()),
            Self::Unknown { text, .. } => Content::text(text.clone()),
        }
    }
}

/// Render a worker tool response into an MCP call result.
///
/// `is_error` is carried through as a tool-level error, never as a failure of
/// the call itself.
pub fn render_result(items: &[ContentItem], is_error: bool, policy: RenderPolicy) -> CallToolResult {
    let content = items.iter().map(|item| item.render(policy)).collect();
    if is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}
