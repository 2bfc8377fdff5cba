//! Assistant Conversation Messages
//!
//! Message types exchanged with the assistant backend. A conversation is a
//! list of [`ConversationMessage`]s, each holding typed content blocks.
//!
//! # Content Blocks
//!
//! Blocks are discriminated by a `type` field:
//!
//! ```text
//! {"type": "text",        "text": "..."}
//! {"type": "tool_use",    "id": "...", "name": "...", "input": {...}}
//! {"type": "tool_result", "tool_use_id": "...", "content": [{"type": "text", "text": "..."}]}
//! ```
//!
//! Any other `type` decodes as [`ContentBlock::Unsupported`] so one unknown
//! block does not cost the rest of the message. Unsupported blocks are never
//! recorded or sent.

use serde::{Deserialize, Serialize};

/// Who authored a conversation message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The gateway, on behalf of the person speaking
    #[serde(alias = "USER")]
    User,
    /// The assistant backend
    #[serde(alias = "ASSISTANT")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Text sub-block of a tool result
///
/// Only text survives into a tool result; other sub-block types are dropped
/// during decoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "text")]
pub struct ToolResultText {
    /// Result text
    pub text: String,
}

impl ToolResultText {
    /// Create a text sub-block
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Result standing in for a tool call that could not be executed
    #[must_use]
    pub fn execution_failed(tool_name: &str) -> Self {
        Self::new(format!("Tool {tool_name} could not be executed"))
    }
}

/// One block of message content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
    /// Request from the assistant to execute a tool
    ToolUse {
        /// Identifier the matching result must reference
        id: String,
        /// Tool name
        name: String,
        /// Tool arguments
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Result of a tool execution
    ToolResult {
        /// Identifier of the tool use this answers
        tool_use_id: String,
        /// Result sub-blocks
        #[serde(default)]
        content: Vec<ToolResultText>,
    },
    /// A block type the gateway does not handle
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    /// Text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Tool result block answering `tool_use_id`
    pub fn tool_result(tool_use_id: impl Into<String>, content: Vec<ToolResultText>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
        }
    }

    /// Whether this is a tool use request
    #[must_use]
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }

    /// Whether the gateway understands this block
    #[must_use]
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// A message in the assistant conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Author
    pub role: Role,
    /// Content blocks, in order
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl ConversationMessage {
    /// User message holding a single text block
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Assistant message with the given blocks
    #[must_use]
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Whether any block is a tool use request
    #[must_use]
    pub fn has_tool_use(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_use)
    }
}

/// Completion request sent to the assistant backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full conversation history
    pub messages: Vec<ConversationMessage>,
    /// Sampling randomness
    pub randomness: f32,
    /// System prompt
    pub sys_prompt: String,
    /// Whether the backend may answer with tool use requests
    pub use_tools: bool,
}
