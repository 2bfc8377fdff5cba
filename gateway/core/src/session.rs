//! Conversation Session
//!
//! Holds the state of one assistant conversation: the message history, the
//! tool call currently being executed, the calls still queued behind it and
//! the results collected so far for the current assistant turn.
//!
//! The session is a pure state machine. It decides what should happen next
//! and the conversation manager performs the I/O.
//!
//! # Tool-use protocol
//!
//! ```text
//!   assistant message [text, tool_use A, tool_use B]
//!     -> execute A            (outstanding = A, queue = [B])
//!   result for A
//!     -> execute B            (outstanding = B, collected = [A])
//!   result for B
//!     -> user message [tool_result A, tool_result B], follow-up completion
//! ```
//!
//! At most one tool call is outstanding at any time.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{ContentBlock, ConversationMessage, Role, ToolResultText};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message that breaks the conversation protocol; the unit is discarded
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A reply to a completion request was not authored by the assistant
    #[error("expected an assistant message, got role {0}")]
    UnexpectedRole(Role),

    /// An assistant message arrived while a tool call was still unresolved
    #[error("tool call {0} is still outstanding")]
    ToolCallOutstanding(String),

    /// A tool result arrived with no tool call outstanding
    #[error("tool result received with no outstanding tool call")]
    NoOutstandingToolCall,
}

/// A tool call waiting to be executed
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    /// Tool use identifier issued by the assistant
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool arguments
    pub input: serde_json::Value,
}

/// What an accepted assistant message asks the gateway to do
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantTurn {
    /// Text blocks, in order
    pub texts: Vec<String>,
    /// Names of every requested tool, in order
    pub tool_names: Vec<String>,
    /// Tool call to execute now
    pub execute: Option<ToolCall>,
}

impl AssistantTurn {
    /// Whether the message requested any tool
    #[must_use]
    pub fn has_tool_use(&self) -> bool {
        !self.tool_names.is_empty()
    }
}

/// Next step after a tool result was recorded
#[derive(Clone, Debug, PartialEq)]
pub enum ToolStep {
    /// Execute the next queued tool call
    Execute(ToolCall),
    /// All calls resolved; results were appended, request a follow-up
    Complete,
}

/// How a new utterance compares with the previous one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UtteranceCheck {
    /// Nothing to say
    Empty,
    /// Same as the previous utterance
    Duplicate,
    /// New utterance
    Fresh,
}

/// One assistant conversation
#[derive(Clone, Debug)]
pub struct ConversationSession {
    id: SessionId,
    created_at: DateTime<Utc>,
    history: Vec<ConversationMessage>,
    outstanding: Option<String>,
    queued: VecDeque<ToolCall>,
    collected: Vec<ContentBlock>,
    last_utterance: Option<String>,
    max_messages: usize,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    /// Create an empty session with unlimited history
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_messages(0)
    }

    /// Create an empty session keeping at most `max_messages` (0 = unlimited)
    #[must_use]
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            history: Vec::new(),
            outstanding: None,
            queued: VecDeque::new(),
            collected: Vec::new(),
            last_utterance: None,
            max_messages,
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// When the session was created
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Conversation history
    #[must_use]
    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    /// Identifier of the unresolved tool call, if any
    #[must_use]
    pub fn outstanding_tool(&self) -> Option<&str> {
        self.outstanding.as_deref()
    }

    /// Number of tool calls waiting behind the outstanding one
    #[must_use]
    pub fn queued_tools(&self) -> usize {
        self.queued.len()
    }

    /// Last utterance seen from the speech sensor
    #[must_use]
    pub fn last_utterance(&self) -> Option<&str> {
        self.last_utterance.as_deref()
    }

    /// Compare an utterance with the previous one and remember it
    pub fn check_utterance(&mut self, text: &str) -> UtteranceCheck {
        if text.trim().is_empty() {
            return UtteranceCheck::Empty;
        }
        if self.last_utterance.as_deref() == Some(text) {
            return UtteranceCheck::Duplicate;
        }
        self.last_utterance = Some(text.to_string());
        UtteranceCheck::Fresh
    }

    /// Append a user text message
    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.history.push(ConversationMessage::user_text(text));
        self.prune_if_needed();
    }

    /// Accept an assistant message
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] if the message is not from the assistant
    /// or a tool call is still unresolved. The message is not recorded.
    pub fn accept_assistant(
        &mut self,
        mut message: ConversationMessage,
    ) -> Result<AssistantTurn, ProtocolViolation> {
        if message.role != Role::Assistant {
            return Err(ProtocolViolation::UnexpectedRole(message.role));
        }
        if let Some(ref id) = self.outstanding {
            return Err(ProtocolViolation::ToolCallOutstanding(id.clone()));
        }

        let mut turn = AssistantTurn::default();
        let mut unsupported = 0usize;
        let queued = &mut self.queued;
        message.content.retain(|block| match block {
            ContentBlock::Text { text } => {
                turn.texts.push(text.clone());
                true
            }
            ContentBlock::ToolUse { id, name, input } => {
                turn.tool_names.push(name.clone());
                queued.push_back(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
                true
            }
            ContentBlock::ToolResult { tool_use_id, .. } => {
                tracing::warn!(tool_use_id = %tool_use_id, "Ignoring tool_result block in assistant message");
                true
            }
            ContentBlock::Unsupported => {
                unsupported += 1;
                false
            }
        });
        if unsupported > 0 {
            tracing::warn!(session = %self.id, dropped = unsupported, "Skipping unsupported content blocks");
        }

        self.history.push(message);
        self.collected.clear();
        turn.execute = self.next_tool();
        self.prune_if_needed();
        Ok(turn)
    }

    /// Whether the current assistant turn still has tool calls unresolved
    ///
    /// While this holds, the history ends with a tool use whose result has
    /// not been appended yet, so no other message may be added.
    #[must_use]
    pub fn is_mid_tool_turn(&self) -> bool {
        self.outstanding.is_some() || !self.queued.is_empty() || !self.collected.is_empty()
    }

    /// Record the result of the outstanding tool call
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::NoOutstandingToolCall`] if no call is
    /// outstanding.
    pub fn record_tool_result(
        &mut self,
        content: Vec<ToolResultText>,
    ) -> Result<ToolStep, ProtocolViolation> {
        let id = self
            .outstanding
            .take()
            .ok_or(ProtocolViolation::NoOutstandingToolCall)?;
        self.collected.push(ContentBlock::tool_result(id, content));

        if let Some(next) = self.next_tool() {
            return Ok(ToolStep::Execute(next));
        }

        let results = std::mem::take(&mut self.collected);
        self.history.push(ConversationMessage {
            role: Role::User,
            content: results,
        });
        self.prune_if_needed();
        Ok(ToolStep::Complete)
    }

    fn next_tool(&mut self) -> Option<ToolCall> {
        let call = self.queued.pop_front()?;
        self.outstanding = Some(call.id.clone());
        Some(call)
    }

    /// Clear message history and tool state (keeps the last utterance)
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.outstanding = None;
        self.queued.clear();
        self.collected.clear();
    }

    /// Drop the oldest messages beyond the limit
    ///
    /// Only prunes between turns, and always leaves the history starting with
    /// a plain user message so no tool result loses its tool use.
    fn prune_if_needed(&mut self) {
        if self.max_messages == 0 || self.history.len() <= self.max_messages {
            return;
        }
        if self.outstanding.is_some() || !self.collected.is_empty() {
            return;
        }

        let mut start = self.history.len() - self.max_messages;
        while start < self.history.len() && !is_plain_user(&self.history[start]) {
            start += 1;
        }
        if start == self.history.len() {
            return;
        }
        self.history.drain(..start);

        tracing::debug!(
            session = %self.id,
            removed = start,
            remaining = self.history.len(),
            "Pruned conversation history"
        );
    }
}

fn is_plain_user(message: &ConversationMessage) -> bool {
    message.role == Role::User
        && message
            .content
            .iter()
            .all(|b| matches!(b, ContentBlock::Text { .. }))
}
