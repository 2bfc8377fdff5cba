//! Conversation Manager
//!
//! Owns the assistant conversation and runs the tool-use protocol. Speech
//! comes in as sensor samples, goes out to the assistant backend as
//! completion requests, and replies are spoken back through the
//! text-to-speech actuator.
//!
//! Every operation that touches the session holds its lock for the whole
//! operation, so history stays consistent when replies and new utterances
//! arrive concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::backend::{AssistantBackend, ToolExecutor};
use crate::codec::{self, FilteredToolResult};
use crate::config::ConversationConfig;
use crate::data::{ActuatorData, SensorData, NOT_SET};
use crate::dispatcher::ActuatorDispatcher;
use crate::messages::{CompletionRequest, ConversationMessage, ToolResultText};
use crate::resource::ResourceId;
use crate::session::{ConversationSession, SessionId, ToolCall, ToolStep, UtteranceCheck};

/// Spoken confirmation after the reset keyword
pub const RESET_ACKNOWLEDGEMENT: &str = "Conversation reset";

/// Result of submitting an utterance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty utterance, nothing done
    Empty,
    /// Same as the previous utterance, suppressed
    Duplicate,
    /// Reset keyword: history cleared, acknowledgement spoken
    Reset,
    /// A tool call is still being resolved, utterance dropped
    Busy,
    /// Appended and sent to the backend
    Sent,
    /// Appended, but the backend call failed
    SendFailed,
    /// Assistant disabled or no backend configured
    Unavailable,
    /// Manager has been closed
    Closed,
}

/// Assistant conversation and tool-use state machine
pub struct ConversationManager {
    config: ConversationConfig,
    session: Mutex<ConversationSession>,
    backend: Option<Arc<dyn AssistantBackend>>,
    tools: Option<Arc<dyn ToolExecutor>>,
    dispatcher: ActuatorDispatcher,
    speech_location: RwLock<String>,
    closed: AtomicBool,
}

impl ConversationManager {
    /// Create a manager
    #[must_use]
    pub fn new(
        config: ConversationConfig,
        backend: Option<Arc<dyn AssistantBackend>>,
        tools: Option<Arc<dyn ToolExecutor>>,
        dispatcher: ActuatorDispatcher,
    ) -> Self {
        let session = ConversationSession::with_max_messages(config.max_history_messages);
        Self {
            config,
            session: Mutex::new(session),
            backend,
            tools,
            dispatcher,
            speech_location: RwLock::new(NOT_SET.to_string()),
            closed: AtomicBool::new(false),
        }
    }

    /// Handle a speech sensor sample
    pub async fn on_speech_sample(&self, data: &SensorData) -> SubmitOutcome {
        let Some(ref state_data) = data.state_data else {
            tracing::warn!(location = %data.location_id, "Speech sample has no state data");
            return SubmitOutcome::Empty;
        };

        let speech = match codec::decode_speech(state_data) {
            Ok(speech) => speech,
            Err(e) => {
                tracing::warn!(location = %data.location_id, error = %e, "Failed to parse speech result");
                return SubmitOutcome::Empty;
            }
        };

        if !speech.is_complete {
            tracing::debug!(partial = %speech.partial, "Using incomplete speech result");
        }

        self.submit_user_utterance(&data.location_id, &speech.result)
            .await
    }

    /// Submit something the user said at `location_id`
    pub async fn submit_user_utterance(&self, location_id: &str, text: &str) -> SubmitOutcome {
        if self.is_closed() {
            return SubmitOutcome::Closed;
        }
        *self.speech_location.write() = location_id.to_string();

        let mut session = self.session.lock().await;

        let is_reset = text.trim().eq_ignore_ascii_case(&self.config.reset_keyword);
        if !is_reset && !text.trim().is_empty() && session.is_mid_tool_turn() {
            tracing::info!(
                session = %session.id(),
                outstanding = ?session.outstanding_tool(),
                "Tool call in progress, utterance dropped"
            );
            return SubmitOutcome::Busy;
        }

        match session.check_utterance(text) {
            UtteranceCheck::Empty => return SubmitOutcome::Empty,
            UtteranceCheck::Duplicate => {
                tracing::debug!(text = %text, "Duplicate utterance suppressed");
                return SubmitOutcome::Duplicate;
            }
            UtteranceCheck::Fresh => {}
        }

        if !self.config.enabled {
            tracing::warn!("Assistant conversation disabled, utterance dropped");
            return SubmitOutcome::Unavailable;
        }

        if is_reset {
            tracing::info!(session = %session.id(), "Resetting conversation");
            session.clear_history();
            self.speak(RESET_ACKNOWLEDGEMENT).await;
            return SubmitOutcome::Reset;
        }

        if self.backend.is_none() {
            tracing::warn!("No assistant backend configured, utterance dropped");
            return SubmitOutcome::Unavailable;
        }

        tracing::info!(session = %session.id(), text = %text, "Sending utterance to assistant");
        session.push_user_text(text);

        if self.request_completion(&session).await {
            SubmitOutcome::Sent
        } else {
            SubmitOutcome::SendFailed
        }
    }

    /// Handle the assistant's reply to a completion request
    ///
    /// Returns `false` if the reply was discarded.
    pub async fn on_assistant_response(&self, message: ConversationMessage) -> bool {
        if self.is_closed() {
            tracing::debug!("Conversation closed, ignoring assistant reply");
            return false;
        }

        let mut session = self.session.lock().await;

        let turn = match session.accept_assistant(message) {
            Ok(turn) => turn,
            Err(violation) => {
                tracing::warn!(session = %session.id(), reason = %violation, "Discarding assistant reply");
                return false;
            }
        };

        tracing::info!(
            session = %session.id(),
            texts = turn.texts.len(),
            tools = turn.tool_names.len(),
            "Handling assistant reply"
        );

        if !turn.has_tool_use() || self.config.verbose_tool_executions {
            for text in &turn.texts {
                self.speak(text).await;
            }
        }

        if let Some(call) = turn.execute {
            self.run_tools(&mut session, call).await;
        }
        true
    }

    /// Handle the output of a tool execution
    ///
    /// Returns `false` if the result was discarded.
    pub async fn on_tool_execution_result(&self, result: FilteredToolResult) -> bool {
        if self.is_closed() {
            tracing::debug!("Conversation closed, ignoring tool result");
            return false;
        }
        if result.dropped > 0 {
            tracing::warn!(dropped = result.dropped, "Only text tool results are supported");
        }

        let mut session = self.session.lock().await;

        match session.record_tool_result(result.blocks) {
            Ok(ToolStep::Execute(next)) => {
                self.run_tools(&mut session, next).await;
                true
            }
            Ok(ToolStep::Complete) => {
                tracing::debug!(session = %session.id(), "All tool calls resolved");
                self.request_completion(&session).await;
                true
            }
            Err(violation) => {
                tracing::warn!(session = %session.id(), reason = %violation, "Discarding tool result");
                false
            }
        }
    }

    /// Clear the conversation
    pub async fn reset(&self) {
        let mut session = self.session.lock().await;
        session.clear_history();
        tracing::info!(session = %session.id(), "Conversation cleared");
    }

    /// Stop processing; late replies become no-ops
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`close`](Self::close) was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Copy of the conversation history
    pub async fn history(&self) -> Vec<ConversationMessage> {
        self.session.lock().await.history().to_vec()
    }

    /// Identifier of the unresolved tool call, if any
    pub async fn outstanding_tool(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .outstanding_tool()
            .map(str::to_string)
    }

    /// Current session identifier
    pub async fn session_id(&self) -> SessionId {
        self.session.lock().await.id().clone()
    }

    // Executes `call`; a call that cannot be issued is resolved with an error
    // result so the turn still completes.
    async fn run_tools(&self, session: &mut ConversationSession, call: ToolCall) {
        let mut next = Some(call);
        while let Some(call) = next.take() {
            if self.execute_tool(&call).await {
                return;
            }
            let failure = ToolResultText::execution_failed(&call.name);
            match session.record_tool_result(vec![failure]) {
                Ok(ToolStep::Execute(following)) => next = Some(following),
                Ok(ToolStep::Complete) => {
                    self.request_completion(session).await;
                }
                Err(violation) => {
                    tracing::warn!(reason = %violation, "Tool bookkeeping out of sync");
                }
            }
        }
    }

    async fn execute_tool(&self, call: &ToolCall) -> bool {
        if self.config.verbose_tool_executions {
            self.speak(&format!("Executing {}", call.name)).await;
        }

        let Some(ref tools) = self.tools else {
            tracing::warn!(tool = %call.name, "No tool executor configured");
            return false;
        };

        tracing::info!(tool = %call.name, id = %call.id, "Executing tool");
        match tools.execute_tool(&call.name, &call.input).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool execution request failed");
                false
            }
        }
    }

    async fn request_completion(&self, session: &ConversationSession) -> bool {
        let Some(ref backend) = self.backend else {
            tracing::warn!("No assistant backend configured");
            return false;
        };

        let request = CompletionRequest {
            messages: session.history().to_vec(),
            randomness: self.config.randomness,
            sys_prompt: self.config.system_prompt.clone(),
            use_tools: true,
        };

        match backend.send_completion(&request).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = %backend.name(), error = %e, "Completion request failed");
                false
            }
        }
    }

    async fn speak(&self, text: &str) {
        let location = self.speech_location.read().clone();
        let command = ActuatorData::speak(location, text);
        self.dispatcher
            .dispatch(ResourceId::CdaActuatorCmd, &command)
            .await;
    }
}
