//! The bounded reasoning loop.
//!
//! Each user message runs one turn: stream model output, dispatch the
//! tool calls it requests, feed the results back, and repeat until the
//! model answers without tools or the step budget runs out. Events flow
//! to the caller over a bounded channel; a send failure means the
//! client disconnected and cancels the turn.

use futures::StreamExt;
use futures::future::join_all;
use observability::AgentMetrics;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backends::ToolBackendRegistry;
use crate::credentials::CredentialResolver;
use crate::error::{AssistantError, AssistantResult};
use crate::models::{AgentEvent, ToolCallRequest, ToolCallResult, Turn};
use crate::session::{SessionState, SessionStore};

use super::model::{ModelClient, ModelEvent};
use super::prompts;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Placeholder backend id for tool calls no usable backend serves
const UNRESOLVED_BACKEND: &str = "unresolved";

/// Drives turns for all sessions
#[derive(Clone)]
pub struct AgentOrchestrator {
    model: Arc<dyn ModelClient>,
    registry: Arc<ToolBackendRegistry>,
    resolver: Arc<CredentialResolver>,
    sessions: Arc<SessionStore>,
    max_steps: usize,
}

/// Releases the session's turn guard when the turn task finishes,
/// including on panic or early return
struct TurnGuard(Arc<SessionState>);

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.0.end_turn();
    }
}

impl AgentOrchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<ToolBackendRegistry>,
        resolver: Arc<CredentialResolver>,
        sessions: Arc<SessionStore>,
        max_steps: usize,
    ) -> Self {
        Self {
            model,
            registry,
            resolver,
            sessions,
            max_steps,
        }
    }

    /// Start a turn for the session. Rejects when one is already in
    /// flight; the returned stream yields events until the turn ends.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        message: String,
    ) -> AssistantResult<ReceiverStream<AgentEvent>> {
        let session = self.sessions.get_or_create(session_id).await;

        if !session.begin_turn() {
            return Err(AssistantError::TurnInProgress);
        }
        session.clear_cancel();
        session.append_turn(Turn::user(message)).await;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let guard = TurnGuard(Arc::clone(&session));
            orchestrator.run_turn(&session, tx).await;
            drop(guard);
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Request cancellation of the session's in-flight turn. Checked at
    /// step boundaries, so the current model/tool round finishes first.
    pub async fn cancel(&self, session_id: Uuid) -> AssistantResult<()> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| AssistantError::SessionNotFound(session_id.to_string()))?;
        session.request_cancel();
        Ok(())
    }

    async fn run_turn(&self, session: &Arc<SessionState>, tx: mpsc::Sender<AgentEvent>) {
        let system_prompt = prompts::system_prompt();

        for step in 1..=self.max_steps {
            let catalog = self.registry.list_tools(None).await;
            let tools: Vec<_> = catalog.into_iter().map(|(_, tool)| tool).collect();
            let history = session.history_snapshot().await;

            let started = Instant::now();
            let mut stream = match self.model.stream_turn(&system_prompt, &history, &tools).await {
                Ok(stream) => stream,
                Err(e) => {
                    AgentMetrics::record_model_request("error", started.elapsed().as_millis() as u64);
                    fail(&tx, "model", Some(e.to_string())).await;
                    return;
                }
            };

            let mut text = String::new();
            let mut requested: Vec<(String, String, serde_json::Value)> = Vec::new();
            let mut stream_error: Option<String> = None;

            while let Some(event) = stream.next().await {
                match event {
                    Ok(ModelEvent::TextDelta(delta)) => {
                        text.push_str(&delta);
                        if tx.send(AgentEvent::TextDelta { content: delta }).await.is_err() {
                            info!(session_id = %session.session_id, "Client disconnected mid-turn");
                            // Text streamed before the disconnect stays in the history
                            if !text.is_empty() {
                                let partial = std::mem::take(&mut text);
                                session.append_turn(Turn::assistant(partial, None)).await;
                            }
                            return;
                        }
                    }
                    Ok(ModelEvent::ToolUse {
                        call_id,
                        tool_name,
                        arguments,
                    }) => requested.push((call_id, tool_name, arguments)),
                    Ok(ModelEvent::Usage {
                        input_tokens,
                        output_tokens,
                    }) => {
                        AgentMetrics::record_tokens(input_tokens, output_tokens);
                        session
                            .usage
                            .record(input_tokens, output_tokens, requested.len() as u64);
                    }
                    Ok(ModelEvent::Stop) => break,
                    Err(e) => {
                        stream_error = Some(e.to_string());
                        break;
                    }
                }
            }

            if let Some(detail) = stream_error {
                AgentMetrics::record_model_request("error", started.elapsed().as_millis() as u64);
                // Text streamed before the failure stays in the history
                if !text.is_empty() {
                    session.append_turn(Turn::assistant(text, None)).await;
                }
                fail(&tx, "model", Some(detail)).await;
                return;
            }
            AgentMetrics::record_model_request("ok", started.elapsed().as_millis() as u64);

            if requested.is_empty() {
                session.append_turn(Turn::assistant(text, None)).await;
                AgentMetrics::record_turn_completed(false, step);
                let _ = tx
                    .send(AgentEvent::TurnComplete {
                        truncated: false,
                        steps: step,
                        usage: session.usage.snapshot(),
                    })
                    .await;
                return;
            }

            // Duplicate call ids would make result correlation ambiguous
            let mut duplicate = None;
            let mut seen = HashSet::new();
            for (call_id, _, _) in &requested {
                if !seen.insert(call_id.as_str()) {
                    duplicate = Some(call_id.clone());
                    break;
                }
            }
            if let Some(call_id) = duplicate {
                if !text.is_empty() {
                    session.append_turn(Turn::assistant(text, None)).await;
                }
                fail(&tx, "protocol", Some(format!("duplicate call id: {call_id}"))).await;
                return;
            }

            let mut calls = Vec::with_capacity(requested.len());
            for (call_id, tool_name, arguments) in requested {
                let backend_id = self
                    .registry
                    .resolve_backend(&tool_name)
                    .await
                    .unwrap_or_else(|| UNRESOLVED_BACKEND.to_string());
                calls.push(ToolCallRequest {
                    call_id,
                    tool_name,
                    backend_id,
                    arguments,
                });
            }

            session
                .append_turn(Turn::assistant(text, Some(calls.clone())))
                .await;

            for call in &calls {
                let announced = AgentEvent::ToolCallAnnounced {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    backend_id: call.backend_id.clone(),
                };
                if tx.send(announced).await.is_err() {
                    return;
                }
            }

            if session.cancel_requested() {
                fail(&tx, "cancelled", None).await;
                return;
            }

            let handle = match self.resolver.ensure_fresh().await {
                Ok(handle) => handle,
                Err(e) => {
                    fail(&tx, "credential", Some(e.to_string())).await;
                    return;
                }
            };

            // Dispatch concurrently; join_all preserves request order
            let results: Vec<ToolCallResult> = join_all(calls.iter().map(|call| {
                let registry = Arc::clone(&self.registry);
                let credentials = handle.credentials.clone();
                async move {
                    if call.backend_id == UNRESOLVED_BACKEND {
                        warn!(tool_name = %call.tool_name, "No usable backend serves tool");
                        ToolCallResult::error(
                            &call.call_id,
                            format!("no usable backend serves tool {}", call.tool_name),
                        )
                    } else {
                        registry
                            .invoke(
                                &call.call_id,
                                &call.backend_id,
                                &call.tool_name,
                                call.arguments.clone(),
                                credentials.as_ref(),
                            )
                            .await
                    }
                }
            }))
            .await;

            for result in results {
                let received = AgentEvent::ToolResultReceived {
                    call_id: result.call_id.clone(),
                    status: result.status,
                };
                session.append_turn(Turn::tool(result)).await;
                if tx.send(received).await.is_err() {
                    return;
                }
            }

            if session.cancel_requested() {
                fail(&tx, "cancelled", None).await;
                return;
            }
        }

        // Step budget exhausted: close out with what we have
        let note = format!(
            "I reached the limit of {} reasoning steps for this message. \
             The answer above reflects the data gathered so far; ask again to continue.",
            self.max_steps
        );
        session.append_turn(Turn::assistant(note.clone(), None)).await;
        if tx
            .send(AgentEvent::TextDelta { content: note })
            .await
            .is_err()
        {
            return;
        }
        AgentMetrics::record_turn_completed(true, self.max_steps);
        let _ = tx
            .send(AgentEvent::TurnComplete {
                truncated: true,
                steps: self.max_steps,
                usage: session.usage.snapshot(),
            })
            .await;
    }
}

async fn fail(tx: &mpsc::Sender<AgentEvent>, reason: &'static str, detail: Option<String>) {
    AgentMetrics::record_turn_failed(reason);
    let _ = tx
        .send(AgentEvent::TurnFailed {
            reason: reason.to_string(),
            detail,
        })
        .await;
}
