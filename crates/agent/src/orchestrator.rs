//! The conversational tool-calling orchestrator.
//!
//! One [`Orchestrator::run`] call is one conversation turn:
//!
//! 1. sanitize, validate and trim the prior history, append the utterance
//! 2. request a completion, walking the [`ModelLadder`] on failure
//! 3. if the reply asks for tools, run the batch concurrently, append each
//!    result as a tool message and go back to 2
//! 4. otherwise the reply text (or [`DEFAULT_REPLY`]) ends the turn
//!
//! Completion round-trips are strictly sequential. Only the completion call
//! is ever retried; tool calls that already ran are never re-executed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use wardops_config::{AgentConfig, AppConfig};
use wardops_core::error::{ProviderError, ToolError};
use wardops_core::event::{DomainEvent, EventBus};
use wardops_core::message::{Message, MessageToolCall, Role};
use wardops_core::provider::{Provider, ProviderRequest, ProviderResponse};
use wardops_core::tool::ToolResult;
use wardops_providers::{ModelLadder, Outcome, RetryPolicy, Transition, Verdict};
use wardops_tools::ToolExecutor;

use crate::error::AgentError;
use crate::sanitize;

/// Reply used when the final response carries no text.
pub const DEFAULT_REPLY: &str = "Task completed.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the operations assistant of a hospital ward. \
Staff ask you to dispatch work (food, medication, equipment, lab samples, cleaning, \
patient transport), admit or discharge patients and look up rooms. Use the tools to act; \
never claim an action happened unless a tool reported success. Location ids look like \
room-101. Keep replies short and factual.";

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub history_limit: usize,
    pub max_iterations: u32,
    pub max_content_chars: usize,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            max_iterations: config.max_iterations,
            max_content_chars: config.max_content_chars,
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// The result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    /// Every tool result of the turn, in execution order
    pub tool_results: Vec<ToolResult>,
    /// Trimmed prior history plus everything this turn appended
    pub history: Vec<Message>,
    /// Model that produced the final response
    pub model: String,
    /// Completion round-trips used
    pub iterations: u32,
}

/// Why the ladder stopped without a response.
enum LadderFailure {
    Rejected { model: String, error: ProviderError },
    Exhausted { attempted: Vec<String>, last: ProviderError },
    Cancelled,
}

impl LadderFailure {
    fn with_history(self, history: Vec<Message>) -> AgentError {
        match self {
            LadderFailure::Rejected { model, error } => AgentError::Rejected {
                model,
                source: error,
                history,
            },
            LadderFailure::Exhausted { attempted, last } => AgentError::Exhausted {
                attempted,
                last,
                history,
            },
            LadderFailure::Cancelled => AgentError::Cancelled { history },
        }
    }
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    ladder: ModelLadder,
    settings: OrchestratorSettings,
    event_bus: Option<Arc<EventBus>>,
    shutdown: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: ToolExecutor,
        ladder: ModelLadder,
        settings: OrchestratorSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            provider,
            executor,
            ladder,
            settings,
            event_bus: None,
            shutdown,
        }
    }

    /// Ladder, retry policy and limits taken from the app config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        executor: ToolExecutor,
        config: &AppConfig,
    ) -> Self {
        let policy = RetryPolicy {
            max_retries: config.agent.max_retries,
            backoff_base: Duration::from_millis(config.agent.backoff_base_ms),
            backoff_max: Duration::from_millis(config.agent.backoff_max_ms),
        };
        let ladder = ModelLadder::new(config.provider.models.clone(), policy);
        Self::new(
            provider,
            executor,
            ladder,
            OrchestratorSettings::from_config(&config.agent),
        )
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn ladder(&self) -> &ModelLadder {
        &self.ladder
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Stop this orchestrator. In-flight and later turns return
    /// [`AgentError::Cancelled`]; pending backoff sleeps are dropped and
    /// completion responses that arrive afterwards are discarded.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run one conversation turn.
    pub async fn run(
        &self,
        utterance: &str,
        prior_history: &[Message],
    ) -> Result<TurnOutcome, AgentError> {
        if let Some((index, message)) = sanitize::find_invalid(prior_history) {
            return Err(AgentError::InvalidHistory(format!(
                "message {index} has unrecognized role '{}'",
                message.role.as_str()
            )));
        }

        let max_chars = self.settings.max_content_chars;
        let mut history: Vec<Message> =
            sanitize::trim_history(prior_history, self.settings.history_limit)
                .into_iter()
                .map(|m| sanitize::sanitize_message(m, max_chars))
                .collect();
        history.push(sanitize::sanitize_message(Message::user(utterance), max_chars));
        let turn_start = history.len();

        let mut tool_results = Vec::new();
        let mut model_index = 0;
        let mut iterations = 0;

        while iterations < self.settings.max_iterations {
            iterations += 1;

            let (response, index) = match self.complete(&history, model_index).await {
                Ok(done) => done,
                Err(failure) => return Err(failure.with_history(history)),
            };
            model_index = index;

            let calls = response.message.tool_calls.clone();
            history.push(sanitize::sanitize_message(response.message, max_chars));
            if calls.is_empty() {
                break;
            }

            debug!(iteration = iterations, tool_count = calls.len(), "Executing tool calls");
            let Some(results) = self.or_cancelled(self.execute_batch(&calls)).await else {
                return Err(AgentError::Cancelled { history });
            };

            for (call, result) in calls.iter().zip(results) {
                let content = sanitize::sanitize_content(&result.to_message_content(), max_chars);
                history.push(Message::tool_result(&call.id, &call.name, content));
                tool_results.push(result);
            }

            if iterations == self.settings.max_iterations {
                warn!(
                    max_iterations = self.settings.max_iterations,
                    "Iteration cap reached, ending the turn"
                );
            }
        }

        let reply = history[turn_start..]
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.trim())
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_REPLY)
            .to_string();

        let model = self
            .ladder
            .models()
            .get(model_index)
            .cloned()
            .unwrap_or_default();

        info!(
            model = %model,
            iterations,
            tool_calls = tool_results.len(),
            "Turn complete"
        );
        self.publish(DomainEvent::ResponseGenerated {
            model: model.clone(),
            iterations,
            tool_calls: tool_results.len(),
            timestamp: Utc::now(),
        });

        Ok(TurnOutcome {
            reply,
            tool_results,
            history,
            model,
            iterations,
        })
    }

    fn request_messages(&self, history: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(self.settings.system_prompt.clone()));
        messages.extend_from_slice(history);
        messages
    }

    /// Walk the ladder from `start` until one model answers.
    ///
    /// Returns the response and the ladder index of the model that gave it.
    async fn complete(
        &self,
        history: &[Message],
        start: usize,
    ) -> Result<(ProviderResponse, usize), LadderFailure> {
        let mut request = ProviderRequest {
            model: String::new(),
            messages: self.request_messages(history),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools: self.executor.definitions(),
        };

        let Some(mut attempt) = self.ladder.start(start, !request.tools.is_empty()) else {
            return Err(LadderFailure::Exhausted {
                attempted: Vec::new(),
                last: ProviderError::NotConfigured("the model ladder is empty".into()),
            });
        };
        let mut attempted: Vec<String> = Vec::new();

        loop {
            let model = self.ladder.model(&attempt).to_string();
            if attempted.last() != Some(&model) {
                attempted.push(model.clone());
            }
            request.model = model.clone();
            let outgoing = if attempt.with_tools {
                request.clone()
            } else {
                request.without_tools()
            };

            debug!(
                model = %model,
                retries_left = attempt.retries_left,
                with_tools = attempt.with_tools,
                "Requesting completion"
            );
            let result = self
                .or_cancelled(self.provider.complete(outgoing))
                .await
                .ok_or(LadderFailure::Cancelled)?;

            let error = match result {
                Ok(response) => return Ok((response, attempt.model)),
                Err(e) => e,
            };

            match self.ladder.transition(attempt, Outcome::classify(&error)) {
                Transition::Retry { next, delay } => {
                    warn!(
                        model = %model,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Completion failed, retrying"
                    );
                    self.or_cancelled(tokio::time::sleep(delay))
                        .await
                        .ok_or(LadderFailure::Cancelled)?;
                    attempt = next;
                }
                Transition::StripTools { next } => {
                    warn!(model = %model, error = %error, "Retrying without tool declarations");
                    attempt = next;
                }
                Transition::Fallback { next } => {
                    let to = self.ladder.model(&next).to_string();
                    warn!(from = %model, to = %to, error = %error, "Falling back to next model");
                    self.publish(DomainEvent::ModelFallback {
                        from_model: model,
                        to_model: Some(to),
                        reason: error.to_string(),
                        timestamp: Utc::now(),
                    });
                    attempt = next;
                }
                Transition::Done(Verdict::Rejected) => {
                    warn!(model = %model, error = %error, "Completion rejected, abandoning the ladder");
                    return Err(LadderFailure::Rejected { model, error });
                }
                Transition::Done(Verdict::Exhausted) => {
                    warn!(model = %model, error = %error, "Every model in the ladder failed");
                    self.publish(DomainEvent::ModelFallback {
                        from_model: model,
                        to_model: None,
                        reason: error.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(LadderFailure::Exhausted {
                        attempted,
                        last: error,
                    });
                }
            }
        }
    }

    /// Run a batch of tool calls concurrently; results keep the call order.
    async fn execute_batch(&self, calls: &[MessageToolCall]) -> Vec<ToolResult> {
        futures::future::join_all(calls.iter().map(|call| self.execute_one(call))).await
    }

    async fn execute_one(&self, call: &MessageToolCall) -> ToolResult {
        let parsed = if call.arguments.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&call.arguments)
        };

        match parsed {
            Ok(arguments) => self
                .executor
                .execute(&call.name, arguments)
                .await
                .for_call(&call.id),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Unparsable tool arguments");
                let error = ToolError::InvalidArguments {
                    tool_name: call.name.clone(),
                    reason: format!("arguments are not valid JSON: {e}"),
                };
                ToolResult::failure(error.to_string()).for_call(&call.id)
            }
        }
    }

    /// `None` if the orchestrator is shut down before `fut` completes.
    async fn or_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut stop = self.shutdown.subscribe();
        tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => None,
            output = fut => Some(output),
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
