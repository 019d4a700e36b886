//! The investigation loop: model turn, tool execution, model turn, until an answer.

use crate::config::PerfsleuthConfig;
use crate::error::AnalysisError;
use crate::prompt::{BUDGET_EXHAUSTED, DEGRADED_NOTE, INCOMPLETE_NOTE, PromptFrame};
use crate::target::ChangeRef;
use chrono::{DateTime, Utc};
use ps_llm::{ChatBackend, ChatMessage, LlmClient, ModelTurn, RetryingBackend, ToolCall};
use ps_tools::{InvestigationCache, InvestigationContext, SessionId, SourceLimits, ToolRegistry};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    FinalAnswer,
    BudgetExhausted,
    FatalError,
}

/// One tool call, or the final answer, as seen by the loop.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub tool: Option<String>,
    pub arguments: Option<String>,
    pub result: String,
    pub truncated: bool,
    pub rate_limited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub session_id: SessionId,
    pub change: ChangeRef,
    pub termination: TerminationReason,
    /// Model turns inside the budget; the closing summary turn is not counted.
    pub iterations: u32,
    pub max_iterations: u32,
    pub answer: String,
    /// A source API rate limit cut at least one tool call short.
    pub degraded: bool,
    pub records: Vec<IterationRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

enum LoopState {
    AwaitModel,
    ExecutingTools(Vec<ToolCall>),
    FinalAnswer(String),
    BudgetExhausted,
    Fatal(AnalysisError),
}

#[derive(Debug, Clone)]
pub struct InvestigatorSettings {
    pub api_base: String,
    pub credential: Option<String>,
    pub limits: SourceLimits,
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    pub assistant_prompt: Option<String>,
}

impl InvestigatorSettings {
    pub fn from_config(cfg: &PerfsleuthConfig) -> Self {
        Self {
            api_base: cfg.source.api_base.clone(),
            credential: cfg.source_token().map(str::to_string),
            limits: cfg.source.limits(),
            max_iterations: cfg.agent.max_iterations,
            system_prompt: cfg.agent.system_prompt.clone(),
            user_prompt: cfg.agent.user_prompt.clone(),
            assistant_prompt: cfg.agent.assistant_prompt.clone(),
        }
    }
}

/// Runs analyses. One instance is shared by concurrent analyses; each run owns its
/// transcript, records and cache session.
pub struct Investigator {
    backend: Arc<dyn ChatBackend>,
    cache: Arc<InvestigationCache>,
    settings: InvestigatorSettings,
}

impl Investigator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        cache: Arc<InvestigationCache>,
        settings: InvestigatorSettings,
    ) -> Self {
        Self {
            backend,
            cache,
            settings,
        }
    }

    /// Inference client wrapped in the configured retry policy.
    pub fn from_config(
        cfg: &PerfsleuthConfig,
        cache: Arc<InvestigationCache>,
    ) -> Result<Self, AnalysisError> {
        let client = LlmClient::new(
            &cfg.inference.endpoint,
            cfg.inference_api_key(),
            &cfg.inference.model,
            Duration::from_secs(cfg.inference.request_timeout_seconds),
        )
        .map_err(|e| AnalysisError::Configuration(e.to_string()))?;
        let backend = RetryingBackend::new(client, cfg.retry.policy());
        Ok(Self::new(
            Arc::new(backend),
            cache,
            InvestigatorSettings::from_config(cfg),
        ))
    }

    pub fn settings(&self) -> &InvestigatorSettings {
        &self.settings
    }

    #[tracing::instrument(level = "info", skip_all, fields(change = %change, session = tracing::field::Empty))]
    pub async fn run(&self, change: &ChangeRef) -> Result<AnalysisReport, AnalysisError> {
        let session = SessionId::new();
        tracing::Span::current().record("session", tracing::field::display(session));
        let started = Instant::now();
        let started_at = Utc::now();

        let outcome = self.drive(change, session, started_at).await;
        let released = self.cache.invalidate(session);

        match &outcome {
            Ok(report) => tracing::info!(
                termination = ?report.termination,
                iterations = report.iterations,
                tool_calls = report.records.iter().filter(|r| r.tool.is_some()).count(),
                degraded = report.degraded,
                cache_entries_released = released,
                latency_ms = started.elapsed().as_millis() as u64,
                "analysis finished"
            ),
            Err(e) => tracing::error!(
                termination = ?TerminationReason::FatalError,
                error = %e,
                latency_ms = started.elapsed().as_millis() as u64,
                "analysis failed"
            ),
        }
        outcome
    }

    async fn drive(
        &self,
        change: &ChangeRef,
        session: SessionId,
        started_at: DateTime<Utc>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let settings = &self.settings;
        let max_iterations = settings.max_iterations.max(1);

        let ctx = Arc::new(InvestigationContext::new(
            &change.org,
            &change.repo,
            change.number,
            settings.credential.clone(),
            session,
        ));
        self.cache.invalidate(session);
        let registry = ToolRegistry::for_investigation(
            Arc::clone(&ctx),
            &settings.api_base,
            settings.limits.clone(),
            Arc::clone(&self.cache),
        )?;
        let tools = registry.definitions();

        let frame = PromptFrame::for_change(
            change,
            settings.system_prompt.as_deref(),
            settings.user_prompt.as_deref(),
            settings.assistant_prompt.as_deref(),
        );
        let mut transcript = vec![
            ChatMessage::system(frame.system),
            ChatMessage::user(frame.user),
            ChatMessage::assistant(frame.assistant),
        ];
        let mut records: Vec<IterationRecord> = Vec::new();
        let mut iterations = 0u32;
        let mut degraded = false;
        let mut state = LoopState::AwaitModel;

        let (termination, answer) = loop {
            state = match state {
                LoopState::AwaitModel => {
                    if iterations >= max_iterations {
                        LoopState::BudgetExhausted
                    } else {
                        iterations += 1;
                        tracing::debug!(iteration = iterations, max_iterations, "awaiting model turn");
                        match self.backend.chat(&transcript, &tools).await {
                            Ok(response) => match response.turn() {
                                ModelTurn::FinalAnswer(text) => LoopState::FinalAnswer(text),
                                ModelTurn::ToolInvocations(calls) => {
                                    transcript.push(response.message);
                                    LoopState::ExecutingTools(calls)
                                }
                            },
                            Err(e) => LoopState::Fatal(e.into()),
                        }
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    for call in calls {
                        let started = Instant::now();
                        let output = registry.invoke(&call.name, &call.arguments).await;
                        tracing::info!(
                            iteration = iterations,
                            tool = %call.name,
                            output_len = output.text.len(),
                            truncated = output.truncated,
                            rate_limited = output.rate_limited,
                            latency_ms = started.elapsed().as_millis() as u64,
                            "tool executed"
                        );
                        degraded |= output.rate_limited;
                        transcript.push(ChatMessage::tool_result(&call.id, output.text.clone()));
                        records.push(IterationRecord {
                            iteration: iterations,
                            tool: Some(call.name),
                            arguments: Some(call.arguments),
                            result: output.text,
                            truncated: output.truncated,
                            rate_limited: output.rate_limited,
                        });
                    }
                    LoopState::AwaitModel
                }
                LoopState::FinalAnswer(text) => {
                    let answer = non_empty_or(text, "The model returned an empty answer.");
                    records.push(IterationRecord {
                        iteration: iterations,
                        tool: None,
                        arguments: None,
                        result: answer.clone(),
                        truncated: false,
                        rate_limited: false,
                    });
                    break (TerminationReason::FinalAnswer, answer);
                }
                LoopState::BudgetExhausted => {
                    tracing::warn!(max_iterations, "iteration budget exhausted; requesting summary");
                    transcript.push(ChatMessage::user(BUDGET_EXHAUSTED));
                    match self.backend.chat(&transcript, &[]).await {
                        Ok(response) => {
                            let summary = non_empty_or(
                                response.message.content,
                                "No conclusion could be reached with the information gathered.",
                            );
                            records.push(IterationRecord {
                                iteration: iterations,
                                tool: None,
                                arguments: None,
                                result: summary.clone(),
                                truncated: false,
                                rate_limited: false,
                            });
                            break (
                                TerminationReason::BudgetExhausted,
                                format!("{summary}\n\n{INCOMPLETE_NOTE}"),
                            );
                        }
                        Err(e) => LoopState::Fatal(e.into()),
                    }
                }
                LoopState::Fatal(e) => return Err(e),
            };
        };

        let answer = if degraded {
            format!("{answer}\n\n{DEGRADED_NOTE}")
        } else {
            answer
        };

        Ok(AnalysisReport {
            session_id: session,
            change: change.clone(),
            termination,
            iterations,
            max_iterations,
            answer,
            degraded,
            records,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

fn non_empty_or(text: String, fallback: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
