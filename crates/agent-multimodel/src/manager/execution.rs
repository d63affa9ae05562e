//! One role's run: routing, budget check, call, retry and fallback

use super::MultiModelManager;
use super::types::{RoleOutcome, RoleState};
use crate::error_handler::{ErrorCategory, Remediation};
use crate::registry::{ModelId, RoleConfig};
use crate::router::{RoutingDecision, RoutingEngine, RoutingStrategy};
use crate::token_estimator::estimate_prompt_tokens;
use agent_llm::{CompletionRequest, LLMError, Message};
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State shared by every role of one run
pub(super) struct RunContext<'a> {
    pub engine: RoutingEngine,
    pub request: &'a super::CollaborationRequest,
    pub session_id: String,
    pub strategy: RoutingStrategy,
    pub deadline: Instant,
}

/// Prompts for one role turn
pub(super) struct RolePrompt {
    pub system: String,
    pub user: String,
    /// Used for the retry after a retryable failure
    pub simplified: String,
}

/// Outcome of one role turn plus the routing decisions behind it
pub(super) struct RoleReport {
    pub outcome: RoleOutcome,
    pub decisions: Vec<RoutingDecision>,
}

impl RoleReport {
    fn new(role: &RoleConfig) -> Self {
        Self {
            outcome: RoleOutcome::new(&role.role_key, &role.display_name),
            decisions: Vec::new(),
        }
    }

    fn finish(mut self, state: RoleState, note: Option<String>) -> Self {
        debug!("Role {}: running -> {}", self.outcome.role_key, state);
        self.outcome.state = state;
        self.outcome.note = note;
        self
    }

    pub(super) fn timed_out(role: &RoleConfig) -> Self {
        Self::new(role).finish(RoleState::Skipped, Some("timeout".to_string()))
    }
}

enum Attempt {
    Completed(String),
    OverBudget,
    Failed(LLMError),
}

impl MultiModelManager {
    /// Run a role, or skip it when the run deadline has passed or passes mid-call
    pub(super) async fn run_role_before_deadline(
        &self,
        run: &RunContext<'_>,
        role: &RoleConfig,
        prompt: RolePrompt,
    ) -> RoleReport {
        if Instant::now() >= run.deadline {
            warn!("Role {} skipped: collaboration deadline passed", role.role_key);
            return RoleReport::timed_out(role);
        }

        match tokio::time::timeout_at(run.deadline, self.run_role(run, role, prompt)).await {
            Ok(report) => report,
            Err(_) => {
                warn!("Role {} cancelled: collaboration deadline passed", role.role_key);
                RoleReport::timed_out(role)
            },
        }
    }

    async fn run_role(&self, run: &RunContext<'_>, role: &RoleConfig, prompt: RolePrompt) -> RoleReport {
        let mut report = RoleReport::new(role);
        report.outcome.state = RoleState::Running;
        debug!("Role {}: pending -> running", role.role_key);

        let decision = match run.engine.select_model(&role.role_key, run.strategy).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Role {} has no usable model: {}", role.role_key, e);
                report.outcome.error_category = Some(ErrorCategory::ModelUnavailable);
                let note = self.user_message(ErrorCategory::ModelUnavailable);
                return report.finish(RoleState::Failed, Some(note));
            },
        };

        let mut current = decision.selected_model.clone();
        report.decisions.push(decision);

        let mut tried = HashSet::new();
        let mut retries = 0;
        let mut degraded = false;
        let mut simplified = false;

        loop {
            tried.insert(current.clone());
            report.outcome.attempts += 1;
            report.outcome.model = Some(current.clone());

            let user = if simplified { &prompt.simplified } else { &prompt.user };
            let err = match self.attempt(run, role, &current, &prompt.system, user).await {
                Attempt::Completed(text) => {
                    report.outcome.output = Some(text);
                    if degraded {
                        let note = report.outcome.error_category.map(|c| self.user_message(c));
                        return report.finish(RoleState::Degraded, note);
                    }
                    report.outcome.error_category = None;
                    return report.finish(RoleState::Succeeded, None);
                },
                Attempt::OverBudget => {
                    info!("Role {} skipped: session budget exhausted", role.role_key);
                    let note = match self.errors.language() {
                        crate::config::ResponseLanguage::English => "budget exhausted",
                        crate::config::ResponseLanguage::Chinese => "预算已用尽",
                    };
                    return report.finish(RoleState::Skipped, Some(note.to_string()));
                },
                Attempt::Failed(err) => err,
            };

            let category = self.errors.classify(&err);
            report.outcome.error_category = Some(category);
            warn!(
                "Role {} call to {} failed ({}): {}",
                role.role_key, current, category, err
            );

            if category.is_retryable() && retries < self.config.max_retries {
                let backoff = self.config.retry_backoff(retries);
                retries += 1;
                tokio::time::sleep(backoff).await;

                if !role.is_locked() {
                    if let Ok(next) = run.engine.select_fallback(&role.role_key, &tried, true).await {
                        current = next.selected_model.clone();
                        report.decisions.push(next);
                    }
                }
                info!("Role {} retrying on {} with a simplified prompt", role.role_key, current);
                degraded = true;
                simplified = true;
                continue;
            }

            if category.remediation() == Remediation::SwitchModel && !role.is_locked() {
                if let Ok(next) = run.engine.select_fallback(&role.role_key, &tried, false).await {
                    info!("Role {} switching from {} to {}", role.role_key, current, next.selected_model);
                    current = next.selected_model.clone();
                    report.decisions.push(next);
                    degraded = true;
                    continue;
                }
            }

            let note = self.user_message(category);
            return report.finish(RoleState::Failed, Some(note));
        }
    }

    async fn attempt(
        &self,
        run: &RunContext<'_>,
        role: &RoleConfig,
        model: &ModelId,
        system: &str,
        user: &str,
    ) -> Attempt {
        let Some(spec) = run.engine.registry().get(model) else {
            return Attempt::Failed(LLMError::ModelNotFound(model.to_string()));
        };
        let Some(client) = self.context.checker().client(&spec.provider).await else {
            return Attempt::Failed(LLMError::ConfigurationError(format!(
                "provider {} has no usable client",
                spec.provider
            )));
        };

        let max_tokens = role.max_tokens.unwrap_or(self.config.max_tokens) as usize;
        let estimate = spec.cost_for(estimate_prompt_tokens(system, user), max_tokens);
        let Some(reservation) = self.budget.try_reserve(&run.session_id, estimate) else {
            return Attempt::OverBudget;
        };

        let request = CompletionRequest::builder(&spec.model_name)
            .system(system)
            .add_message(Message::user(user))
            .max_tokens(max_tokens)
            .temperature(self.config.temperature)
            .build();

        debug!("Role {} calling {} (estimated cost {})", role.role_key, model, estimate);
        let result = tokio::time::timeout(self.config.call_timeout, client.complete(request)).await;
        drop(reservation);

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Attempt::Failed(e),
            Err(_) => {
                return Attempt::Failed(LLMError::Timeout(format!(
                    "{} did not answer within {:?}",
                    model, self.config.call_timeout
                )));
            },
        };

        let usage = response.usage;
        let cost = spec.cost_for(usage.input_tokens, usage.output_tokens);
        if let Err(e) = self.budget.record(
            &run.session_id,
            &role.role_key,
            model,
            usage.input_tokens,
            usage.output_tokens,
            cost,
        ) {
            warn!("Failed to record call cost: {}", e);
        }

        if response.message.is_blank() {
            return Attempt::Failed(LLMError::UnexpectedResponse(format!(
                "{model} returned an empty completion"
            )));
        }
        debug!(
            "Role {} got {} output tokens from {} (cost {})",
            role.role_key, usage.output_tokens, model, cost
        );
        Attempt::Completed(response.text().to_string())
    }

    fn user_message(&self, category: ErrorCategory) -> String {
        self.errors
            .to_user_message(category, self.errors.language())
            .to_string()
    }
}
