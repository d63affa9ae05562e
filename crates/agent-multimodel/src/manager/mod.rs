//! Collaboration manager
//!
//! Runs one analysis request across several analyst roles. Each role gets a
//! model from the routing engine, is charged against the run's session budget,
//! and ends in a terminal [`RoleState`]. Partial results are always returned
//! unless nothing at all was produced.
//!
//! Three modes are supported:
//! - sequential: roles run in order and later roles see earlier outputs
//! - parallel: roles run concurrently and see only the request
//! - debate: roles take turns for a fixed number of rounds, answering each other

mod execution;
mod types;

pub use types::*;

use crate::budget::BudgetTracker;
use crate::config::CollaborationConfig;
use crate::dependency::DependencyChecker;
use crate::error::{CollaborationError, Result};
use crate::error_handler::UserFriendlyErrorHandler;
use crate::prompts::{
    PriorOutput, analysis_prompt, debate_prompt, simplified_prompt, system_prompt,
};
use crate::registry::{ModelRegistry, RoleConfig, RoleTable};
use crate::router::RoutingContext;
use execution::{RolePrompt, RoleReport, RunContext};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Entry point for collaborative multi-model analysis
pub struct MultiModelManager {
    context: Arc<RoutingContext>,
    budget: Arc<BudgetTracker>,
    config: Arc<CollaborationConfig>,
    errors: UserFriendlyErrorHandler,
}

impl MultiModelManager {
    pub fn new(context: Arc<RoutingContext>, config: CollaborationConfig) -> Self {
        let errors = UserFriendlyErrorHandler::new(config.language);
        Self {
            context,
            budget: Arc::new(BudgetTracker::new()),
            config: Arc::new(config),
            errors,
        }
    }

    /// Share a budget tracker with other managers
    pub fn with_budget_tracker(mut self, budget: Arc<BudgetTracker>) -> Self {
        self.budget = budget;
        self
    }

    /// Manager over the built-in catalog, roles and providers
    pub fn from_config(config: CollaborationConfig) -> Result<Self> {
        config.validate()?;
        let checker = Arc::new(DependencyChecker::with_builtin_factories(
            config.probe_ttl,
            config.probe_timeout,
        ));
        let context = RoutingContext::new(
            ModelRegistry::builtin()?,
            RoleTable::builtin()?,
            checker,
            config.default_strategy,
        )?;
        Ok(Self::new(Arc::new(context), config))
    }

    pub fn context(&self) -> &Arc<RoutingContext> {
        &self.context
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    pub fn config(&self) -> &CollaborationConfig {
        &self.config
    }

    /// Run the requested roles and collect their outputs.
    ///
    /// Role failures never abort the run; they show up in the result's
    /// outcomes and status. An error is returned only for a malformed request
    /// or when the run deadline passes before any role produced output.
    pub async fn execute_collaborative_analysis(
        &self,
        request: CollaborationRequest,
    ) -> std::result::Result<CollaborationResult, CollaborationError> {
        let started = Instant::now();
        let deadline = started + self.config.max_collaboration_time;

        let engine = self.context.engine();
        let mode = request.mode.unwrap_or(self.config.default_mode);
        let roles = resolve_roles(&request, mode, engine.roles())?;
        if request.budget_cap < Decimal::ZERO {
            return Err(CollaborationError::InvalidRequest(format!(
                "budget cap must not be negative, got {}",
                request.budget_cap
            )));
        }

        let strategy = request
            .strategy
            .unwrap_or_else(|| self.context.default_strategy());
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.budget
            .open_session(&session_id, request.budget_cap)
            .map_err(|e| CollaborationError::InvalidRequest(e.to_string()))?;

        info!(
            "Collaboration {} on {}: {} roles, mode {}, strategy {}, budget {}",
            session_id,
            request.target,
            roles.len(),
            mode,
            strategy,
            request.budget_cap
        );

        let run = RunContext {
            engine,
            request: &request,
            session_id,
            strategy,
            deadline,
        };

        let (reports, transcript) = match mode {
            CollaborationMode::Sequential => (self.run_sequential(&run, &roles).await, Vec::new()),
            CollaborationMode::Parallel => (self.run_parallel(&run, &roles).await, Vec::new()),
            CollaborationMode::Debate => self.run_debate(&run, &roles).await,
        };

        let budget = self
            .budget
            .close_session(&run.session_id)
            .unwrap_or_else(|| crate::budget::SessionBudget::new(&run.session_id, request.budget_cap));
        let elapsed = started.elapsed().as_secs_f64();

        let mut outcomes = Vec::with_capacity(reports.len());
        let mut decisions = Vec::new();
        for report in reports {
            outcomes.push(report.outcome);
            decisions.extend(report.decisions);
        }

        if !outcomes.iter().any(RoleOutcome::has_output) && Instant::now() >= run.deadline {
            warn!("Collaboration {} timed out with no output", run.session_id);
            return Err(CollaborationError::TimedOut {
                elapsed_secs: elapsed,
            });
        }

        let result = CollaborationResult::assemble(
            &request, mode, strategy, outcomes, decisions, transcript, budget, elapsed,
        );
        info!(
            "Collaboration {} finished: {}, cost {}, {:.1}s",
            result.session_id, result.status, result.total_cost, result.total_time_seconds
        );
        Ok(result)
    }

    fn role_prompt(
        &self,
        request: &CollaborationRequest,
        role: &RoleConfig,
        user: String,
    ) -> RolePrompt {
        let language = self.config.language;
        RolePrompt {
            system: system_prompt(role, language),
            user,
            simplified: simplified_prompt(request, role, language),
        }
    }

    async fn run_sequential(&self, run: &RunContext<'_>, roles: &[RoleConfig]) -> Vec<RoleReport> {
        let mut reports: Vec<RoleReport> = Vec::with_capacity(roles.len());
        let mut prior = Vec::new();

        for role in roles {
            let user = analysis_prompt(
                run.request,
                role,
                &prior,
                self.config.language,
                self.config.context_char_limit,
            );
            let prompt = self.role_prompt(run.request, role, user);
            let report = self.run_role_before_deadline(run, role, prompt).await;

            if let Some(text) = &report.outcome.output {
                prior.push(PriorOutput::new(&role.display_name, text));
            }
            reports.push(report);
        }
        reports
    }

    async fn run_parallel(&self, run: &RunContext<'_>, roles: &[RoleConfig]) -> Vec<RoleReport> {
        let tasks = roles.iter().map(|role| {
            let user = analysis_prompt(
                run.request,
                role,
                &[],
                self.config.language,
                self.config.context_char_limit,
            );
            let prompt = self.role_prompt(run.request, role, user);
            self.run_role_before_deadline(run, role, prompt)
        });
        join_all(tasks).await
    }

    async fn run_debate(
        &self,
        run: &RunContext<'_>,
        roles: &[RoleConfig],
    ) -> (Vec<RoleReport>, Vec<DebateTurn>) {
        let rounds = self.config.debate_rounds;
        let mut seats: Vec<DebateSeat> = roles.iter().map(DebateSeat::new).collect();
        let mut transcript = Vec::new();

        'rounds: for round in 1..=rounds {
            // Every turn answers the previous round, not earlier turns of this one
            let previous: Vec<Option<PriorOutput>> = seats
                .iter()
                .map(|seat| {
                    seat.latest
                        .as_ref()
                        .map(|text| PriorOutput::new(&seat.role.display_name, text))
                })
                .collect();

            for index in 0..seats.len() {
                let others: Vec<PriorOutput> = previous
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .filter_map(|(_, prior)| prior.clone())
                    .collect();

                let role = seats[index].role;
                let user = debate_prompt(
                    run.request,
                    role,
                    round,
                    rounds,
                    &others,
                    self.config.language,
                    self.config.context_char_limit,
                );
                let prompt = self.role_prompt(run.request, role, user);
                let report = self.run_role_before_deadline(run, role, prompt).await;

                let spoke = report.outcome.output.clone();
                let model = report.outcome.model.clone();
                seats[index].record(report);

                match spoke {
                    Some(text) => transcript.push(DebateTurn {
                        round,
                        role_key: role.role_key.clone(),
                        model,
                        text,
                    }),
                    None => {
                        warn!(
                            "Debate ended in round {}: {} produced no argument",
                            round, role.role_key
                        );
                        break 'rounds;
                    },
                }
            }
        }

        let reports = seats.into_iter().map(DebateSeat::finish).collect();
        (reports, transcript)
    }
}

/// Accumulated state of one debate participant across rounds
struct DebateSeat<'r> {
    role: &'r RoleConfig,
    latest: Option<String>,
    model: Option<crate::registry::ModelId>,
    attempts: u32,
    degraded: bool,
    failure: Option<RoleOutcome>,
    decisions: Vec<crate::router::RoutingDecision>,
}

impl<'r> DebateSeat<'r> {
    fn new(role: &'r RoleConfig) -> Self {
        Self {
            role,
            latest: None,
            model: None,
            attempts: 0,
            degraded: false,
            failure: None,
            decisions: Vec::new(),
        }
    }

    fn record(&mut self, report: RoleReport) {
        let outcome = report.outcome;
        self.attempts += outcome.attempts;
        self.decisions.extend(report.decisions);

        match outcome.state {
            RoleState::Succeeded | RoleState::Degraded => {
                self.degraded |= outcome.state == RoleState::Degraded;
                self.model = outcome.model.clone();
                self.latest = outcome.output;
            },
            _ => self.failure = Some(outcome),
        }
    }

    fn finish(self) -> RoleReport {
        let mut outcome = RoleOutcome::new(&self.role.role_key, &self.role.display_name);
        outcome.attempts = self.attempts;
        outcome.model = self.model;

        match (self.latest, self.failure) {
            (Some(text), None) => {
                outcome.state = if self.degraded {
                    RoleState::Degraded
                } else {
                    RoleState::Succeeded
                };
                outcome.output = Some(text);
            },
            (Some(text), Some(failure)) => {
                outcome.state = RoleState::Degraded;
                outcome.output = Some(text);
                outcome.error_category = failure.error_category;
                outcome.note = failure.note;
            },
            (None, Some(failure)) => {
                outcome = RoleOutcome {
                    attempts: self.attempts,
                    ..failure
                };
            },
            (None, None) => {
                outcome.state = RoleState::Skipped;
                outcome.note = Some("debate ended before this role spoke".to_string());
            },
        }

        RoleReport {
            outcome,
            decisions: self.decisions,
        }
    }
}

/// Requested roles in request order, without duplicates
fn resolve_roles(
    request: &CollaborationRequest,
    mode: CollaborationMode,
    table: &RoleTable,
) -> std::result::Result<Vec<RoleConfig>, CollaborationError> {
    if request.roles.is_empty() {
        return Err(CollaborationError::NoRoles);
    }

    let mut seen = HashSet::new();
    let mut roles = Vec::with_capacity(request.roles.len());
    for key in &request.roles {
        if !seen.insert(key.as_str()) {
            continue;
        }
        let role = table
            .get(key)
            .ok_or_else(|| CollaborationError::UnknownRole(key.clone()))?;
        if !role.enabled {
            return Err(CollaborationError::RoleDisabled(key.clone()));
        }
        roles.push(role.clone());
    }

    if mode == CollaborationMode::Debate && roles.len() < 2 {
        return Err(CollaborationError::DebateNeedsTwoRoles(roles.len()));
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MultiModelError;
    use crate::error_handler::ErrorCategory;
    use crate::registry::{ModelId, ModelSpec};
    use crate::router::RoutingStrategy;
    use agent_llm::{
        CompletionRequest, CompletionResponse, LLMError, LLMProvider, ProviderFactory,
    };
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    mock! {
        pub Provider {}

        #[async_trait]
        impl LLMProvider for Provider {
            async fn complete(&self, request: CompletionRequest) -> agent_llm::Result<CompletionResponse>;
            fn name(&self) -> &str;
        }
    }

    struct MockFactory {
        provider: String,
        client: Arc<dyn LLMProvider>,
    }

    #[async_trait]
    impl ProviderFactory for MockFactory {
        fn provider(&self) -> &str {
            &self.provider
        }

        async fn create(&self) -> agent_llm::Result<Arc<dyn LLMProvider>> {
            Ok(Arc::clone(&self.client))
        }
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::new(vec![
            ModelSpec::new("alpha", "a", dec!(0.01), dec!(0.02)),
            ModelSpec::new("alpha", "b", dec!(0.1), dec!(0.2)),
        ])
        .unwrap()
    }

    fn roles() -> RoleTable {
        RoleTable::new(vec![
            RoleConfig::new("bull", "Bull")
                .allow(ModelId::new("alpha", "a"))
                .allow(ModelId::new("alpha", "b")),
            RoleConfig::new("bear", "Bear")
                .allow(ModelId::new("alpha", "a"))
                .allow(ModelId::new("alpha", "b")),
            RoleConfig::new("retired", "Retired")
                .allow(ModelId::new("alpha", "a"))
                .disabled(),
        ])
        .unwrap()
    }

    fn manager(provider: MockProvider, config: CollaborationConfig) -> MultiModelManager {
        let factory: Arc<dyn ProviderFactory> = Arc::new(MockFactory {
            provider: "alpha".to_string(),
            client: Arc::new(provider),
        });
        let checker = Arc::new(DependencyChecker::new(
            vec![factory],
            Duration::from_secs(60),
            Duration::from_secs(1),
        ));
        let context =
            RoutingContext::new(registry(), roles(), checker, RoutingStrategy::CostFirst).unwrap();
        MultiModelManager::new(Arc::new(context), config)
    }

    fn config() -> CollaborationConfig {
        CollaborationConfig::builder()
            .retry_backoff_base(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_sequential_passes_prior_outputs() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .withf(|req| req.messages[0].text().contains("As the Bull"))
            .times(1)
            .returning(|_| Ok(CompletionResponse::from_text("bullish: margins expanding", 100, 50)));
        provider
            .expect_complete()
            .withf(|req| {
                let text = req.messages[0].text();
                text.contains("As the Bear") && text.contains("margins expanding")
            })
            .times(1)
            .returning(|_| Ok(CompletionResponse::from_text("bearish: valuation stretched", 100, 50)));

        let manager = manager(provider, config());
        let request = CollaborationRequest::builder("600519.SH")
            .roles(["bull", "bear"])
            .build();
        let result = manager.execute_collaborative_analysis(request).await.unwrap();

        assert_eq!(result.status, CollaborationStatus::Success);
        assert_eq!(result.per_role_outputs.len(), 2);
        assert_eq!(result.routing_decisions.len(), 2);
        // cheapest allowed model is a: (100 * 0.01 + 50 * 0.02) / 1000 per call
        assert_eq!(result.total_cost, dec!(0.004));
        assert_eq!(result.outcome("bull").unwrap().cost, dec!(0.002));
    }

    #[tokio::test]
    async fn test_request_validation() {
        let manager = manager(MockProvider::new(), config());

        let empty = CollaborationRequest::builder("X").build();
        assert!(matches!(
            manager.execute_collaborative_analysis(empty).await,
            Err(CollaborationError::NoRoles)
        ));

        let unknown = CollaborationRequest::builder("X").role("oracle").build();
        assert!(matches!(
            manager.execute_collaborative_analysis(unknown).await,
            Err(CollaborationError::UnknownRole(key)) if key == "oracle"
        ));

        let disabled = CollaborationRequest::builder("X").role("retired").build();
        assert!(matches!(
            manager.execute_collaborative_analysis(disabled).await,
            Err(CollaborationError::RoleDisabled(_))
        ));

        let lonely_debate = CollaborationRequest::builder("X")
            .roles(["bull", "bull"])
            .mode(CollaborationMode::Debate)
            .build();
        assert!(matches!(
            manager.execute_collaborative_analysis(lonely_debate).await,
            Err(CollaborationError::DebateNeedsTwoRoles(1))
        ));

        let negative = CollaborationRequest::builder("X")
            .role("bull")
            .budget_cap(dec!(-1))
            .build();
        assert!(matches!(
            manager.execute_collaborative_analysis(negative).await,
            Err(CollaborationError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_auth_error_switches_model() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .withf(|req| req.model == "a")
            .times(1)
            .returning(|_| Err(LLMError::AuthenticationFailed));
        provider
            .expect_complete()
            .withf(|req| req.model == "b")
            .times(1)
            .returning(|_| Ok(CompletionResponse::from_text("fine", 10, 10)));

        let manager = manager(provider, config());
        let request = CollaborationRequest::builder("X").role("bull").build();
        let result = manager.execute_collaborative_analysis(request).await.unwrap();

        let outcome = result.outcome("bull").unwrap();
        assert_eq!(outcome.state, RoleState::Degraded);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.model, Some(ModelId::new("alpha", "b")));
        assert_eq!(outcome.error_category, Some(ErrorCategory::AuthError));
        assert_eq!(result.status, CollaborationStatus::Partial);
        assert!(result.degraded_roles.contains("bull"));
        assert_eq!(result.routing_decisions.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_reply_fails_role_but_is_billed() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .returning(|_| Ok(CompletionResponse::from_text("   ", 1000, 0)));

        let manager = manager(provider, config());
        let request = CollaborationRequest::builder("X").role("bull").build();
        let result = manager.execute_collaborative_analysis(request).await.unwrap();

        assert_eq!(result.status, CollaborationStatus::Failed);
        assert!(result.per_role_outputs.is_empty());
        assert_eq!(result.outcome("bull").unwrap().state, RoleState::Failed);
        assert_eq!(result.outcome("bull").unwrap().attempts, 1);
        // 1000 input tokens on a
        assert_eq!(result.total_cost, dec!(0.01));
    }

    #[tokio::test]
    async fn test_debate_rounds_build_transcript() {
        let mut provider = MockProvider::new();
        provider.expect_complete().times(4).returning(|req| {
            let text = req.messages[0].text();
            let reply = if text.contains("open the debate") {
                "opening"
            } else {
                "rebuttal"
            };
            Ok(CompletionResponse::from_text(reply, 10, 10))
        });

        let manager = manager(provider, config());
        let request = CollaborationRequest::builder("X")
            .roles(["bull", "bear"])
            .mode(CollaborationMode::Debate)
            .build();
        let result = manager.execute_collaborative_analysis(request).await.unwrap();

        assert_eq!(result.debate_transcript.len(), 4);
        assert_eq!(result.debate_transcript[0].text, "opening");
        assert_eq!(result.debate_transcript[1].text, "opening");
        assert_eq!(result.debate_transcript[2].text, "rebuttal");
        assert_eq!(result.debate_transcript[3].round, 2);
        assert_eq!(result.per_role_outputs["bull"], "rebuttal");
        assert_eq!(result.status, CollaborationStatus::Success);
    }

    #[tokio::test]
    async fn test_debate_stops_when_a_turn_fails() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .withf(|req| req.messages[0].text().contains("As the Bull"))
            .returning(|_| Ok(CompletionResponse::from_text("bull case", 10, 10)));
        provider
            .expect_complete()
            .withf(|req| req.messages[0].text().contains("As the Bear"))
            .returning(|_| Err(LLMError::InvalidRequest("prompt rejected".to_string())));

        let manager = manager(provider, config());
        let request = CollaborationRequest::builder("X")
            .roles(["bull", "bear"])
            .mode(CollaborationMode::Debate)
            .build();
        let result = manager.execute_collaborative_analysis(request).await.unwrap();

        assert_eq!(result.debate_transcript.len(), 1);
        assert_eq!(result.outcome("bull").unwrap().state, RoleState::Succeeded);
        assert_eq!(result.outcome("bear").unwrap().state, RoleState::Failed);
        assert_eq!(result.status, CollaborationStatus::Partial);
    }

    #[test]
    fn test_from_config_uses_builtin_tables() {
        let manager = MultiModelManager::from_config(CollaborationConfig::default()).unwrap();
        assert!(manager.context().roles().get("risk_manager").is_some());
        assert!(manager.context().registry().len() > 5);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let config = CollaborationConfig {
            max_tokens: 0,
            ..CollaborationConfig::default()
        };
        assert!(matches!(
            MultiModelManager::from_config(config),
            Err(MultiModelError::ConfigError(_))
        ));
    }
}
