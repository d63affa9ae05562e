//! Request, per-role outcome and aggregate result types

use crate::budget::SessionBudget;
use crate::error::MultiModelError;
use crate::error_handler::ErrorCategory;
use crate::registry::ModelId;
use crate::router::{RoutingDecision, RoutingStrategy};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};
use std::str::FromStr;

/// How the requested roles work together
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    /// One role after another; later roles see earlier outputs
    #[default]
    Sequential,
    /// All roles at once, independently
    Parallel,
    /// Roles argue over several rounds
    Debate,
}

impl CollaborationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Debate => "debate",
        }
    }
}

impl fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollaborationMode {
    type Err = MultiModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "debate" => Ok(Self::Debate),
            other => Err(MultiModelError::ConfigError(format!(
                "unknown collaboration mode '{other}'"
            ))),
        }
    }
}

/// A collaborative analysis job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationRequest {
    /// Security or topic under analysis, e.g. `600519.SH`
    pub target: String,
    pub analysis_date: NaiveDate,

    /// Extra facts passed to every role, e.g. sector or latest price
    #[serde(default)]
    pub context: BTreeMap<String, String>,

    /// Role keys, in execution order
    pub roles: Vec<String>,

    /// Falls back to the configured default mode
    #[serde(default)]
    pub mode: Option<CollaborationMode>,

    /// Falls back to the routing context's default strategy
    #[serde(default)]
    pub strategy: Option<RoutingStrategy>,

    /// Session spending limit; zero means unlimited
    #[serde(default)]
    pub budget_cap: Decimal,

    /// Generated when absent
    #[serde(default)]
    pub session_id: Option<String>,
}

impl CollaborationRequest {
    pub fn builder(target: impl Into<String>) -> CollaborationRequestBuilder {
        CollaborationRequestBuilder::new(target)
    }
}

/// Builder for CollaborationRequest
#[derive(Debug)]
pub struct CollaborationRequestBuilder {
    request: CollaborationRequest,
}

impl CollaborationRequestBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            request: CollaborationRequest {
                target: target.into(),
                analysis_date: Utc::now().date_naive(),
                context: BTreeMap::new(),
                roles: Vec::new(),
                mode: None,
                strategy: None,
                budget_cap: Decimal::ZERO,
                session_id: None,
            },
        }
    }

    pub fn analysis_date(mut self, date: NaiveDate) -> Self {
        self.request.analysis_date = date;
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.context.insert(key.into(), value.into());
        self
    }

    pub fn role(mut self, role_key: impl Into<String>) -> Self {
        self.request.roles.push(role_key.into());
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn mode(mut self, mode: CollaborationMode) -> Self {
        self.request.mode = Some(mode);
        self
    }

    pub fn strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.request.strategy = Some(strategy);
        self
    }

    pub fn budget_cap(mut self, cap: Decimal) -> Self {
        self.request.budget_cap = cap;
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.request.session_id = Some(session_id.into());
        self
    }

    pub fn build(self) -> CollaborationRequest {
        self.request
    }
}

/// Lifecycle of one role within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleState {
    Pending,
    Running,
    /// Primary model answered
    Succeeded,
    /// Answered after a retry or a model switch
    Degraded,
    /// Not run: budget exhausted or deadline passed
    Skipped,
    Failed,
}

impl RoleState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Degraded => "degraded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleOutcome {
    pub role_key: String,
    pub display_name: String,
    pub state: RoleState,

    /// Present for `Succeeded` and `Degraded`
    pub output: Option<String>,

    /// Model that produced the output, or the last one tried
    pub model: Option<ModelId>,

    /// Provider calls made for this role
    pub attempts: u32,

    /// Sum of this role's billed calls
    pub cost: Decimal,

    pub error_category: Option<ErrorCategory>,

    /// User-facing explanation for anything other than `Succeeded`
    pub note: Option<String>,
}

impl RoleOutcome {
    pub fn new(role_key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            role_key: role_key.into(),
            display_name: display_name.into(),
            state: RoleState::Pending,
            output: None,
            model: None,
            attempts: 0,
            cost: Decimal::ZERO,
            error_category: None,
            note: None,
        }
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }
}

/// Aggregate status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationStatus {
    /// Every role succeeded on its primary model
    Success,
    /// Some output, but at least one role degraded, skipped or failed
    Partial,
    /// No role produced output
    Failed,
}

impl CollaborationStatus {
    /// `Failed` iff nothing was produced, `Success` iff every role succeeded
    pub fn from_outcomes(outcomes: &[RoleOutcome]) -> Self {
        if !outcomes.iter().any(RoleOutcome::has_output) {
            Self::Failed
        } else if outcomes.iter().all(|o| o.state == RoleState::Succeeded) {
            Self::Success
        } else {
            Self::Partial
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CollaborationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One argument in a debate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateTurn {
    pub round: u32,
    pub role_key: String,
    pub model: Option<ModelId>,
    pub text: String,
}

/// Everything a collaboration run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationResult {
    pub session_id: String,
    pub target: String,
    pub analysis_date: NaiveDate,
    pub mode: CollaborationMode,
    pub strategy: RoutingStrategy,

    /// Final text per role, keyed by role key
    pub per_role_outputs: BTreeMap<String, String>,

    /// One entry per requested role, in request order
    pub role_outcomes: Vec<RoleOutcome>,

    pub routing_decisions: Vec<RoutingDecision>,
    pub debate_transcript: Vec<DebateTurn>,
    pub total_cost: Decimal,
    pub total_time_seconds: f64,

    /// Every role that did not succeed on its primary model
    pub degraded_roles: BTreeSet<String>,

    pub status: CollaborationStatus,
    pub budget: SessionBudget,
}

impl CollaborationResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        request: &CollaborationRequest,
        mode: CollaborationMode,
        strategy: RoutingStrategy,
        mut role_outcomes: Vec<RoleOutcome>,
        routing_decisions: Vec<RoutingDecision>,
        debate_transcript: Vec<DebateTurn>,
        budget: SessionBudget,
        total_time_seconds: f64,
    ) -> Self {
        for outcome in &mut role_outcomes {
            outcome.cost = budget
                .per_call_records
                .iter()
                .filter(|r| r.role == outcome.role_key)
                .map(|r| r.cost)
                .sum();
        }

        let per_role_outputs = role_outcomes
            .iter()
            .filter_map(|o| o.output.clone().map(|text| (o.role_key.clone(), text)))
            .collect();
        let degraded_roles = role_outcomes
            .iter()
            .filter(|o| o.state != RoleState::Succeeded)
            .map(|o| o.role_key.clone())
            .collect();
        let status = CollaborationStatus::from_outcomes(&role_outcomes);

        Self {
            session_id: budget.session_id.clone(),
            target: request.target.clone(),
            analysis_date: request.analysis_date,
            mode,
            strategy,
            per_role_outputs,
            role_outcomes,
            routing_decisions,
            debate_transcript,
            total_cost: budget.spent_so_far,
            total_time_seconds,
            degraded_roles,
            status,
            budget,
        }
    }

    pub fn outcome(&self, role_key: &str) -> Option<&RoleOutcome> {
        self.role_outcomes.iter().find(|o| o.role_key == role_key)
    }

    pub fn is_success(&self) -> bool {
        self.status == CollaborationStatus::Success
    }

    /// Markdown report of the run
    pub fn report(&self) -> String {
        let mut report = String::new();

        let _ = writeln!(report, "# Collaborative Analysis: {}\n", self.target);
        let _ = writeln!(
            report,
            "- Date: {}\n- Mode: {} | Strategy: {} | Status: {}\n- Cost: {} | Time: {:.1}s | Session: {}\n",
            self.analysis_date,
            self.mode,
            self.strategy,
            self.status,
            self.total_cost.round_dp(4),
            self.total_time_seconds,
            self.session_id
        );

        for outcome in &self.role_outcomes {
            let _ = writeln!(report, "## {}\n", outcome.display_name);

            let model = outcome
                .model
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            let marker = match outcome.state {
                RoleState::Succeeded => "✅",
                RoleState::Degraded => "⚠️",
                _ => "❌",
            };
            let _ = writeln!(report, "_{} {} · model: {}_\n", marker, outcome.state, model);

            if let Some(note) = &outcome.note {
                let _ = writeln!(report, "> {note}\n");
            }
            if let Some(output) = &outcome.output {
                report.push_str(output);
                report.push_str("\n\n");
            }
        }

        if !self.debate_transcript.is_empty() {
            report.push_str("## Debate Transcript\n\n");
            for turn in &self.debate_transcript {
                let _ = writeln!(report, "### Round {} · {}\n\n{}\n", turn.round, turn.role_key, turn.text);
            }
        }

        report
    }
}
