//! Model selection for analyst roles
//!
//! Candidates for a role are its `allowed_models`, in order, that are present
//! in the catalog, enabled, and served by an available provider. A strategy
//! then picks one candidate; ties always go to the earlier position in
//! `allowed_models`. A locked role bypasses the strategy and fails hard when
//! its locked model is not a candidate.

use crate::dependency::DependencyChecker;
use crate::error::{MultiModelError, NoCandidateReason, RegistryError, RoutingError};
use crate::registry::{ModelId, ModelRegistry, ModelSpec, RoleConfig, RoleTable, tags};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Tag ranking for `performance_first`, best first
pub const PERFORMANCE_TAG_PRIORITY: &[&str] =
    &[tags::FAST, tags::LONG_CONTEXT, tags::FUNCTION_CALLING];

/// Tag ranking for `quality_first`, best first
pub const QUALITY_TAG_PRIORITY: &[&str] =
    &[tags::REASONING, tags::LONG_CONTEXT, tags::FUNCTION_CALLING];

/// Weight of normalized cost against normalized quality in `balanced`
pub const BALANCED_COST_WEIGHT: Decimal = dec!(0.5);

/// How a model is picked among a role's candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Lowest input plus output price
    CostFirst,
    /// Quality against cost, see [`BALANCED_COST_WEIGHT`]
    #[default]
    Balanced,
    /// Best rank in [`PERFORMANCE_TAG_PRIORITY`]
    PerformanceFirst,
    /// Best rank in [`QUALITY_TAG_PRIORITY`]
    QualityFirst,
    /// Cycle through `allowed_models` per role
    RoundRobin,
}

impl RoutingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CostFirst => "cost_first",
            Self::Balanced => "balanced",
            Self::PerformanceFirst => "performance_first",
            Self::QualityFirst => "quality_first",
            Self::RoundRobin => "round_robin",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = MultiModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "cost_first" => Ok(Self::CostFirst),
            "balanced" => Ok(Self::Balanced),
            "performance_first" => Ok(Self::PerformanceFirst),
            "quality_first" => Ok(Self::QualityFirst),
            "round_robin" => Ok(Self::RoundRobin),
            other => Err(MultiModelError::ConfigError(format!(
                "unknown routing strategy '{other}'"
            ))),
        }
    }
}

/// Outcome of one model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub role_key: String,
    pub selected_model: ModelId,
    pub strategy_used: RoutingStrategy,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl RoutingDecision {
    fn new(
        role_key: &str,
        selected_model: ModelId,
        strategy_used: RoutingStrategy,
        reason: String,
    ) -> Self {
        Self {
            role_key: role_key.to_string(),
            selected_model,
            strategy_used,
            reason,
            timestamp: Utc::now(),
        }
    }
}

/// Catalog, role table, availability and default strategy, shared by all runs
pub struct RoutingContext {
    registry: RwLock<Arc<ModelRegistry>>,
    roles: RwLock<Arc<RoleTable>>,
    checker: Arc<DependencyChecker>,
    default_strategy: RoutingStrategy,
}

impl RoutingContext {
    /// Build a context; every role's models must exist in the catalog
    pub fn new(
        registry: ModelRegistry,
        roles: RoleTable,
        checker: Arc<DependencyChecker>,
        default_strategy: RoutingStrategy,
    ) -> Result<Self, RegistryError> {
        roles.validate_against(&registry)?;
        Ok(Self {
            registry: RwLock::new(Arc::new(registry)),
            roles: RwLock::new(Arc::new(roles)),
            checker,
            default_strategy,
        })
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn roles(&self) -> Arc<RoleTable> {
        Arc::clone(&self.roles.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn checker(&self) -> &Arc<DependencyChecker> {
        &self.checker
    }

    pub fn default_strategy(&self) -> RoutingStrategy {
        self.default_strategy
    }

    /// Swap in a new catalog; runs already started keep their snapshot
    pub fn reload_registry(&self, registry: ModelRegistry) -> Result<(), RegistryError> {
        self.roles().validate_against(&registry)?;
        let count = registry.len();
        *self.registry.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(registry);
        info!("Model catalog reloaded with {} models", count);
        Ok(())
    }

    /// Swap in a new role table
    pub fn reload_roles(&self, roles: RoleTable) -> Result<(), RegistryError> {
        roles.validate_against(&self.registry())?;
        let count = roles.len();
        *self.roles.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(roles);
        info!("Role table reloaded with {} roles", count);
        Ok(())
    }

    /// Engine bound to the current catalog and role table
    pub fn engine(&self) -> RoutingEngine {
        RoutingEngine {
            registry: self.registry(),
            roles: self.roles(),
            checker: Arc::clone(&self.checker),
            rotation: Mutex::new(HashMap::new()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    /// Index in the role's `allowed_models`
    position: usize,
    spec: &'a ModelSpec,
}

/// Per-run model selector over a fixed catalog snapshot
pub struct RoutingEngine {
    registry: Arc<ModelRegistry>,
    roles: Arc<RoleTable>,
    checker: Arc<DependencyChecker>,
    rotation: Mutex<HashMap<String, usize>>,
}

impl RoutingEngine {
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Enabled role by key
    pub fn role(&self, role_key: &str) -> Result<&RoleConfig, RoutingError> {
        let role = self
            .roles
            .get(role_key)
            .ok_or_else(|| RoutingError::UnknownRole(role_key.to_string()))?;
        if !role.enabled {
            return Err(RoutingError::RoleDisabled(role_key.to_string()));
        }
        Ok(role)
    }

    /// Pick the model for `role_key`
    pub async fn select_model(
        &self,
        role_key: &str,
        strategy: RoutingStrategy,
    ) -> Result<RoutingDecision, RoutingError> {
        let role = self.role(role_key)?;

        if let Some(locked) = &role.locked_model {
            return self.select_locked(role, locked, strategy).await;
        }

        let candidates = self.candidates(role).await?;
        let index = match strategy {
            RoutingStrategy::CostFirst => pick_cost_first(&candidates),
            RoutingStrategy::Balanced => pick_balanced(&candidates),
            RoutingStrategy::PerformanceFirst => {
                pick_by_tag_priority(&candidates, PERFORMANCE_TAG_PRIORITY)
            },
            RoutingStrategy::QualityFirst => pick_by_tag_priority(&candidates, QUALITY_TAG_PRIORITY),
            RoutingStrategy::RoundRobin => self.pick_round_robin(role, &candidates),
        };
        let chosen = candidates[index];

        let reason = format!(
            "{} picked {} (position {} of {}, {} candidates)",
            strategy,
            chosen.spec.id(),
            chosen.position + 1,
            role.allowed_models.len(),
            candidates.len()
        );
        debug!("Role {}: {}", role_key, reason);
        Ok(RoutingDecision::new(role_key, chosen.spec.id(), strategy, reason))
    }

    /// Pick an untried model for a retry or a model switch.
    /// Never leaves `allowed_models` and never replaces a locked model.
    pub async fn select_fallback(
        &self,
        role_key: &str,
        tried: &HashSet<ModelId>,
        prefer_cheaper: bool,
    ) -> Result<RoutingDecision, RoutingError> {
        let role = self.role(role_key)?;
        if role.is_locked() {
            return Err(RoutingError::NoAvailableModel {
                role: role_key.to_string(),
                reason: NoCandidateReason::Locked,
            });
        }

        let untried: Vec<_> = self
            .candidates(role)
            .await?
            .into_iter()
            .filter(|c| !tried.contains(&c.spec.id()))
            .collect();
        if untried.is_empty() {
            return Err(RoutingError::NoAvailableModel {
                role: role_key.to_string(),
                reason: NoCandidateReason::AllTried,
            });
        }

        let (index, how) = if prefer_cheaper {
            (pick_cost_first(&untried), "cheapest untried")
        } else {
            (0, "next untried")
        };
        let chosen = untried[index];
        let reason = format!("fallback to {} model {}", how, chosen.spec.id());
        warn!("Role {}: {}", role_key, reason);

        let strategy = if prefer_cheaper {
            RoutingStrategy::CostFirst
        } else {
            RoutingStrategy::RoundRobin
        };
        Ok(RoutingDecision::new(role_key, chosen.spec.id(), strategy, reason))
    }

    async fn select_locked(
        &self,
        role: &RoleConfig,
        locked: &ModelId,
        strategy: RoutingStrategy,
    ) -> Result<RoutingDecision, RoutingError> {
        let usable = match self.registry.get(locked) {
            Some(spec) if spec.enabled => self.checker.is_provider_available(&spec.provider).await,
            _ => false,
        };
        if !usable {
            warn!("Role {} is locked to unavailable model {}", role.role_key, locked);
            return Err(RoutingError::LockedModelUnavailable {
                role: role.role_key.clone(),
                model: locked.to_string(),
            });
        }

        let reason = format!("locked to {locked}");
        debug!("Role {}: {}", role.role_key, reason);
        Ok(RoutingDecision::new(&role.role_key, locked.clone(), strategy, reason))
    }

    async fn candidates<'a>(&'a self, role: &RoleConfig) -> Result<Vec<Candidate<'a>>, RoutingError> {
        let no_model = |reason| RoutingError::NoAvailableModel {
            role: role.role_key.clone(),
            reason,
        };

        if role.allowed_models.is_empty() {
            return Err(no_model(NoCandidateReason::EmptyAllowList));
        }

        let enabled: Vec<_> = role
            .allowed_models
            .iter()
            .enumerate()
            .filter_map(|(position, id)| match self.registry.get(id) {
                Some(spec) if spec.enabled => Some(Candidate { position, spec }),
                Some(_) => None,
                None => {
                    warn!("Role {} allows {}, which is not in the catalog", role.role_key, id);
                    None
                },
            })
            .collect();
        if enabled.is_empty() {
            return Err(no_model(NoCandidateReason::AllDisabled));
        }

        let mut available = Vec::with_capacity(enabled.len());
        for candidate in enabled {
            if self.checker.is_provider_available(&candidate.spec.provider).await {
                available.push(candidate);
            }
        }
        if available.is_empty() {
            return Err(no_model(NoCandidateReason::NoProviderAvailable));
        }

        Ok(available)
    }

    fn pick_round_robin(&self, role: &RoleConfig, candidates: &[Candidate<'_>]) -> usize {
        let mut rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let slots = role.allowed_models.len();
        let start = rotation.get(&role.role_key).copied().unwrap_or(0);

        for step in 0..slots {
            let position = (start + step) % slots;
            if let Some(index) = candidates.iter().position(|c| c.position == position) {
                rotation.insert(role.role_key.clone(), position + 1);
                return index;
            }
        }
        0
    }
}

/// Lowest total price; the first one wins a tie
fn pick_cost_first(candidates: &[Candidate<'_>]) -> usize {
    let mut best = 0;
    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        if candidate.spec.total_cost_per_1k() < candidates[best].spec.total_cost_per_1k() {
            best = index;
        }
    }
    best
}

/// Best (lowest) rank of any tag in `priority`; models without one rank last
fn pick_by_tag_priority(candidates: &[Candidate<'_>], priority: &[&str]) -> usize {
    let rank = |spec: &ModelSpec| {
        priority
            .iter()
            .position(|tag| spec.has_tag(tag))
            .unwrap_or(priority.len())
    };

    let mut best = 0;
    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        if rank(candidate.spec) < rank(candidates[best].spec) {
            best = index;
        }
    }
    best
}

/// `quality - BALANCED_COST_WEIGHT * cost`, both normalized to [0, 1]
fn balanced_score(spec: &ModelSpec, max_tags: usize, max_cost: Decimal) -> Decimal {
    let quality = if max_tags == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(spec.capability_tags.len()) / Decimal::from(max_tags)
    };
    let cost = if max_cost.is_zero() {
        Decimal::ZERO
    } else {
        spec.total_cost_per_1k() / max_cost
    };
    quality - BALANCED_COST_WEIGHT * cost
}

fn pick_balanced(candidates: &[Candidate<'_>]) -> usize {
    let max_tags = candidates
        .iter()
        .map(|c| c.spec.capability_tags.len())
        .max()
        .unwrap_or(0);
    let max_cost = candidates
        .iter()
        .map(|c| c.spec.total_cost_per_1k())
        .max()
        .unwrap_or(Decimal::ZERO);

    let mut best = 0;
    let mut best_score = balanced_score(candidates[0].spec, max_tags, max_cost);
    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        let score = balanced_score(candidate.spec, max_tags, max_cost);
        if score > best_score {
            best = index;
            best_score = score;
        }
    }
    best
}
