//! Multi-model routing, collaboration and budget layer
//!
//! This crate lets several analyst roles work on one stock-analysis request,
//! each served by the model the router picks for it. It includes:
//!
//! - A model catalog with per-1K-token pricing and capability tags
//! - A role table binding each role to its allowed (or locked) models
//! - Provider availability probing with a TTL cache
//! - Routing strategies: cost-first, balanced, performance-first, quality-first, round-robin
//! - Per-session budget tracking with reservations for in-flight calls
//! - Error classification into user-facing categories and remediations
//! - Sequential, parallel and debate collaboration with per-role outcomes
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_multimodel::{CollaborationConfig, CollaborationRequest, MultiModelManager};
//! use rust_decimal_macros::dec;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CollaborationConfig::default().with_env_overrides()?;
//!     let manager = MultiModelManager::from_config(config)?;
//!
//!     let request = CollaborationRequest::builder("600519.SH")
//!         .roles(["fundamental_expert", "risk_manager", "chief_decision_officer"])
//!         .budget_cap(dec!(2.0))
//!         .build();
//!
//!     let result = manager.execute_collaborative_analysis(request).await?;
//!     println!("{}", result.report());
//!     Ok(())
//! }
//! ```

pub mod budget;
pub mod config;
pub mod dependency;
pub mod error;
pub mod error_handler;
pub mod manager;
pub mod prompts;
pub mod registry;
pub mod router;
pub mod token_estimator;

// Re-export main types
pub use budget::{BudgetError, BudgetTracker, CallRecord, Reservation, SessionBudget};
pub use config::{CollaborationConfig, CollaborationConfigBuilder, ResponseLanguage};
pub use dependency::DependencyChecker;
pub use error::{
    CollaborationError, MultiModelError, NoCandidateReason, RegistryError, Result, RoutingError,
};
pub use error_handler::{ErrorCategory, Remediation, UserFacingError, UserFriendlyErrorHandler};
pub use manager::{
    CollaborationMode, CollaborationRequest, CollaborationRequestBuilder, CollaborationResult,
    CollaborationStatus, DebateTurn, MultiModelManager, RoleOutcome, RoleState,
};
pub use registry::{ModelId, ModelRegistry, ModelSpec, RoleConfig, RoleTable};
pub use router::{RoutingContext, RoutingDecision, RoutingEngine, RoutingStrategy};
