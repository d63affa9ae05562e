//! Error types for routing and collaboration

use std::fmt;
use thiserror::Error;

/// Errors raised while loading the model catalog or the role table
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two catalog entries share the same `(provider, model_name)`
    #[error("Duplicate model in catalog: {0}")]
    DuplicateModel(String),

    /// A model was declared with a negative price
    #[error("Negative cost for model {0}")]
    NegativeCost(String),

    /// Lookup of a model that is not in the catalog
    #[error("Model not found: {provider}/{model}")]
    ModelNotFound {
        provider: String,
        model: String,
    },

    /// A model id that is not of the form `provider/model`
    #[error("Invalid model id '{0}', expected provider/model")]
    InvalidModelId(String),

    /// Two roles share the same key
    #[error("Duplicate role: {0}")]
    DuplicateRole(String),

    /// A role lists the same model twice
    #[error("Role {role} lists {model} more than once")]
    DuplicateAllowedModel {
        role: String,
        model: String,
    },

    /// A role locks a model it is not allowed to use
    #[error("Role {role} locks {model}, which is not in its allowed models")]
    LockedModelNotAllowed {
        role: String,
        model: String,
    },

    /// A role references a model the catalog does not know
    #[error("Role {role} references unknown model {model}")]
    UnknownModelForRole {
        role: String,
        model: String,
    },

    /// Reading or parsing a catalog/role file failed
    #[error("Failed to load {what}: {reason}")]
    Load {
        what: &'static str,
        reason: String,
    },
}

/// Why no candidate model survived filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoCandidateReason {
    /// The role has an empty `allowed_models` list
    EmptyAllowList,
    /// Every allowed model is disabled or missing from the catalog
    AllDisabled,
    /// No allowed model belongs to an available provider
    NoProviderAvailable,
    /// Every candidate has already been tried in this run
    AllTried,
    /// The role is locked to one model and may not fall back
    Locked,
}

impl fmt::Display for NoCandidateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EmptyAllowList => "allowed model list is empty",
            Self::AllDisabled => "all allowed models are disabled",
            Self::NoProviderAvailable => "no provider of an allowed model is available",
            Self::AllTried => "all allowed models were already tried",
            Self::Locked => "role is locked to a single model",
        };
        f.write_str(text)
    }
}

/// Errors returned by model selection
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No allowed model can serve the role
    #[error("No available model for role {role}: {reason}")]
    NoAvailableModel {
        role: String,
        reason: NoCandidateReason,
    },

    /// The role's locked model cannot be used right now
    #[error("Locked model {model} for role {role} is unavailable")]
    LockedModelUnavailable {
        role: String,
        model: String,
    },

    /// The role key is not in the role table
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// The role exists but is disabled
    #[error("Role is disabled: {0}")]
    RoleDisabled(String),
}

/// Errors that abort a whole collaboration run
#[derive(Debug, Error)]
pub enum CollaborationError {
    /// The request names no roles
    #[error("Collaboration request has no roles")]
    NoRoles,

    /// A requested role is unknown
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// A requested role is disabled
    #[error("Role is disabled: {0}")]
    RoleDisabled(String),

    /// Debate mode needs at least two participants
    #[error("Debate mode needs at least 2 roles, got {0}")]
    DebateNeedsTwoRoles(usize),

    /// The request itself is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The deadline passed before any role produced output
    #[error("Collaboration timed out after {elapsed_secs:.1}s with no output")]
    TimedOut {
        elapsed_secs: f64,
    },
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum MultiModelError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Collaboration(#[from] CollaborationError),

    /// Provider error surfaced outside a role run
    #[error("LLM error: {0}")]
    Llm(#[from] agent_llm::LLMError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, MultiModelError>;

/// Convert anyhow::Error to MultiModelError
impl From<anyhow::Error> for MultiModelError {
    fn from(err: anyhow::Error) -> Self {
        MultiModelError::Other(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RoutingError::NoAvailableModel {
            role: "news_hunter".to_string(),
            reason: NoCandidateReason::EmptyAllowList,
        };
        assert_eq!(
            err.to_string(),
            "No available model for role news_hunter: allowed model list is empty"
        );

        let err = RegistryError::ModelNotFound {
            provider: "dashscope".to_string(),
            model: "qwen-max".to_string(),
        };
        assert_eq!(err.to_string(), "Model not found: dashscope/qwen-max");
    }

    #[test]
    fn test_error_conversion() {
        let err: MultiModelError = CollaborationError::NoRoles.into();
        assert!(matches!(err, MultiModelError::Collaboration(CollaborationError::NoRoles)));

        let err: MultiModelError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
    }
}
