//! Model catalog and role table
//!
//! The catalog is loaded once (built-in or from a JSON file) and treated as
//! read-only afterwards. Hot reload builds a fresh [`ModelRegistry`] and swaps
//! it in whole; see [`crate::router::RoutingContext::reload_registry`].

mod builtin;
mod roles;

pub use builtin::{builtin_models, builtin_roles};
pub use roles::{RoleConfig, RoleTable};

use crate::error::RegistryError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Well-known capability tags
pub mod tags {
    pub const REASONING: &str = "reasoning";
    pub const LONG_CONTEXT: &str = "long-context";
    pub const FUNCTION_CALLING: &str = "function-calling";
    pub const FAST: &str = "fast";
    pub const CHINESE: &str = "chinese";
    pub const CODING: &str = "coding";
}

/// `provider/model_name`, split on the first `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId {
    pub provider: String,
    pub model_name: String,
}

impl ModelId {
    pub fn new(provider: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model_name)
    }
}

impl FromStr for ModelId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self::new(provider, model))
            },
            _ => Err(RegistryError::InvalidModelId(s.to_string())),
        }
    }
}

impl TryFrom<String> for ModelId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.to_string()
    }
}

fn default_enabled() -> bool {
    true
}

/// One model offered by one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: String,
    pub model_name: String,

    /// Price per 1000 input tokens
    pub cost_per_1k_input: Decimal,

    /// Price per 1000 output tokens
    pub cost_per_1k_output: Decimal,

    /// Context window in tokens
    pub context_length: u32,

    #[serde(default)]
    pub capability_tags: BTreeSet<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ModelSpec {
    pub fn new(
        provider: impl Into<String>,
        model_name: impl Into<String>,
        cost_per_1k_input: Decimal,
        cost_per_1k_output: Decimal,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
            cost_per_1k_input,
            cost_per_1k_output,
            context_length: 32_768,
            capability_tags: BTreeSet::new(),
            enabled: true,
        }
    }

    pub fn with_context_length(mut self, context_length: u32) -> Self {
        self.context_length = context_length;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capability_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn id(&self) -> ModelId {
        ModelId::new(&self.provider, &self.model_name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.capability_tags.contains(tag)
    }

    /// Input plus output price per 1K tokens, the figure `cost_first` ranks by
    pub fn total_cost_per_1k(&self) -> Decimal {
        self.cost_per_1k_input + self.cost_per_1k_output
    }

    /// Cost of a call: `in/1000 * cost_in + out/1000 * cost_out`
    pub fn cost_for(&self, input_tokens: usize, output_tokens: usize) -> Decimal {
        (Decimal::from(input_tokens) * self.cost_per_1k_input
            + Decimal::from(output_tokens) * self.cost_per_1k_output)
            / dec!(1000)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<ModelSpec>,
}

/// Read-only catalog of every known model
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelSpec>,
    index: HashMap<ModelId, usize>,
}

impl ModelRegistry {
    /// Build a catalog, rejecting duplicates and negative prices
    pub fn new(models: Vec<ModelSpec>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(models.len());
        for (position, spec) in models.iter().enumerate() {
            let id = spec.id();
            if spec.cost_per_1k_input < Decimal::ZERO || spec.cost_per_1k_output < Decimal::ZERO {
                return Err(RegistryError::NegativeCost(id.to_string()));
            }
            if index.insert(id.clone(), position).is_some() {
                return Err(RegistryError::DuplicateModel(id.to_string()));
            }
        }
        Ok(Self { models, index })
    }

    /// The catalog shipped with the crate
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(builtin_models())
    }

    /// Load a `{"models": [...]}` catalog file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let file: CatalogFile =
            agent_utils::load_json_file(path).map_err(|e| RegistryError::Load {
                what: "model catalog",
                reason: format!("{e:#}"),
            })?;
        Self::new(file.models)
    }

    pub fn get_models_for_provider(&self, provider: &str) -> Vec<&ModelSpec> {
        self.models.iter().filter(|m| m.provider == provider).collect()
    }

    pub fn get_model(&self, provider: &str, model_name: &str) -> Result<&ModelSpec, RegistryError> {
        self.get(&ModelId::new(provider, model_name))
            .ok_or_else(|| RegistryError::ModelNotFound {
                provider: provider.to_string(),
                model: model_name.to_string(),
            })
    }

    pub fn get(&self, id: &ModelId) -> Option<&ModelSpec> {
        self.index.get(id).map(|&i| &self.models[i])
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.index.contains_key(id)
    }

    pub fn list_all(&self) -> &[ModelSpec] {
        &self.models
    }

    /// Distinct provider names in the catalog
    pub fn providers(&self) -> BTreeSet<&str> {
        self.models.iter().map(|m| m.provider.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
