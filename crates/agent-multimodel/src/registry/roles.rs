//! Role table: which models each analyst role may use

use super::{ModelId, ModelRegistry, builtin_roles};
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

fn default_enabled() -> bool {
    true
}

/// Configuration of one analyst role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub role_key: String,
    pub display_name: String,

    /// Candidate models, most preferred first
    pub allowed_models: Vec<ModelId>,

    /// Pins the role to one model; must also appear in `allowed_models`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_model: Option<ModelId>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Replaces the built-in system prompt for this role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Overrides the configured `max_tokens` for this role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl RoleConfig {
    pub fn new(role_key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            role_key: role_key.into(),
            display_name: display_name.into(),
            allowed_models: Vec::new(),
            locked_model: None,
            enabled: true,
            system_prompt: None,
            max_tokens: None,
        }
    }

    pub fn allow(mut self, model: ModelId) -> Self {
        self.allowed_models.push(model);
        self
    }

    pub fn with_allowed_models(mut self, models: Vec<ModelId>) -> Self {
        self.allowed_models = models;
        self
    }

    pub fn locked_to(mut self, model: ModelId) -> Self {
        self.locked_model = Some(model);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_locked(&self) -> bool {
        self.locked_model.is_some()
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::with_capacity(self.allowed_models.len());
        for model in &self.allowed_models {
            if !seen.insert(model) {
                return Err(RegistryError::DuplicateAllowedModel {
                    role: self.role_key.clone(),
                    model: model.to_string(),
                });
            }
        }

        match &self.locked_model {
            Some(locked) if !seen.contains(locked) => Err(RegistryError::LockedModelNotAllowed {
                role: self.role_key.clone(),
                model: locked.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoleFile {
    roles: Vec<RoleConfig>,
}

/// Ordered set of role configurations keyed by `role_key`
#[derive(Debug, Clone)]
pub struct RoleTable {
    roles: Vec<RoleConfig>,
    index: HashMap<String, usize>,
}

impl RoleTable {
    /// Build a table, rejecting duplicate keys and locks outside the allow list
    pub fn new(roles: Vec<RoleConfig>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(roles.len());
        for (position, role) in roles.iter().enumerate() {
            role.validate()?;
            if index.insert(role.role_key.clone(), position).is_some() {
                return Err(RegistryError::DuplicateRole(role.role_key.clone()));
            }
        }
        Ok(Self { roles, index })
    }

    /// The stock-analysis roles shipped with the crate
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(builtin_roles())
    }

    /// Load a `{"roles": [...]}` role file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let file: RoleFile = agent_utils::load_json_file(path).map_err(|e| RegistryError::Load {
            what: "role table",
            reason: format!("{e:#}"),
        })?;
        Self::new(file.roles)
    }

    /// Check that every referenced model exists in `registry`
    pub fn validate_against(&self, registry: &ModelRegistry) -> Result<(), RegistryError> {
        for role in &self.roles {
            if let Some(model) = role.allowed_models.iter().find(|m| !registry.contains(m)) {
                return Err(RegistryError::UnknownModelForRole {
                    role: role.role_key.clone(),
                    model: model.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, role_key: &str) -> Option<&RoleConfig> {
        self.index.get(role_key).map(|&i| &self.roles[i])
    }

    pub fn roles(&self) -> &[RoleConfig] {
        &self.roles
    }

    /// Keys of enabled roles, in table order
    pub fn enabled_keys(&self) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.role_key.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn id(s: &str) -> ModelId {
        s.parse().unwrap()
    }

    #[test]
    fn test_locked_model_must_be_allowed() {
        let role = RoleConfig::new("risk_manager", "Risk Manager")
            .allow(id("deepseek/deepseek-chat"))
            .locked_to(id("openai/gpt-4o"));

        let result = RoleTable::new(vec![role]);
        assert!(matches!(
            result,
            Err(RegistryError::LockedModelNotAllowed { role, model })
                if role == "risk_manager" && model == "openai/gpt-4o"
        ));
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let roles = vec![
            RoleConfig::new("news_hunter", "News Hunter"),
            RoleConfig::new("news_hunter", "News Hunter 2"),
        ];
        assert!(matches!(RoleTable::new(roles), Err(RegistryError::DuplicateRole(_))));
    }

    #[test]
    fn test_duplicate_allowed_model_rejected() {
        let role = RoleConfig::new("news_hunter", "News Hunter")
            .allow(id("dashscope/qwen-plus"))
            .allow(id("dashscope/qwen-plus"));
        assert!(matches!(
            RoleTable::new(vec![role]),
            Err(RegistryError::DuplicateAllowedModel { .. })
        ));
    }

    #[test]
    fn test_empty_allow_list_is_loadable() {
        let table = RoleTable::new(vec![RoleConfig::new("sentiment_analyst", "Sentiment")]).unwrap();
        assert!(table.get("sentiment_analyst").unwrap().allowed_models.is_empty());
    }

    #[test]
    fn test_builtin_roles_match_catalog() {
        let table = RoleTable::builtin().unwrap();
        assert_eq!(table.len(), builtin_roles().len());
        assert!(table.validate_against(&ModelRegistry::builtin().unwrap()).is_ok());
        assert!(table.get("chief_decision_officer").is_some());
    }

    #[test]
    fn test_validate_against_unknown_model() {
        let table = RoleTable::new(vec![
            RoleConfig::new("technical_analyst", "Technical").allow(id("nobody/ghost-1")),
        ])
        .unwrap();
        assert!(matches!(
            table.validate_against(&ModelRegistry::builtin().unwrap()),
            Err(RegistryError::UnknownModelForRole { .. })
        ));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"roles": [
                {{"role_key": "risk_manager", "display_name": "Risk Manager",
                  "allowed_models": ["deepseek/deepseek-reasoner", "dashscope/qwen-max"],
                  "locked_model": "dashscope/qwen-max", "max_tokens": 800}}
            ]}}"#
        )
        .unwrap();

        let table = RoleTable::from_json_file(file.path()).unwrap();
        let role = table.get("risk_manager").unwrap();
        assert!(role.enabled);
        assert_eq!(role.locked_model, Some(id("dashscope/qwen-max")));
        assert_eq!(role.max_tokens, Some(800));
        assert_eq!(table.enabled_keys(), vec!["risk_manager"]);
    }
}
