//! Configuration file and environment helpers

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;
use std::env::VarError;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Load and deserialize a JSON configuration file
pub fn load_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Read and parse an environment variable.
///
/// Unset or blank yields `Ok(None)`; a value that does not parse is an error
/// naming the variable.
pub fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = match std::env::var(name) {
        Ok(raw) => raw,
        Err(VarError::NotPresent) => return Ok(None),
        Err(VarError::NotUnicode(_)) => bail!("{name} is not valid unicode"),
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => bail!("invalid value {value:?} for {name}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        rounds: u32,
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "debate", "rounds": 3}}"#).unwrap();

        let sample: Sample = load_json_file(file.path()).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "debate".to_string(),
                rounds: 3
            }
        );
    }

    #[test]
    fn test_load_malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = load_json_file::<Sample>(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_json_file::<Sample>("/definitely/not/here.json").is_err());
    }

    #[allow(unsafe_code)]
    fn set_env(name: &str, value: &str) {
        // Each test owns a distinct variable name
        unsafe { std::env::set_var(name, value) };
    }

    #[test]
    fn test_env_parse_unset() {
        let parsed = env_parse::<u32>("AGENT_UTILS_TEST_VAR_THAT_IS_NEVER_SET").unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_env_parse_trims_value() {
        set_env("AGENT_UTILS_TEST_ROUNDS", " 4 ");
        assert_eq!(env_parse::<u32>("AGENT_UTILS_TEST_ROUNDS").unwrap(), Some(4));

        set_env("AGENT_UTILS_TEST_BLANK", "  ");
        assert_eq!(env_parse::<u32>("AGENT_UTILS_TEST_BLANK").unwrap(), None);
    }

    #[test]
    fn test_env_parse_invalid_value_names_variable() {
        set_env("AGENT_UTILS_TEST_BAD_ROUNDS", "three");
        let err = env_parse::<u32>("AGENT_UTILS_TEST_BAD_ROUNDS").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("AGENT_UTILS_TEST_BAD_ROUNDS"));
        assert!(message.contains("\"three\""));
    }
}
