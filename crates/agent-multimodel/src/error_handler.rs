//! Maps provider errors onto user-facing categories
//!
//! Typed [`LLMError`] variants are mapped first. Anything else falls through
//! to a table of regular expressions over the lower-cased message. The table
//! is best-effort: a message nothing matches is `UnknownError`.

use crate::config::ResponseLanguage;
use agent_llm::LLMError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Coarse error classes the collaboration layer reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    AuthError,
    QuotaExceeded,
    Timeout,
    ModelUnavailable,
    NetworkError,
    UnknownError,
}

/// What the caller should do about an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    /// Back off and try again
    Retry,
    /// Try another allowed model
    SwitchModel,
    /// Give up on this role
    Abort,
}

impl ErrorCategory {
    /// Timeout, network and quota errors are worth one more attempt
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkError | Self::QuotaExceeded)
    }

    pub fn remediation(self) -> Remediation {
        match self {
            Self::Timeout | Self::NetworkError | Self::QuotaExceeded => Remediation::Retry,
            Self::AuthError | Self::ModelUnavailable => Remediation::SwitchModel,
            Self::UnknownError => Remediation::Abort,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthError => "AUTH_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Timeout => "TIMEOUT",
            Self::ModelUnavailable => "MODEL_UNAVAILABLE",
            Self::NetworkError => "NETWORK_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked in order; first match wins
const MESSAGE_PATTERNS: &[(&str, ErrorCategory)] = &[
    (
        r"\b40[13]\b|invalid[ _]api[ _]key|incorrect api key|api key not valid|unauthori[sz]ed|authentication|permission denied",
        ErrorCategory::AuthError,
    ),
    (
        r"\b40[29]\b|quota|rate[ _]limit|too many requests|insufficient[ _](balance|quota)|billing|arrearage",
        ErrorCategory::QuotaExceeded,
    ),
    (r"timed out|timeout|deadline exceeded", ErrorCategory::Timeout),
    (
        r"\b404\b|model[ _]not[ _]found|does not exist|no such model|model .*(unavailable|not supported)|decommissioned|deprecated",
        ErrorCategory::ModelUnavailable,
    ),
    (
        r"connection (refused|reset|closed|aborted)|dns|network|could not resolve|broken pipe|service unavailable|bad gateway|internal server error|\bhttp 5\d\d\b|\b50[023]\b",
        ErrorCategory::NetworkError,
    ),
];

static MESSAGE_RULES: LazyLock<Vec<(Regex, ErrorCategory)>> = LazyLock::new(|| {
    MESSAGE_PATTERNS
        .iter()
        .filter_map(|(pattern, category)| Regex::new(pattern).ok().map(|re| (re, *category)))
        .collect()
});

/// A classified error ready to show to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: Remediation,
}

/// Classifies provider errors and renders them for users
#[derive(Debug, Clone, Copy, Default)]
pub struct UserFriendlyErrorHandler {
    language: ResponseLanguage,
}

impl UserFriendlyErrorHandler {
    pub fn new(language: ResponseLanguage) -> Self {
        Self { language }
    }

    pub fn language(&self) -> ResponseLanguage {
        self.language
    }

    pub fn classify(&self, err: &LLMError) -> ErrorCategory {
        match err {
            LLMError::AuthenticationFailed => ErrorCategory::AuthError,
            LLMError::RateLimitExceeded(_) => ErrorCategory::QuotaExceeded,
            LLMError::ModelNotFound(_) => ErrorCategory::ModelUnavailable,
            LLMError::Timeout(_) => ErrorCategory::Timeout,
            LLMError::Network(_) => ErrorCategory::NetworkError,
            // A provider without a usable client cannot serve the model
            LLMError::ConfigurationError(_) => ErrorCategory::ModelUnavailable,
            LLMError::HttpError(e) if e.is_timeout() => ErrorCategory::Timeout,
            LLMError::HttpError(e) if e.is_connect() => ErrorCategory::NetworkError,
            other => self.classify_message(&other.to_string()),
        }
    }

    /// Best-effort classification of a free-form error message
    pub fn classify_message(&self, message: &str) -> ErrorCategory {
        let message = message.to_lowercase();
        MESSAGE_RULES
            .iter()
            .find(|(re, _)| re.is_match(&message))
            .map_or(ErrorCategory::UnknownError, |(_, category)| *category)
    }

    pub fn to_user_message(&self, category: ErrorCategory, language: ResponseLanguage) -> &'static str {
        match language {
            ResponseLanguage::English => match category {
                ErrorCategory::AuthError => {
                    "The model provider rejected the API key. Check the key in your configuration."
                },
                ErrorCategory::QuotaExceeded => {
                    "The model provider's quota or rate limit was reached. Try again later or top up the account."
                },
                ErrorCategory::Timeout => "The model took too long to respond.",
                ErrorCategory::ModelUnavailable => {
                    "The selected model is not available from its provider."
                },
                ErrorCategory::NetworkError => {
                    "Could not reach the model provider. Check the network connection."
                },
                ErrorCategory::UnknownError => "The model call failed for an unexpected reason.",
            },
            ResponseLanguage::Chinese => match category {
                ErrorCategory::AuthError => "模型服务商拒绝了API密钥，请检查配置中的密钥。",
                ErrorCategory::QuotaExceeded => "模型服务商的额度或速率限制已用尽，请稍后重试或充值。",
                ErrorCategory::Timeout => "模型响应超时。",
                ErrorCategory::ModelUnavailable => "所选模型当前不可用。",
                ErrorCategory::NetworkError => "无法连接模型服务商，请检查网络。",
                ErrorCategory::UnknownError => "模型调用因未知原因失败。",
            },
        }
    }

    pub fn remediation(&self, category: ErrorCategory) -> Remediation {
        category.remediation()
    }

    /// Classify and render in the handler's language
    pub fn describe(&self, err: &LLMError) -> UserFacingError {
        let category = self.classify(err);
        UserFacingError {
            category,
            message: self.to_user_message(category, self.language).to_string(),
            remediation: category.remediation(),
        }
    }
}
