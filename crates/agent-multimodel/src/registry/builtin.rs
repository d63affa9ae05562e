//! Built-in model catalog and stock-analysis roles
//!
//! Prices are per 1000 tokens in CNY, taken from the providers' public price
//! lists. Override them with a catalog file when they drift.

use super::tags::{CHINESE, CODING, FAST, FUNCTION_CALLING, LONG_CONTEXT, REASONING};
use super::{ModelId, ModelSpec, RoleConfig};
use rust_decimal_macros::dec;

fn model(provider: &str, name: &str) -> ModelId {
    ModelId::new(provider, name)
}

/// Default model catalog
pub fn builtin_models() -> Vec<ModelSpec> {
    vec![
        // DeepSeek
        ModelSpec::new("deepseek", "deepseek-chat", dec!(0.002), dec!(0.008))
            .with_context_length(65_536)
            .with_tags([FUNCTION_CALLING, CHINESE, CODING]),
        ModelSpec::new("deepseek", "deepseek-reasoner", dec!(0.004), dec!(0.016))
            .with_context_length(65_536)
            .with_tags([REASONING, CHINESE]),
        // DashScope (Qwen)
        ModelSpec::new("dashscope", "qwen-turbo", dec!(0.0003), dec!(0.0006))
            .with_context_length(131_072)
            .with_tags([FAST, CHINESE, LONG_CONTEXT]),
        ModelSpec::new("dashscope", "qwen-plus", dec!(0.0008), dec!(0.002))
            .with_context_length(131_072)
            .with_tags([FUNCTION_CALLING, CHINESE, LONG_CONTEXT]),
        ModelSpec::new("dashscope", "qwen-max", dec!(0.0024), dec!(0.0096))
            .with_context_length(32_768)
            .with_tags([REASONING, FUNCTION_CALLING, CHINESE]),
        // Google Gemini
        ModelSpec::new("google", "gemini-2.0-flash", dec!(0.0007), dec!(0.0028))
            .with_context_length(1_048_576)
            .with_tags([FAST, LONG_CONTEXT, FUNCTION_CALLING]),
        ModelSpec::new("google", "gemini-2.5-pro", dec!(0.009), dec!(0.072))
            .with_context_length(1_048_576)
            .with_tags([REASONING, LONG_CONTEXT, FUNCTION_CALLING, CODING]),
        // SiliconFlow
        ModelSpec::new("siliconflow", "Qwen/Qwen2.5-72B-Instruct", dec!(0.00413), dec!(0.00413))
            .with_context_length(32_768)
            .with_tags([CHINESE, FUNCTION_CALLING]),
        ModelSpec::new("siliconflow", "deepseek-ai/DeepSeek-V3", dec!(0.002), dec!(0.008))
            .with_context_length(65_536)
            .with_tags([CHINESE, FUNCTION_CALLING, CODING]),
        // OpenAI
        ModelSpec::new("openai", "gpt-4o-mini", dec!(0.0011), dec!(0.0044))
            .with_context_length(128_000)
            .with_tags([FAST, FUNCTION_CALLING, LONG_CONTEXT]),
        ModelSpec::new("openai", "gpt-4o", dec!(0.018), dec!(0.072))
            .with_context_length(128_000)
            .with_tags([REASONING, FUNCTION_CALLING, LONG_CONTEXT]),
    ]
}

/// Default analyst roles
pub fn builtin_roles() -> Vec<RoleConfig> {
    vec![
        RoleConfig::new("news_hunter", "News Hunter").with_allowed_models(vec![
            model("dashscope", "qwen-plus"),
            model("google", "gemini-2.0-flash"),
            model("deepseek", "deepseek-chat"),
        ]),
        RoleConfig::new("fundamental_expert", "Fundamental Expert").with_allowed_models(vec![
            model("deepseek", "deepseek-chat"),
            model("dashscope", "qwen-max"),
            model("openai", "gpt-4o"),
        ]),
        RoleConfig::new("technical_analyst", "Technical Analyst").with_allowed_models(vec![
            model("google", "gemini-2.0-flash"),
            model("deepseek", "deepseek-chat"),
            model("dashscope", "qwen-plus"),
        ]),
        RoleConfig::new("sentiment_analyst", "Sentiment Analyst").with_allowed_models(vec![
            model("dashscope", "qwen-turbo"),
            model("siliconflow", "Qwen/Qwen2.5-72B-Instruct"),
            model("deepseek", "deepseek-chat"),
        ]),
        RoleConfig::new("risk_manager", "Risk Manager").with_allowed_models(vec![
            model("deepseek", "deepseek-reasoner"),
            model("dashscope", "qwen-max"),
            model("google", "gemini-2.5-pro"),
        ]),
        RoleConfig::new("chief_decision_officer", "Chief Decision Officer").with_allowed_models(
            vec![
                model("deepseek", "deepseek-reasoner"),
                model("google", "gemini-2.5-pro"),
                model("openai", "gpt-4o"),
            ],
        ),
    ]
}
