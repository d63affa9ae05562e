//! Collaborative stock analysis across several models
//!
//! Each analyst role is routed to one of its allowed models on whichever
//! providers have an API key configured, and the run stops charging once the
//! budget cap is reached.
//!
//! # Configuration
//!
//! ```bash
//! export DEEPSEEK_API_KEY="..."
//! export DASHSCOPE_API_KEY="..."
//! # Optional overrides
//! export COLLAB_STRATEGY="cost_first"    # balanced, performance_first, quality_first, round_robin
//! export COLLAB_MODE="debate"            # sequential, parallel
//! export COLLAB_LANGUAGE="zh"
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --example collaborative_analysis -p agent-multimodel 600519.SH
//! ```

use agent_multimodel::{CollaborationConfig, CollaborationRequest, MultiModelManager};
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent_utils::init_tracing();

    let target = std::env::args().nth(1).unwrap_or_else(|| "600519.SH".to_string());

    let config = CollaborationConfig::default().with_env_overrides()?;
    let manager = MultiModelManager::from_config(config)?;

    println!("Provider availability:");
    for (provider, available) in manager.context().checker().check_all().await {
        println!("  {:<12} {}", provider, if available { "ok" } else { "unavailable" });
    }
    println!();

    let request = CollaborationRequest::builder(&target)
        .roles([
            "news_hunter",
            "fundamental_expert",
            "technical_analyst",
            "risk_manager",
            "chief_decision_officer",
        ])
        .context("market", "China A-share")
        .budget_cap(dec!(2.0))
        .build();

    let result = manager.execute_collaborative_analysis(request).await?;
    println!("{}", result.report());

    if !result.degraded_roles.is_empty() {
        eprintln!("Degraded roles: {:?}", result.degraded_roles);
    }
    Ok(())
}
