//! Prompt text for analyst roles
//!
//! - `system`: system prompts for the built-in roles (English and Chinese)
//! - `user`: user messages for analysis, retry and debate turns

mod system;
mod user;

pub use system::*;
pub use user::*;
