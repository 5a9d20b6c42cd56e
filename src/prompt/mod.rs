//! Image-to-image prompts derived from cluster summaries.

mod generator;
mod provider;
pub mod providers;
mod types;

pub use generator::PromptGenerator;
pub use provider::PromptProvider;
pub use types::{
    prompt_key, ClusterPrompt, PromptBook, PromptDraft, PromptStatus, DEFAULT_PROMPT,
};
