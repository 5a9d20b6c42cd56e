//! Prompt providers.

mod openai;
mod template;

pub use openai::{OpenAiPromptProvider, OpenAiPromptProviderBuilder};
pub use template::TemplatePromptProvider;
