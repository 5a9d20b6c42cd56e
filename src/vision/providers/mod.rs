//! Vision analysis providers.

mod openai;

pub use openai::{OpenAiVisionProvider, OpenAiVisionProviderBuilder};
