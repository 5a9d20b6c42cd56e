//! Cluster prompts and the prompt file.

use crate::error::{Result, UrbanVizError};
use crate::store::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Used when no cluster prompt is selected or the selection is unknown.
pub const DEFAULT_PROMPT: &str = "Transform this urban street into a sustainable city design with \
modern architecture, green spaces, and improved infrastructure";

/// How a prompt came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PromptStatus {
    /// Written by a language model.
    Generated,
    /// Filled from the built-in template.
    Template,
    /// Generation failed; the prompt is a placeholder.
    Failed { reason: String },
}

/// Name and text returned by a [`PromptProvider`](crate::prompt::PromptProvider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptDraft {
    pub name: String,
    pub prompt: String,
}

impl PromptDraft {
    /// Parses the `{name, prompt}` JSON a model returns.
    pub fn parse(text: &str) -> Result<Self> {
        let draft: Self = serde_json::from_str(text.trim()).map_err(|e| {
            UrbanVizError::UnexpectedResponse(format!("prompt does not match schema: {e}"))
        })?;
        if draft.prompt.trim().is_empty() {
            return Err(UrbanVizError::UnexpectedResponse(
                "model returned an empty prompt".into(),
            ));
        }
        Ok(draft)
    }
}

/// One image-to-image prompt per cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterPrompt {
    pub label: usize,
    pub size: usize,
    pub name: String,
    pub prompt: String,
    pub status: PromptStatus,
}

impl ClusterPrompt {
    /// Placeholder for a cluster whose prompt could not be generated.
    pub fn failed(label: usize, size: usize, reason: impl Into<String>) -> Self {
        Self {
            label,
            size,
            name: format!("Cluster {label} (generation failed)"),
            prompt: DEFAULT_PROMPT.to_string(),
            status: PromptStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    /// Key under which the prompt is stored.
    pub fn key(&self) -> String {
        prompt_key(self.label)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, PromptStatus::Failed { .. })
    }
}

/// Prompt file key for a cluster label.
pub fn prompt_key(label: usize) -> String {
    format!("cluster_{label}")
}

/// The prompt file: `cluster_<label>` → prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptBook {
    prompts: BTreeMap<String, ClusterPrompt>,
}

impl PromptBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prompt: ClusterPrompt) {
        self.prompts.insert(prompt.key(), prompt);
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Prompts in label order.
    pub fn prompts(&self) -> Vec<&ClusterPrompt> {
        let mut all: Vec<&ClusterPrompt> = self.prompts.values().collect();
        all.sort_by_key(|p| p.label);
        all
    }

    /// Finds a prompt by key (`cluster_3`), bare label (`3`), or name
    /// (case-insensitive).
    pub fn get(&self, selector: &str) -> Option<&ClusterPrompt> {
        let selector = selector.trim();
        if let Some(p) = self.prompts.get(selector) {
            return Some(p);
        }
        if let Ok(label) = selector.parse::<usize>() {
            if let Some(p) = self.prompts.get(&prompt_key(label)) {
                return Some(p);
            }
        }
        self.prompts
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(selector))
    }

    /// Name and text for `selector`, or the default prompt when it is absent.
    pub fn resolve(&self, selector: Option<&str>) -> (String, String) {
        match selector.and_then(|s| self.get(s)) {
            Some(p) => (p.name.clone(), p.prompt.clone()),
            None => {
                if let Some(s) = selector {
                    tracing::warn!(selector = s, "prompt not found; using the default prompt");
                }
                ("Default".to_string(), DEFAULT_PROMPT.to_string())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        tracing::info!(path = %path.display(), prompts = self.len(), "saved cluster prompts");
        Ok(())
    }

    /// Loads the prompt file; a missing file is an empty book.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(read_json(path)?.unwrap_or_default())
    }
}
