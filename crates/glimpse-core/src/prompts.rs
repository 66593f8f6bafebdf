//! Prompt sets for human presence classification.
//!
//! A prompt set has two disjoint categories: prompts describing a person
//! in the scene, and prompts describing an empty scene. Both are scored
//! together in one joint softmax, so their order only matters for mapping
//! scores back to prompts.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const REFERENCE_HUMAN_PROMPTS: [&str; 5] = [
    "a clear photo of a human person",
    "a photo showing a person's full body",
    "a person standing in the foreground",
    "humans walking in the scene",
    "a close-up photo of a human face",
];

const REFERENCE_NATURE_PROMPTS: [&str; 5] = [
    "a nature scene without any people",
    "an empty landscape",
    "mountains with no humans present",
    "a forest with no people",
    "an uninhabited beach",
];

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("prompt category `{0}` is empty")]
    EmptyCategory(&'static str),
    #[error("prompt {index} in category `{category}` is blank")]
    BlankPrompt { category: &'static str, index: usize },
    #[error("failed to read prompt file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid prompt file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// On-disk layout of a prompt file:
///
/// ```toml
/// human = ["a photo of a person"]
/// nature = ["an empty field"]
/// ```
#[derive(Debug, Deserialize)]
struct PromptFile {
    human: Vec<String>,
    nature: Vec<String>,
}

/// Ordered human and nature prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    human: Vec<String>,
    nature: Vec<String>,
}

impl PromptSet {
    /// Build a prompt set. Each category needs at least one non-blank prompt.
    pub fn new(human: Vec<String>, nature: Vec<String>) -> Result<Self, PromptError> {
        validate("human", &human)?;
        validate("nature", &nature)?;
        Ok(Self { human, nature })
    }

    /// The five-plus-five prompts the detector was tuned against.
    pub fn reference() -> Self {
        Self {
            human: REFERENCE_HUMAN_PROMPTS.iter().map(|s| s.to_string()).collect(),
            nature: REFERENCE_NATURE_PROMPTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_toml_str(src: &str) -> Result<Self, PromptError> {
        let file: PromptFile = toml::from_str(src)?;
        Self::new(file.human, file.nature)
    }

    pub fn load(path: &Path) -> Result<Self, PromptError> {
        let src = std::fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::from_toml_str(&src)?;
        tracing::info!(
            path = %path.display(),
            human = set.human.len(),
            nature = set.nature.len(),
            "loaded prompt set"
        );
        Ok(set)
    }

    pub fn human(&self) -> &[String] {
        &self.human
    }

    pub fn nature(&self) -> &[String] {
        &self.nature
    }

    /// Human prompts followed by nature prompts, the order the scorer sees.
    pub fn all(&self) -> Vec<String> {
        self.human.iter().chain(self.nature.iter()).cloned().collect()
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::reference()
    }
}

fn validate(category: &'static str, prompts: &[String]) -> Result<(), PromptError> {
    if prompts.is_empty() {
        return Err(PromptError::EmptyCategory(category));
    }
    if let Some(index) = prompts.iter().position(|p| p.trim().is_empty()) {
        return Err(PromptError::BlankPrompt { category, index });
    }
    Ok(())
}
