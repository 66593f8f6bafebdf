//! Joint image–text scoring contract.
//!
//! A scorer maps one preprocessed image and N prompts to a single softmax
//! distribution over those N prompts, in prompt order.

use ndarray::Array4;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("scorer returned {got} scores for {expected} prompts")]
    LengthMismatch { expected: usize, got: usize },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("tokenization failed: {0}")]
    Tokenize(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A preprocessed NCHW image tensor, ready for the visual encoder.
#[derive(Debug, Clone)]
pub struct ImageTensor(pub Array4<f32>);

impl ImageTensor {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }
}

/// Softmax scores aligned with the prompts they were computed against.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    /// Normalize raw logits into one joint distribution.
    pub fn from_logits(logits: &[f32]) -> Self {
        Self(joint_softmax(logits))
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Split into `(first n, rest)`. `n` is clamped to the vector length.
    pub fn split_at(&self, n: usize) -> (&[f32], &[f32]) {
        self.0.split_at(n.min(self.0.len()))
    }
}

/// Scores one image against a batch of prompts.
///
/// Implementations must return exactly `prompts.len()` scores, in prompt
/// order, forming a single softmax distribution across all of them.
pub trait JointScorer {
    fn score(&mut self, image: &ImageTensor, prompts: &[String]) -> Result<ScoreVector, ScorerError>;
}

/// Numerically stable softmax over the whole slice.
pub fn joint_softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();

    exps.into_iter().map(|e| e / total).collect()
}
