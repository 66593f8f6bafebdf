//! Human presence classification over joint CLIP prompt scores.
//!
//! The image is scored once against human prompts and nature prompts
//! together. Presence is declared only when both gates pass:
//!
//! - absolute: the best human prompt scores above `min_human_score`
//! - relative: the mean human score beats the mean nature score by
//!   `dominance_margin`
//!
//! Both comparisons are strict.

use crate::prompts::PromptSet;
use crate::scorer::{ImageTensor, JointScorer, ScoreVector, ScorerError};
use serde::{Deserialize, Serialize};

// --- Named constants (empirical, keep exact) ---
pub const MIN_HUMAN_SCORE: f64 = 0.65;
pub const DOMINANCE_MARGIN: f64 = 1.25;
/// Reported ratio when the nature mean is zero.
pub const RATIO_SENTINEL: f64 = 999.0;

/// Decision thresholds for the two gates.
///
/// Gates are evaluated in f64 with the f32 scores widened first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_human_score: f64,
    pub dominance_margin: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_human_score: MIN_HUMAN_SCORE,
            dominance_margin: DOMINANCE_MARGIN,
        }
    }
}

/// Aggregate statistics over the two prompt categories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceScores {
    pub max_human: f32,
    pub max_nature: f32,
    pub avg_human: f32,
    pub avg_nature: f32,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptScore {
    pub prompt: String,
    pub score: f32,
}

/// Outcome of one classification, with every intermediate score attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub has_human: bool,
    pub scores: PresenceScores,
    pub human_prompts: Vec<PromptScore>,
    pub nature_prompts: Vec<PromptScore>,
}

/// Stateless two-gate human presence classifier.
#[derive(Debug, Clone)]
pub struct PresenceClassifier {
    prompts: PromptSet,
    thresholds: Thresholds,
    all_prompts: Vec<String>,
}

impl PresenceClassifier {
    pub fn new(prompts: PromptSet, thresholds: Thresholds) -> Self {
        let all_prompts = prompts.all();
        Self {
            prompts,
            thresholds,
            all_prompts,
        }
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Score the image once against every prompt and evaluate the result.
    ///
    /// Scorer failures propagate unchanged; there is no partial result.
    pub fn classify<S: JointScorer + ?Sized>(
        &self,
        scorer: &mut S,
        image: &ImageTensor,
    ) -> Result<DetectionResult, ScorerError> {
        let scores = scorer.score(image, &self.all_prompts)?;

        let got = scores.as_slice().len();
        if got != self.all_prompts.len() {
            return Err(ScorerError::LengthMismatch {
                expected: self.all_prompts.len(),
                got,
            });
        }

        let result = self.evaluate(&scores);
        tracing::debug!(
            has_human = result.has_human,
            max_human = result.scores.max_human,
            avg_human = result.scores.avg_human,
            avg_nature = result.scores.avg_nature,
            ratio = result.scores.ratio,
            "presence classified"
        );
        Ok(result)
    }

    /// Apply both gates to a score vector aligned with `prompts().all()`.
    pub fn evaluate(&self, scores: &ScoreVector) -> DetectionResult {
        let (human_scores, nature_scores) = scores.split_at(self.prompts.human().len());

        let max_human = max(human_scores);
        let max_nature = max(nature_scores);
        let avg_human = mean(human_scores);
        let avg_nature = mean(nature_scores);

        let (wide_human, wide_nature) = (f64::from(avg_human), f64::from(avg_nature));
        let ratio = if wide_nature > 0.0 {
            wide_human / wide_nature
        } else {
            RATIO_SENTINEL
        };

        let confident = f64::from(max_human) > self.thresholds.min_human_score;
        let dominant = wide_human > wide_nature * self.thresholds.dominance_margin;

        DetectionResult {
            has_human: confident && dominant,
            scores: PresenceScores {
                max_human,
                max_nature,
                avg_human,
                avg_nature,
                ratio,
            },
            human_prompts: pair(self.prompts.human(), human_scores),
            nature_prompts: pair(self.prompts.nature(), nature_scores),
        }
    }
}

impl Default for PresenceClassifier {
    fn default() -> Self {
        Self::new(PromptSet::reference(), Thresholds::default())
    }
}

fn max(scores: &[f32]) -> f32 {
    scores.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

fn mean(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f32>() / scores.len() as f32
}

fn pair(prompts: &[String], scores: &[f32]) -> Vec<PromptScore> {
    prompts
        .iter()
        .zip(scores.iter())
        .map(|(prompt, &score)| PromptScore {
            prompt: prompt.clone(),
            score,
        })
        .collect()
}
