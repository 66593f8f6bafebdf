//! glimpse-core — CLIP image/text scoring and human presence classification.
//!
//! Runs a CLIP ViT-B/32 export (separate visual and textual ONNX graphs)
//! through ONNX Runtime on the CPU, and layers the two-gate human presence
//! decision on top of the joint prompt scores.

pub mod clip;
pub mod preprocess;
pub mod presence;
pub mod prompts;
pub mod scorer;
pub mod tokenizer;
pub mod types;

pub use clip::{joint_scores, ClipModel, ModelError, ModelFiles, DEFAULT_LOGIT_SCALE};
pub use preprocess::{decode_image, preprocess, PreprocessError, CLIP_INPUT_SIZE};
pub use presence::{DetectionResult, PresenceClassifier, PresenceScores, PromptScore, Thresholds};
pub use prompts::{PromptError, PromptSet};
pub use scorer::{joint_softmax, ImageTensor, JointScorer, ScoreVector, ScorerError};
pub use tokenizer::{ClipTokenizer, TokenizerError, CONTEXT_LENGTH};
pub use types::Embedding;
