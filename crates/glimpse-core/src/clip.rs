//! CLIP ViT-B/32 via ONNX Runtime.
//!
//! Expects the model split into two graphs: a visual encoder taking a
//! `[1, 3, 224, 224]` float tensor, and a textual encoder taking `[1, 77]`
//! int64 token ids. Both return one feature vector per input row.

use crate::scorer::{ImageTensor, JointScorer, ScoreVector, ScorerError};
use crate::tokenizer::{ClipTokenizer, TokenizerError};
use crate::types::Embedding;
use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const VISUAL_FILE: &str = "visual.onnx";
const TEXTUAL_FILE: &str = "textual.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
/// exp(4.6052), the learned temperature of the released ViT-B/32 weights.
pub const DEFAULT_LOGIT_SCALE: f32 = 100.0;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}; export CLIP to ONNX and place it in the model cache dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("tokenizer: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ModelError> for ScorerError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Ort(e) => ScorerError::Ort(e),
            ModelError::Tokenizer(e) => ScorerError::Tokenize(e.to_string()),
            other => ScorerError::Inference(other.to_string()),
        }
    }
}

/// Locations of the three files that make up one CLIP export.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub visual: PathBuf,
    pub textual: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    /// Standard file names inside a model directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            visual: dir.join(VISUAL_FILE),
            textual: dir.join(TEXTUAL_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
        }
    }
}

/// CLIP image and text encoders sharing one embedding space.
pub struct ClipModel {
    visual: Session,
    textual: Session,
    tokenizer: ClipTokenizer,
    logit_scale: f32,
    name: String,
}

impl ClipModel {
    /// Load both encoders and the tokenizer. Fails fast on any missing file.
    pub fn load(files: &ModelFiles, name: &str, logit_scale: f32) -> Result<Self, ModelError> {
        for path in [&files.visual, &files.textual, &files.tokenizer] {
            if !path.exists() {
                return Err(ModelError::ModelNotFound(path.display().to_string()));
            }
        }

        let visual = load_session(&files.visual, "visual")?;
        let textual = load_session(&files.textual, "textual")?;
        let tokenizer = ClipTokenizer::load(&files.tokenizer.to_string_lossy())?;

        Ok(Self {
            visual,
            textual,
            tokenizer,
            logit_scale,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logit_scale(&self) -> f32 {
        self.logit_scale
    }

    /// Raw (unnormalized) image features.
    pub fn encode_image(&mut self, image: &ImageTensor) -> Result<Embedding, ModelError> {
        let outputs = self
            .visual
            .run(ort::inputs![TensorRef::from_array_view(image.as_array().view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("image features: {e}")))?;

        if raw.is_empty() {
            return Err(ModelError::InferenceFailed("visual encoder returned no features".into()));
        }

        Ok(Embedding::new(raw.to_vec(), self.name.as_str()))
    }

    /// Raw (unnormalized) text features.
    pub fn encode_text(&mut self, text: &str) -> Result<Embedding, ModelError> {
        let ids = self.tokenizer.encode(text)?;
        self.run_textual(&ids)
    }

    fn run_textual(&mut self, ids: &Array2<i64>) -> Result<Embedding, ModelError> {
        let outputs = self.textual.run(ort::inputs![TensorRef::from_array_view(ids.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("text features: {e}")))?;

        if raw.is_empty() {
            return Err(ModelError::InferenceFailed("textual encoder returned no features".into()));
        }

        Ok(Embedding::new(raw.to_vec(), self.name.as_str()))
    }
}

impl JointScorer for ClipModel {
    fn score(&mut self, image: &ImageTensor, prompts: &[String]) -> Result<ScoreVector, ScorerError> {
        let image_features = self.encode_image(image)?;
        let text_features = prompts
            .iter()
            .map(|prompt| self.encode_text(prompt))
            .collect::<Result<Vec<_>, _>>()?;

        joint_scores(&image_features, &text_features, self.logit_scale)
    }
}

/// Score raw image features against raw text features.
///
/// Both sides are L2-normalized, scaled cosines become logits, and one
/// softmax runs over every text, in order.
pub fn joint_scores(
    image: &Embedding,
    texts: &[Embedding],
    logit_scale: f32,
) -> Result<ScoreVector, ScorerError> {
    let image = image.l2_normalized();

    let mut logits = Vec::with_capacity(texts.len());
    for text in texts {
        if text.dimensions() != image.dimensions() {
            return Err(ScorerError::Inference(format!(
                "feature size mismatch: image {} vs text {}",
                image.dimensions(),
                text.dimensions()
            )));
        }
        logits.push(logit_scale * image.dot(&text.l2_normalized()));
    }

    Ok(ScoreVector::from_logits(&logits))
}

fn load_session(path: &Path, role: &str) -> Result<Session, ModelError> {
    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(path)?;

    tracing::info!(
        path = %path.display(),
        role,
        inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded CLIP encoder"
    );

    Ok(session)
}
