use glimpse_core::{
    joint_scores, preprocess, ClipModel, DetectionResult, Embedding, ImageTensor, JointScorer,
    PreprocessError, PresenceClassifier, ScorerError, DEFAULT_LOGIT_SCALE,
};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("{0}")]
    Scorer(#[from] ScorerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Everything the engine needs from a CLIP model.
///
/// `ClipModel` is the production implementation; tests substitute fakes.
pub trait ClipBackend: JointScorer + Send + 'static {
    fn encode_image(&mut self, image: &ImageTensor) -> Result<Embedding, ScorerError>;
    fn encode_text(&mut self, text: &str) -> Result<Embedding, ScorerError>;

    fn logit_scale(&self) -> f32 {
        DEFAULT_LOGIT_SCALE
    }
}

impl ClipBackend for ClipModel {
    fn encode_image(&mut self, image: &ImageTensor) -> Result<Embedding, ScorerError> {
        Ok(ClipModel::encode_image(self, image)?)
    }

    fn encode_text(&mut self, text: &str) -> Result<Embedding, ScorerError> {
        Ok(ClipModel::encode_text(self, text)?)
    }

    fn logit_scale(&self) -> f32 {
        ClipModel::logit_scale(self)
    }
}

/// Result of an image encoding, optionally with a presence check.
pub struct ImageEncoding {
    pub embedding: Embedding,
    pub detection: Option<DetectionResult>,
}

/// Result of scoring one image against one text.
pub struct SimilarityResult {
    /// Joint softmax over the supplied texts (1.0 for a single text).
    pub similarity: f32,
    /// Cosine similarity of the image and text features.
    pub cosine: f32,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    EncodeImage {
        image: RgbImage,
        detect_humans: bool,
        reply: oneshot::Sender<Result<ImageEncoding, EngineError>>,
    },
    EncodeText {
        text: String,
        reply: oneshot::Sender<Result<Embedding, EngineError>>,
    },
    Similarity {
        image: RgbImage,
        text: String,
        reply: oneshot::Sender<Result<SimilarityResult, EngineError>>,
    },
    DetectHumans {
        image: RgbImage,
        reply: oneshot::Sender<Result<DetectionResult, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request image features, plus a presence check when `detect_humans` is set.
    pub async fn encode_image(
        &self,
        image: RgbImage,
        detect_humans: bool,
    ) -> Result<ImageEncoding, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::EncodeImage {
            image,
            detect_humans,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn encode_text(&self, text: String) -> Result<Embedding, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::EncodeText { text, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn similarity(&self, image: RgbImage, text: String) -> Result<SimilarityResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Similarity { image, text, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn detect_humans(&self, image: RgbImage) -> Result<DetectionResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::DetectHumans { image, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The backend is owned by that thread for the life of the process, so
/// inference is serialized without locks. Handlers queue requests through
/// the returned handle.
pub fn spawn_engine<B: ClipBackend>(
    mut backend: B,
    classifier: PresenceClassifier,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("glimpse-engine".into())
        .spawn(move || {
            tracing::info!(
                human_prompts = classifier.prompts().human().len(),
                nature_prompts = classifier.prompts().nature().len(),
                "engine thread started"
            );
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::EncodeImage {
                        image,
                        detect_humans,
                        reply,
                    } => {
                        let result = run_encode_image(&mut backend, &classifier, &image, detect_humans);
                        let _ = reply.send(result);
                    }
                    EngineRequest::EncodeText { text, reply } => {
                        let result = backend.encode_text(&text).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Similarity { image, text, reply } => {
                        let result = run_similarity(&mut backend, &image, &text);
                        let _ = reply.send(result);
                    }
                    EngineRequest::DetectHumans { image, reply } => {
                        let result = run_detect(&mut backend, &classifier, &image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn run_encode_image<B: ClipBackend>(
    backend: &mut B,
    classifier: &PresenceClassifier,
    image: &RgbImage,
    detect_humans: bool,
) -> Result<ImageEncoding, EngineError> {
    let tensor = preprocess(image)?;
    let embedding = backend.encode_image(&tensor)?;

    let detection = if detect_humans {
        Some(classifier.classify(backend, &tensor)?)
    } else {
        None
    };

    tracing::debug!(
        dimensions = embedding.dimensions(),
        detect_humans,
        "encode_image: done"
    );

    Ok(ImageEncoding { embedding, detection })
}

fn run_similarity<B: ClipBackend>(
    backend: &mut B,
    image: &RgbImage,
    text: &str,
) -> Result<SimilarityResult, EngineError> {
    let tensor = preprocess(image)?;
    let image_features = backend.encode_image(&tensor)?;
    let text_features = backend.encode_text(text)?;

    let scores = joint_scores(
        &image_features,
        std::slice::from_ref(&text_features),
        backend.logit_scale(),
    )?;
    let similarity = scores.as_slice().first().copied().ok_or(ScorerError::LengthMismatch {
        expected: 1,
        got: 0,
    })?;
    let cosine = image_features.similarity(&text_features);

    Ok(SimilarityResult { similarity, cosine })
}

fn run_detect<B: ClipBackend>(
    backend: &mut B,
    classifier: &PresenceClassifier,
    image: &RgbImage,
) -> Result<DetectionResult, EngineError> {
    let tensor = preprocess(image)?;
    let result = classifier.classify(backend, &tensor)?;

    tracing::info!(
        has_human = result.has_human,
        max_human = result.scores.max_human,
        ratio = result.scores.ratio,
        "detect_humans: classified"
    );

    Ok(result)
}
