//! CLIP BPE tokenizer backed by a HuggingFace `tokenizer.json`.

use ndarray::Array2;
use std::path::Path;
use thiserror::Error;
use tokenizers::Tokenizer;

/// CLIP text context length; sequences are zero-padded to this size.
pub const CONTEXT_LENGTH: usize = 77;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("tokenizer file not found: {0}")]
    NotFound(String),
    #[error("failed to load tokenizer: {0}")]
    Load(String),
    #[error("failed to encode text: {0}")]
    Encode(String),
    #[error("input is too long for context length 77 ({0} tokens)")]
    TextTooLong(usize),
}

pub struct ClipTokenizer {
    inner: Tokenizer,
}

impl ClipTokenizer {
    pub fn load(path: &str) -> Result<Self, TokenizerError> {
        if !Path::new(path).exists() {
            return Err(TokenizerError::NotFound(path.to_string()));
        }
        let inner = Tokenizer::from_file(path).map_err(|e| TokenizerError::Load(e.to_string()))?;
        tracing::info!(path, vocab = inner.get_vocab_size(true), "loaded CLIP tokenizer");
        Ok(Self { inner })
    }

    /// Tokenize one text into a `[1, 77]` id matrix.
    pub fn encode(&self, text: &str) -> Result<Array2<i64>, TokenizerError> {
        self.encode_batch(&[text])
    }

    /// Tokenize a batch into a `[n, 77]` id matrix, one row per text.
    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<Array2<i64>, TokenizerError> {
        let mut ids = Array2::<i64>::zeros((texts.len(), CONTEXT_LENGTH));

        for (row, text) in texts.iter().enumerate() {
            let encoding = self
                .inner
                .encode(text.as_ref(), true)
                .map_err(|e| TokenizerError::Encode(e.to_string()))?;
            let packed = pack_ids(encoding.get_ids())?;
            for (col, id) in packed.iter().enumerate() {
                ids[[row, col]] = *id;
            }
        }

        Ok(ids)
    }
}

/// Zero-pad token ids to the context length, rejecting overlong input.
///
/// Trailing zeros already present (tokenizer-side padding) are not counted.
fn pack_ids(ids: &[u32]) -> Result<[i64; CONTEXT_LENGTH], TokenizerError> {
    let used = ids.iter().rposition(|&id| id != 0).map_or(0, |i| i + 1);
    if used > CONTEXT_LENGTH {
        return Err(TokenizerError::TextTooLong(used));
    }

    let mut packed = [0i64; CONTEXT_LENGTH];
    for (slot, &id) in packed.iter_mut().zip(ids[..used].iter()) {
        *slot = id as i64;
    }
    Ok(packed)
}
