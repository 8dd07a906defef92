//! Semantic paragraph dedup backed by a process-wide local embedding model.
//!
//! The model is a lazily constructed singleton: it loads only when the feature is
//! enabled and `LOCAL_MODEL_PATH` points at a readable location, and a load failure
//! disables the stage silently. Paragraphs are kept greedily; a paragraph whose best
//! cosine similarity against the already-kept set reaches the threshold is dropped.

use crate::config::CONFIG;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Similarity at or above which a paragraph is considered a near-duplicate.
const SIMILARITY_THRESHOLD: f32 = 0.94;

const EMBEDDING_DIMENSION: usize = 256;

enum ModelState {
    Unloaded,
    Ready(Arc<ParagraphEmbedder>),
    Disabled,
}

static MODEL: Mutex<ModelState> = Mutex::new(ModelState::Unloaded);

/// Deterministic sentence embedder over hashed byte frequencies.
pub(crate) struct ParagraphEmbedder {
    dimension: usize,
}

impl ParagraphEmbedder {
    fn load(path: &str) -> Option<Self> {
        if !Path::new(path).exists() {
            tracing::debug!(path, "Local embedding model not found; dedup disabled");
            return None;
        }
        Some(Self {
            dimension: EMBEDDING_DIMENSION,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            dimension: EMBEDDING_DIMENSION,
        }
    }

    /// Encode text into a normalized vector of hashed byte frequencies.
    pub(crate) fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if text.is_empty() {
            return embedding;
        }

        for (index, byte) in text.bytes().enumerate() {
            let position = (index + byte as usize) % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn acquire_model() -> Option<Arc<ParagraphEmbedder>> {
    let mut state = MODEL.lock().expect("dedup model lock poisoned");
    loop {
        match &*state {
            ModelState::Ready(model) => return Some(model.clone()),
            ModelState::Disabled => return None,
            ModelState::Unloaded => {
                let loaded = CONFIG
                    .get()
                    .filter(|config| config.clean_semantic_dedup)
                    .and_then(|config| config.local_model_path.as_deref())
                    .and_then(ParagraphEmbedder::load);
                *state = match loaded {
                    Some(model) => ModelState::Ready(Arc::new(model)),
                    None => ModelState::Disabled,
                };
            }
        }
    }
}

/// Release the dedup model; the next use will attempt a fresh load.
pub fn shutdown_dedup_model() {
    *MODEL.lock().expect("dedup model lock poisoned") = ModelState::Unloaded;
}

/// Drop near-duplicate paragraphs, preserving first occurrences and their order.
///
/// Without a usable model the text passes through unchanged.
pub(crate) fn dedupe_paragraphs(text: &str) -> String {
    let Some(model) = acquire_model() else {
        return text.to_string();
    };
    dedupe_with(text, &model)
}

pub(crate) fn dedupe_with(text: &str, model: &ParagraphEmbedder) -> String {
    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    if paragraphs.len() < 2 {
        return text.to_string();
    }

    let mut kept: Vec<&str> = Vec::with_capacity(paragraphs.len());
    let mut kept_vectors: Vec<Vec<f32>> = Vec::with_capacity(paragraphs.len());

    for paragraph in paragraphs {
        if paragraph.trim().is_empty() {
            continue;
        }
        let vector = model.embed(paragraph.trim());
        let duplicate = kept_vectors
            .iter()
            .any(|existing| cosine_similarity(existing, &vector) >= SIMILARITY_THRESHOLD);
        if duplicate {
            tracing::debug!(
                chars = paragraph.chars().count(),
                "Dropped near-duplicate paragraph"
            );
            continue;
        }
        kept.push(paragraph);
        kept_vectors.push(vector);
    }

    kept.join("\n\n")
}
