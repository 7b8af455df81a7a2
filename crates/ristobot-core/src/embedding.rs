use crate::error::{Result, RistobotError};
use fastembed::{
    EmbeddingModel, InitOptions, InitOptionsUserDefined, Pooling, TextEmbedding as FastEmbedModel,
    TokenizerFiles, UserDefinedEmbeddingModel,
};
use std::path::{Path, PathBuf};

pub type Embedding = Vec<f32>;

/// Service for generating text embeddings
pub trait EmbeddingService: Send + Sync {
    /// Generate embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Batch embedding. Output order matches input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embedding dimension for the current model.
    fn dimension(&self) -> usize;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

/// FastEmbed-based embedding service
pub struct FastEmbedService {
    model: FastEmbedModel,
    model_name: String,
    dimension: usize,
}

impl FastEmbedService {
    /// Create a new FastEmbed service with the default model.
    /// `AllMiniLML6V2` is the same MiniLM-L6 family the demo model directory ships.
    pub fn new() -> Result<Self> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    /// Create a new FastEmbed service with a specific model
    pub fn with_model(model: EmbeddingModel) -> Result<Self> {
        let init_options = InitOptions::new(model.clone());

        let fastembed_model = FastEmbedModel::try_new(init_options)
            .map_err(|e| {
                RistobotError::Embedding(format!("Failed to initialize FastEmbed: {}", e))
            })?;

        let model_name = format!("{:?}", model);
        let dimension = match model {
            EmbeddingModel::BGESmallENV15 => 384,
            EmbeddingModel::BGEBaseENV15 => 768,
            EmbeddingModel::BGELargeENV15 => 1024,
            EmbeddingModel::AllMiniLML6V2 => 384,
            EmbeddingModel::AllMiniLML12V2 => 384,
            _ => 384,
        };

        Ok(Self {
            model: fastembed_model,
            model_name,
            dimension,
        })
    }

    /// Load a sentence-transformers export from a local directory.
    ///
    /// Expects `model.onnx` (or `onnx/model.onnx`) next to `tokenizer.json`,
    /// `config.json`, `special_tokens_map.json` and `tokenizer_config.json`.
    /// Mean pooling is applied, matching sentence-transformers' MiniLM exports.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RistobotError::Embedding(format!(
                "model directory {} does not exist",
                dir.display()
            )));
        }

        let onnx_path = model_file(dir)?;
        let read = |name: &str| -> Result<Vec<u8>> {
            let path = dir.join(name);
            std::fs::read(&path).map_err(|e| {
                RistobotError::Embedding(format!("failed to read {}: {}", path.display(), e))
            })
        };

        let tokenizer_files = TokenizerFiles {
            tokenizer_file: read("tokenizer.json")?,
            config_file: read("config.json")?,
            special_tokens_map_file: read("special_tokens_map.json")?,
            tokenizer_config_file: read("tokenizer_config.json")?,
        };
        let onnx_file = std::fs::read(&onnx_path)?;

        let user_model =
            UserDefinedEmbeddingModel::new(onnx_file, tokenizer_files).with_pooling(Pooling::Mean);
        let fastembed_model =
            FastEmbedModel::try_new_from_user_defined(user_model, InitOptionsUserDefined::new())
                .map_err(|e| {
                    RistobotError::Embedding(format!(
                        "Failed to load model from {}: {}",
                        dir.display(),
                        e
                    ))
                })?;

        let model_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        // User-defined models carry no dimension metadata; probe it once.
        let probe = fastembed_model
            .embed(vec!["dimension probe"], None)
            .map_err(|e| RistobotError::Embedding(format!("Embedding failed: {}", e)))?;
        let dimension = probe.first().map(|v| v.len()).unwrap_or(0);
        if dimension == 0 {
            return Err(RistobotError::Embedding(format!(
                "model {} produced an empty embedding",
                model_name
            )));
        }

        log::info!("Loaded model {} ({} dims) from {}", model_name, dimension, dir.display());

        Ok(Self {
            model: fastembed_model,
            model_name,
            dimension,
        })
    }
}

fn model_file(dir: &Path) -> Result<PathBuf> {
    ["model.onnx", "onnx/model.onnx"]
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            RistobotError::Embedding(format!(
                "no model.onnx or onnx/model.onnx under {}",
                dir.display()
            ))
        })
}

impl EmbeddingService for FastEmbedService {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.model
            .embed(vec![text.to_string()], None)
            .map_err(|e| RistobotError::Embedding(format!("Embedding failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RistobotError::Embedding("No embedding generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let embeddings = self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| RistobotError::Embedding(format!("Batch embedding failed: {}", e)))?;

        if embeddings.len() != texts.len() {
            return Err(RistobotError::Embedding(format!(
                "expected {} embeddings, model returned {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl<E: EmbeddingService + ?Sized> EmbeddingService for std::sync::Arc<E> {
    fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text)
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }
    fn dimension(&self) -> usize {
        (**self).dimension()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
