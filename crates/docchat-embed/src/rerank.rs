use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Module};
use candle_nn::{linear, Linear};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::info;

use docchat_core::config::EmbeddingSettings;
use docchat_core::traits::Reranker;

use crate::{device, load_weights, resolve_model_dir, tokenize};

/// BERT cross-encoder (ms-marco MiniLM layout): `[CLS] query [SEP] passage [SEP]`
/// through the encoder, pooler and a one-logit classifier. Scores are the
/// sigmoid of the logit, so they fall in `(0, 1)`.
pub struct CrossEncoder {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

impl CrossEncoder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading reranker");
        let tokenizer = tokenize::load_tokenizer(model_dir, max_len)?;
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(model_dir.join("config.json"))?)?;
        let hidden = raw.get("hidden_size").and_then(serde_json::Value::as_u64).ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;
        let config: BertConfig = serde_json::from_value(raw)?;
        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(hidden, 1, vb.pp("classifier"))?;
        Ok(Self { model, pooler, classifier, tokenizer, device })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let dir = resolve_model_dir(&settings.reranker_dir)?;
        Self::load(&dir, settings.max_len)
    }

    fn score_pair(&self, query: &str, passage: &str) -> Result<f32> {
        let enc = tokenize::tokenize_on_device(&self.tokenizer, (query, passage), &self.device)?;
        let hidden = self.model.forward(&enc.input_ids, &enc.token_type_ids, Some(&enc.attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits: Vec<f32> = self.classifier.forward(&pooled)?.flatten_all()?.to_vec1()?;
        let logit = logits.first().copied().ok_or_else(|| anyhow!("classifier produced no logit"))?;
        Ok(sigmoid(logit))
    }
}

fn sigmoid(x: f32) -> f32 { 1.0 / (1.0 + (-x).exp()) }

impl Reranker for CrossEncoder {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        passages.iter().map(|p| self.score_pair(query, p)).collect()
    }
}

/// Stands in when the reranker model could not be loaded; every call fails,
/// which sends retrieval down its semantic-only path.
pub struct UnloadedReranker {
    reason: String,
}

impl UnloadedReranker {
    pub fn new(reason: impl Into<String>) -> Self { Self { reason: reason.into() } }
}

impl Reranker for UnloadedReranker {
    fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
        Err(docchat_core::Error::Model(format!("reranker unavailable: {}", self.reason)).into())
    }
}
