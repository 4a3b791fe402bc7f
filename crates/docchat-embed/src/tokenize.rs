use anyhow::{Result, anyhow};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Tokenizer, TruncationParams};

/// Load `tokenizer.json` from `model_dir`, truncating every encoding to `max_len`.
pub fn load_tokenizer(model_dir: &std::path::Path, max_len: usize) -> Result<Tokenizer> {
    let path = model_dir.join("tokenizer.json");
    let mut tokenizer = Tokenizer::from_file(&path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
        .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
    Ok(tokenizer)
}

/// Encoded batch of one: `(input_ids, attention_mask, token_type_ids)`, each `[1, T]`.
pub struct Encoded {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

pub fn tokenize_on_device<'s, E>(tokenizer: &Tokenizer, input: E, device: &Device) -> Result<Encoded>
where
    E: Into<EncodeInput<'s>>,
{
    let enc = tokenizer.encode(input, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let input_ids = Tensor::new(enc.get_ids(), device)?.unsqueeze(0)?;
    let attention_mask = Tensor::new(enc.get_attention_mask(), device)?.unsqueeze(0)?;
    let token_type_ids = Tensor::new(enc.get_type_ids(), device)?.unsqueeze(0)?;
    Ok(Encoded { input_ids, attention_mask, token_type_ids })
}
