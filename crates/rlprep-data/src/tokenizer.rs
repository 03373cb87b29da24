//! Tokenizer integration.

use std::path::Path;

use rlprep_core::{Result, RlprepError};

/// What the data pipeline needs from a tokenizer runtime.
///
/// Kept deliberately small so stores and pipelines can be exercised against a
/// fixed vocabulary in tests instead of a full model tokenizer.
pub trait TextEncoder {
    /// Encode text to token ids without adding special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Encode text with the tokenizer's special tokens.
    fn encode_with_special_tokens(&self, text: &str) -> Result<Vec<u32>>;

    /// The beginning-of-sequence token text, when the vocabulary has one.
    fn bos_token(&self) -> Option<String>;

    /// The end-of-sequence token text.
    fn eos_token(&self) -> String;

    /// The beginning-of-sequence token id, when the vocabulary has one.
    fn bos_token_id(&self) -> Option<u32>;

    /// The end-of-sequence token id, when the vocabulary has one.
    fn eos_token_id(&self) -> Option<u32>;

    /// The padding token id, when the vocabulary has one.
    fn pad_token_id(&self) -> Option<u32>;
}

const BOS_CANDIDATES: &[&str] = &["<s>", "<|begin_of_text|>", "<bos>"];
const EOS_CANDIDATES: &[&str] = &["</s>", "<|endoftext|>", "<|end_of_text|>", "<eos>"];
const PAD_CANDIDATES: &[&str] = &["<pad>", "[PAD]", "<|pad|>", "<|finetune_right_pad_id|>"];

/// Wrapper around the `tokenizers` library.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    /// Load a tokenizer from a local `tokenizer.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| RlprepError::Tokenizer(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Load a tokenizer from serialized bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| RlprepError::Tokenizer(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Decode token ids to text.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| RlprepError::Tokenizer(e.to_string()))
    }

    /// Get the underlying tokenizer.
    pub fn inner(&self) -> &tokenizers::Tokenizer {
        &self.inner
    }

    fn encode_impl(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| RlprepError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// First candidate token present in the vocabulary.
    fn first_known(&self, candidates: &[&str]) -> Option<String> {
        candidates
            .iter()
            .find(|t| self.inner.token_to_id(t).is_some())
            .map(|t| (*t).to_string())
    }

    fn first_known_id(&self, candidates: &[&str]) -> Option<u32> {
        candidates.iter().find_map(|t| self.inner.token_to_id(t))
    }
}

impl TextEncoder for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.encode_impl(text, false)
    }

    fn encode_with_special_tokens(&self, text: &str) -> Result<Vec<u32>> {
        self.encode_impl(text, true)
    }

    fn bos_token(&self) -> Option<String> {
        self.first_known(BOS_CANDIDATES)
    }

    fn eos_token(&self) -> String {
        self.first_known(EOS_CANDIDATES)
            .unwrap_or_else(|| "</s>".to_string())
    }

    fn bos_token_id(&self) -> Option<u32> {
        self.first_known_id(BOS_CANDIDATES)
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.first_known_id(EOS_CANDIDATES)
    }

    fn pad_token_id(&self) -> Option<u32> {
        // No dedicated pad token is common; fall back to eos.
        self.first_known_id(PAD_CANDIDATES)
            .or_else(|| self.first_known_id(EOS_CANDIDATES))
    }
}
