//! Prompt pipeline for generation-time batching.

use serde_json::{Map, Value};

use rlprep_core::{Result, RlprepError};

use crate::collate::pad_to_longest;
use crate::message::PromptMessage;
use crate::store::RolloutStore;
use crate::tokenizer::TextEncoder;
use crate::truncation::{truncate_prompt_message, TruncationConfig, TruncationSide};

/// Keys reserved for tensor fields; metadata must not shadow them.
const RESERVED_KEYS: &[&str] = &["input_ids", "attention_mask"];

/// One tokenized prompt with its pass-through metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSample {
    /// Prompt token ids.
    pub input_ids: Vec<u32>,
    /// 0/1 attention mask.
    pub attention_mask: Vec<u32>,
    /// Opaque fields carried through to the reward function, untouched by
    /// truncation and collation.
    pub metadata: Map<String, Value>,
}

/// Batch of prompts: tensors padded, metadata as plain per-example lists.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBatch {
    /// `[batch, seq]` token ids, padded with the pad id.
    pub input_ids: Vec<Vec<u32>>,
    /// `[batch, seq]` mask, 0 at padded positions.
    pub attention_mask: Vec<Vec<u32>>,
    /// Per-example metadata records, never padded or stacked.
    pub metadata: Vec<Map<String, Value>>,
}

/// Configuration for [`PromptPipeline`].
#[derive(Debug, Clone)]
pub struct PromptPipelineConfig {
    /// Maximum prompt length; longer prompts are truncated per `truncation`.
    pub max_prompt_length: usize,
    /// Whether to encode prompts with the tokenizer's special tokens.
    pub add_special_tokens: bool,
    /// Truncation policy (resolved markers required for the middle sides).
    pub truncation: TruncationConfig,
}

impl Default for PromptPipelineConfig {
    fn default() -> Self {
        Self {
            max_prompt_length: 2048,
            add_special_tokens: false,
            truncation: TruncationConfig::default(),
        }
    }
}

/// Supplies tokenized prompts for either training or evaluation.
#[derive(Debug)]
pub struct PromptPipeline {
    prompts: Vec<PromptSample>,
    pad_token_id: u32,
}

impl PromptPipeline {
    /// Build a pipeline from bare prompt strings.
    pub fn from_texts<E: TextEncoder + ?Sized>(
        prompts: &[String],
        tokenizer: &E,
        config: &PromptPipelineConfig,
    ) -> Result<Self> {
        let rows = prompts
            .iter()
            .map(|p| (p.clone(), Map::new()))
            .collect();
        Self::build(rows, tokenizer, config)
    }

    /// Build a pipeline from records carrying a required `"prompt"` string;
    /// every other field rides along as per-example metadata.
    pub fn from_records<E: TextEncoder + ?Sized>(
        records: Vec<Map<String, Value>>,
        tokenizer: &E,
        config: &PromptPipelineConfig,
    ) -> Result<Self> {
        let mut rows = Vec::with_capacity(records.len());
        for mut record in records {
            let prompt = match record.remove("prompt") {
                Some(Value::String(prompt)) => prompt,
                Some(_) => {
                    return Err(RlprepError::Validation(
                        "the \"prompt\" field must be a string".to_string(),
                    ))
                }
                None => {
                    return Err(RlprepError::Validation(
                        "prompt record is missing the \"prompt\" field".to_string(),
                    ))
                }
            };
            for key in RESERVED_KEYS {
                if record.contains_key(*key) {
                    return Err(RlprepError::Validation(format!(
                        "metadata key {key:?} is reserved"
                    )));
                }
            }
            rows.push((prompt, record));
        }
        Self::build(rows, tokenizer, config)
    }

    fn build<E: TextEncoder + ?Sized>(
        rows: Vec<(String, Map<String, Value>)>,
        tokenizer: &E,
        config: &PromptPipelineConfig,
    ) -> Result<Self> {
        if config.truncation.side.is_middle() {
            config.truncation.require_markers()?;
        }
        let mut prompts = Vec::with_capacity(rows.len());
        for (text, metadata) in rows {
            let tokens = if config.add_special_tokens {
                tokenizer.encode_with_special_tokens(&text)?
            } else {
                tokenizer.encode(&text)?
            };
            let mask = vec![1u32; tokens.len()];
            let message = truncate_prompt(PromptMessage { tokens, mask }, config)?;
            prompts.push(PromptSample {
                input_ids: message.tokens,
                attention_mask: message.mask,
                metadata,
            });
        }
        Ok(Self {
            prompts,
            pad_token_id: tokenizer.pad_token_id().unwrap_or(0),
        })
    }
}

fn truncate_prompt(
    mut message: PromptMessage,
    config: &PromptPipelineConfig,
) -> Result<PromptMessage> {
    let max = config.max_prompt_length;
    match config.truncation.side {
        TruncationSide::Right => {
            message.tokens.truncate(max);
            message.mask.truncate(max);
            Ok(message)
        }
        TruncationSide::Left => {
            if message.tokens.len() > max {
                let cut = message.tokens.len() - max;
                message.tokens.drain(..cut);
                message.mask.drain(..cut);
            }
            Ok(message)
        }
        side => {
            let markers = config.truncation.require_markers()?;
            truncate_prompt_message(&message, max, side, &markers)
        }
    }
}

impl RolloutStore for PromptPipeline {
    type Item = PromptSample;
    type Batch = PromptBatch;

    fn len(&self) -> usize {
        self.prompts.len()
    }

    fn get(&self, index: usize) -> Result<PromptSample> {
        self.prompts.get(index).cloned().ok_or_else(|| {
            RlprepError::InvalidArgument(format!(
                "index {index} out of bounds for pipeline of length {}",
                self.prompts.len()
            ))
        })
    }

    fn collate(&self, items: &[PromptSample]) -> PromptBatch {
        let input_ids: Vec<Vec<u32>> = items.iter().map(|s| s.input_ids.clone()).collect();
        let attention_mask: Vec<Vec<u32>> =
            items.iter().map(|s| s.attention_mask.clone()).collect();
        PromptBatch {
            input_ids: pad_to_longest(&input_ids, self.pad_token_id),
            attention_mask: pad_to_longest(&attention_mask, 0),
            metadata: items.iter().map(|s| s.metadata.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderConfig;
    use crate::test_support::VocabEncoder;
    use crate::truncation::MiddleMarkers;
    use serde_json::json;

    fn encoder() -> VocabEncoder {
        VocabEncoder::new()
            .word("hello", &[5, 6])
            .word("world", &[7, 8])
            .word("question", &[10, 11, 12])
    }

    #[test]
    fn test_texts_are_tokenized() {
        let pipeline = PromptPipeline::from_texts(
            &["hello".to_string(), "question".to_string()],
            &encoder(),
            &PromptPipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(pipeline.len(), 2);
        let sample = pipeline.get(0).unwrap();
        assert_eq!(sample.input_ids, vec![5, 6]);
        assert_eq!(sample.attention_mask, vec![1, 1]);
        assert!(sample.metadata.is_empty());
    }

    #[test]
    fn test_right_truncation_to_max_prompt_length() {
        let config = PromptPipelineConfig {
            max_prompt_length: 2,
            ..Default::default()
        };
        let pipeline =
            PromptPipeline::from_texts(&["question".to_string()], &encoder(), &config).unwrap();
        assert_eq!(pipeline.get(0).unwrap().input_ids, vec![10, 11]);
    }

    #[test]
    fn test_left_truncation_keeps_the_tail() {
        let config = PromptPipelineConfig {
            max_prompt_length: 2,
            truncation: TruncationConfig::new(TruncationSide::Left),
            ..Default::default()
        };
        let pipeline =
            PromptPipeline::from_texts(&["question".to_string()], &encoder(), &config).unwrap();
        assert_eq!(pipeline.get(0).unwrap().input_ids, vec![11, 12]);
    }

    #[test]
    fn test_middle_truncation_with_mask() {
        let encoder = VocabEncoder::new().word("ctx", &[100, 1, 50, 2, 50, 3, 200]);
        let config = PromptPipelineConfig {
            max_prompt_length: 5,
            truncation: TruncationConfig::with_markers(
                TruncationSide::MiddleLeft,
                MiddleMarkers {
                    start: 100,
                    end: 200,
                    sep: 50,
                },
            ),
            ..Default::default()
        };
        let pipeline =
            PromptPipeline::from_texts(&["ctx".to_string()], &encoder, &config).unwrap();
        let sample = pipeline.get(0).unwrap();
        assert_eq!(sample.input_ids, vec![100, 2, 50, 3, 200]);
        assert_eq!(sample.attention_mask, vec![1; 5]);
    }

    #[test]
    fn test_metadata_passes_through() {
        let mut record = Map::new();
        record.insert("prompt".to_string(), json!("hello"));
        record.insert("reward_scale".to_string(), json!(0.5));
        record.insert("source".to_string(), json!("unit-test"));
        let pipeline = PromptPipeline::from_records(
            vec![record],
            &encoder(),
            &PromptPipelineConfig::default(),
        )
        .unwrap();
        let sample = pipeline.get(0).unwrap();
        assert_eq!(sample.input_ids, vec![5, 6]);
        assert_eq!(sample.metadata.get("reward_scale"), Some(&json!(0.5)));
        assert_eq!(sample.metadata.get("source"), Some(&json!("unit-test")));
        assert!(!sample.metadata.contains_key("prompt"));
    }

    #[test]
    fn test_missing_prompt_key_is_rejected() {
        let mut record = Map::new();
        record.insert("question".to_string(), json!("hello"));
        let err = PromptPipeline::from_records(
            vec![record],
            &encoder(),
            &PromptPipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RlprepError::Validation(_)));
    }

    #[test]
    fn test_reserved_metadata_keys_are_rejected() {
        let mut record = Map::new();
        record.insert("prompt".to_string(), json!("hello"));
        record.insert("input_ids".to_string(), json!([1, 2]));
        let err = PromptPipeline::from_records(
            vec![record],
            &encoder(),
            &PromptPipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RlprepError::Validation(_)));
    }

    #[test]
    fn test_batch_keeps_metadata_unpadded() {
        let mut first = Map::new();
        first.insert("prompt".to_string(), json!("hello"));
        first.insert("tag".to_string(), json!("a"));
        let mut second = Map::new();
        second.insert("prompt".to_string(), json!("question"));
        second.insert("tag".to_string(), json!("b"));
        let pipeline = PromptPipeline::from_records(
            vec![first, second],
            &encoder(),
            &PromptPipelineConfig::default(),
        )
        .unwrap();
        let mut loader = pipeline.create_loader(LoaderConfig::with_batch_size(2));
        let batch = loader.next_batch().unwrap().unwrap();
        // hello -> 2 tokens, question -> 3: padded to width 3
        assert_eq!(batch.input_ids[0], vec![5, 6, 0]);
        assert_eq!(batch.attention_mask[0], vec![1, 1, 0]);
        assert_eq!(batch.input_ids[1], vec![10, 11, 12]);
        assert_eq!(batch.metadata.len(), 2);
        assert_eq!(batch.metadata[0].get("tag"), Some(&json!("a")));
        assert_eq!(batch.metadata[1].get("tag"), Some(&json!("b")));
    }
}
