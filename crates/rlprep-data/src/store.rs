//! Rollout stores over tokenized dialogues.

use rlprep_core::{Result, RlprepError};

use crate::collate::pad_to_longest;
use crate::dialogue::{tokenize_dialogue, Dialogue};
use crate::loader::{BatchLoader, LoaderConfig};
use crate::message::{DialogMessage, IGNORE_INDEX};
use crate::tokenizer::TextEncoder;
use crate::truncation::TruncationConfig;

/// Indexed storage of training examples with padded batch iteration.
///
/// Stores own their backing arrays exclusively; [`RolloutStore::get`] hands
/// out fresh copies, so per-index example construction has no shared mutable
/// state and is safe to fan out across loader workers.
pub trait RolloutStore {
    /// Per-example record.
    type Item;
    /// Rectangular padded batch.
    type Batch;

    /// Number of stored examples.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the example at `index` as a fresh copy.
    fn get(&self, index: usize) -> Result<Self::Item>;

    /// Pad `items` into one rectangular batch.
    fn collate(&self, items: &[Self::Item]) -> Self::Batch;

    /// Create a batch loader over this store.
    fn create_loader(&self, config: LoaderConfig) -> BatchLoader<'_, Self>
    where
        Self: Sized,
    {
        BatchLoader::new(self, config)
    }
}

/// One supervised example assembled from a tokenized dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogSample {
    /// Token ids of the whole dialogue.
    pub input_ids: Vec<u32>,
    /// 1 for every real token.
    pub attention_mask: Vec<u32>,
    /// Output-token ids, [`IGNORE_INDEX`] at prompt positions.
    pub labels: Vec<i64>,
}

impl DialogSample {
    /// Assemble a sample from role-tagged messages.
    pub fn from_messages(messages: &[DialogMessage]) -> Self {
        let total: usize = messages.iter().map(|m| m.tokens.len()).sum();
        let mut input_ids = Vec::with_capacity(total);
        let mut labels = Vec::with_capacity(total);
        for message in messages {
            for &token in &message.tokens {
                input_ids.push(token);
                labels.push(if message.is_output {
                    token as i64
                } else {
                    IGNORE_INDEX
                });
            }
        }
        Self {
            attention_mask: vec![1; total],
            input_ids,
            labels,
        }
    }
}

/// Rectangular batch of dialogue samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogBatch {
    /// `[batch, seq]` token ids, padded with the pad id.
    pub input_ids: Vec<Vec<u32>>,
    /// `[batch, seq]` mask, 0 at padded positions.
    pub attention_mask: Vec<Vec<u32>>,
    /// `[batch, seq]` labels, [`IGNORE_INDEX`] at padded positions.
    pub labels: Vec<Vec<i64>>,
}

fn collate_dialog_samples(items: &[DialogSample], pad_token_id: u32) -> DialogBatch {
    let input_ids: Vec<Vec<u32>> = items.iter().map(|s| s.input_ids.clone()).collect();
    let attention_mask: Vec<Vec<u32>> = items.iter().map(|s| s.attention_mask.clone()).collect();
    let labels: Vec<Vec<i64>> = items.iter().map(|s| s.labels.clone()).collect();
    DialogBatch {
        input_ids: pad_to_longest(&input_ids, pad_token_id),
        attention_mask: pad_to_longest(&attention_mask, 0),
        // labels pad with the ignore index so padding stays out of the loss
        labels: pad_to_longest(&labels, IGNORE_INDEX),
    }
}

/// Eager store: every dialogue is tokenized and assembled at construction.
pub struct DialogStore {
    history: Vec<DialogSample>,
    pad_token_id: u32,
}

impl DialogStore {
    /// Build samples for every dialogue up front.
    pub fn new(dialogs: &[Vec<DialogMessage>], pad_token_id: u32) -> Self {
        let history = dialogs
            .iter()
            .map(|messages| DialogSample::from_messages(messages))
            .collect();
        Self {
            history,
            pad_token_id,
        }
    }
}

impl RolloutStore for DialogStore {
    type Item = DialogSample;
    type Batch = DialogBatch;

    fn len(&self) -> usize {
        self.history.len()
    }

    fn get(&self, index: usize) -> Result<DialogSample> {
        self.history.get(index).cloned().ok_or_else(|| {
            RlprepError::InvalidArgument(format!(
                "index {index} out of bounds for store of length {}",
                self.history.len()
            ))
        })
    }

    fn collate(&self, items: &[DialogSample]) -> DialogBatch {
        collate_dialog_samples(items, self.pad_token_id)
    }
}

/// Lazy source of raw dialogues for streaming tokenization.
pub trait DialogueSource: Send + Sync {
    /// Declared number of dialogues.
    fn len(&self) -> usize;

    /// Whether the source is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw dialogue at `index`.
    fn get(&self, index: usize) -> Result<Dialogue>;
}

impl DialogueSource for Vec<Dialogue> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Result<Dialogue> {
        self.as_slice().get(index).cloned().ok_or_else(|| {
            RlprepError::InvalidArgument(format!(
                "index {index} out of bounds for source of length {}",
                self.as_slice().len()
            ))
        })
    }
}

/// Streaming store: tokenizes on every access instead of up front, trading
/// memory for recomputation.
///
/// The truncation configuration, including any middle-marker token ids, is
/// fixed at construction and never mutated afterwards, so concurrent
/// per-index access is safe.
pub struct DialogStreamStore<E: TextEncoder> {
    source: Box<dyn DialogueSource>,
    tokenizer: E,
    truncation: TruncationConfig,
    max_length: usize,
    pad_token_id: u32,
}

impl<E: TextEncoder> DialogStreamStore<E> {
    /// Create a streaming store over `source`.
    ///
    /// Fails when a middle truncation side is configured without resolved
    /// markers.
    pub fn new(
        source: Box<dyn DialogueSource>,
        tokenizer: E,
        truncation: TruncationConfig,
        max_length: usize,
    ) -> Result<Self> {
        if truncation.side.is_middle() {
            truncation.require_markers()?;
        }
        let pad_token_id = tokenizer.pad_token_id().unwrap_or(0);
        Ok(Self {
            source,
            tokenizer,
            truncation,
            max_length,
            pad_token_id,
        })
    }
}

impl<E: TextEncoder> RolloutStore for DialogStreamStore<E> {
    type Item = DialogSample;
    type Batch = DialogBatch;

    fn len(&self) -> usize {
        self.source.len()
    }

    fn get(&self, index: usize) -> Result<DialogSample> {
        let dialogue = self.source.get(index)?;
        let messages =
            tokenize_dialogue(&dialogue, &self.tokenizer, &self.truncation, self.max_length)?;
        Ok(DialogSample::from_messages(&messages))
    }

    fn collate(&self, items: &[DialogSample]) -> DialogBatch {
        collate_dialog_samples(items, self.pad_token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::VocabEncoder;

    fn encoder() -> VocabEncoder {
        VocabEncoder::new()
            .word("hello", &[5, 6])
            .word("world", &[7, 8])
            .word("question", &[10, 11, 12])
            .word("answer", &[13, 14])
    }

    fn tokenized_dialogs() -> Vec<Vec<DialogMessage>> {
        let tokenizer = encoder();
        let config = TruncationConfig::default();
        vec![
            tokenize_dialogue(
                &Dialogue::Turns(vec!["hello".into(), "world".into()]),
                &tokenizer,
                &config,
                16,
            )
            .unwrap(),
            tokenize_dialogue(
                &Dialogue::Turns(vec!["question".into(), "answer".into()]),
                &tokenizer,
                &config,
                16,
            )
            .unwrap(),
        ]
    }

    #[test]
    fn test_sample_assembly_tags_labels_by_role() {
        let sample = DialogSample::from_messages(&[
            DialogMessage::prompt(vec![0]),
            DialogMessage::prompt(vec![5, 6]),
            DialogMessage::output(vec![7, 8, 9]),
        ]);
        assert_eq!(sample.input_ids, vec![0, 5, 6, 7, 8, 9]);
        assert_eq!(sample.attention_mask, vec![1; 6]);
        assert_eq!(
            sample.labels,
            vec![IGNORE_INDEX, IGNORE_INDEX, IGNORE_INDEX, 7, 8, 9]
        );
    }

    #[test]
    fn test_eager_store_access() {
        let store = DialogStore::new(&tokenized_dialogs(), 0);
        assert_eq!(store.len(), 2);
        let sample = store.get(0).unwrap();
        assert_eq!(sample.input_ids, vec![0, 5, 6, 7, 8, 9]);
        assert!(store.get(7).is_err());
    }

    #[test]
    fn test_streaming_matches_eager() {
        let raw: Vec<Dialogue> = vec![
            Dialogue::Turns(vec!["hello".into(), "world".into()]),
            Dialogue::Turns(vec!["question".into(), "answer".into()]),
        ];
        let eager = DialogStore::new(&tokenized_dialogs(), 9);
        let streaming = DialogStreamStore::new(
            Box::new(raw),
            encoder(),
            TruncationConfig::default(),
            16,
        )
        .unwrap();

        assert_eq!(eager.len(), streaming.len());
        for index in 0..eager.len() {
            assert_eq!(eager.get(index).unwrap(), streaming.get(index).unwrap());
        }
    }

    #[test]
    fn test_collate_pads_labels_with_ignore_index() {
        let store = DialogStore::new(&[], 0);
        let short = DialogSample {
            input_ids: vec![1, 2, 3],
            attention_mask: vec![1, 1, 1],
            labels: vec![IGNORE_INDEX, 2, 3],
        };
        let long = DialogSample {
            input_ids: vec![4, 5, 6, 7, 8],
            attention_mask: vec![1; 5],
            labels: vec![IGNORE_INDEX, 5, 6, 7, 8],
        };
        let batch = store.collate(&[short, long]);
        assert_eq!(batch.input_ids.len(), 2);
        assert_eq!(batch.input_ids[0], vec![1, 2, 3, 0, 0]);
        assert_eq!(batch.attention_mask[0], vec![1, 1, 1, 0, 0]);
        assert_eq!(
            batch.labels[0],
            vec![IGNORE_INDEX, 2, 3, IGNORE_INDEX, IGNORE_INDEX]
        );
        assert_eq!(batch.input_ids[1], vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_loader_over_store() {
        let store = DialogStore::new(&tokenized_dialogs(), 0);
        let mut loader = store.create_loader(LoaderConfig::with_batch_size(2));
        assert_eq!(loader.num_batches(), 1);
        let batch = loader.next_batch().unwrap().unwrap();
        assert_eq!(batch.input_ids.len(), 2);
        // rows are rectangular
        let width = batch.input_ids[0].len();
        assert!(batch.input_ids.iter().all(|row| row.len() == width));
        assert!(loader.next_batch().is_none());
    }

    #[test]
    fn test_loader_drop_last() {
        let dialogs = vec![tokenized_dialogs()[0].clone(); 5];
        let store = DialogStore::new(&dialogs, 0);
        let kept: Vec<_> = store
            .create_loader(LoaderConfig::with_batch_size(2).drop_last(true))
            .collect();
        assert_eq!(kept.len(), 2);
        let all: Vec<_> = store
            .create_loader(LoaderConfig::with_batch_size(2))
            .collect();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_loader_shuffle_is_seeded() {
        let dialogs: Vec<Vec<DialogMessage>> = (0..8)
            .map(|i| vec![DialogMessage::prompt(vec![0]), DialogMessage::output(vec![i])])
            .collect();
        let store = DialogStore::new(&dialogs, 0);
        let config = LoaderConfig::with_batch_size(1).shuffle(true).seed(7);
        let first: Vec<Vec<u32>> = store
            .create_loader(config)
            .map(|b| b.unwrap().input_ids[0].clone())
            .collect();
        let second: Vec<Vec<u32>> = store
            .create_loader(config)
            .map(|b| b.unwrap().input_ids[0].clone())
            .collect();
        assert_eq!(first, second);
        let unshuffled: Vec<Vec<u32>> = store
            .create_loader(LoaderConfig::with_batch_size(1))
            .map(|b| b.unwrap().input_ids[0].clone())
            .collect();
        assert_ne!(first, unshuffled);
    }
}
