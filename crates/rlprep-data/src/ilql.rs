//! Rollout storage for ILQL training.

use rlprep_core::{Result, RlprepError};

use crate::collate::pad_to_longest;
use crate::loader::{BatchLoader, LoaderConfig};
use crate::store::RolloutStore;

/// Per-step tensors of one rollout trajectory. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IlqlElement {
    /// Token ids.
    pub input_ids: Vec<u32>,
    /// 0/1 attention mask.
    pub attention_mask: Vec<u32>,
    /// Per-action rewards.
    pub rewards: Vec<f32>,
    /// Indices of state positions within the trajectory.
    pub states_ixs: Vec<u32>,
    /// Indices of action positions within the trajectory.
    pub actions_ixs: Vec<u32>,
    /// 0/1 terminal flags per state.
    pub dones: Vec<u32>,
}

/// Padded batch of trajectories.
#[derive(Debug, Clone, PartialEq)]
pub struct IlqlBatch {
    /// `[batch, seq]` token ids, padded with 0.
    pub input_ids: Vec<Vec<u32>>,
    /// `[batch, seq]` mask, 0 at padded positions.
    pub attention_mask: Vec<Vec<u32>>,
    /// `[batch, actions]` rewards, padded with 0.0.
    pub rewards: Vec<Vec<f32>>,
    /// `[batch, states]` state indices, padded with 0.
    pub states_ixs: Vec<Vec<u32>>,
    /// `[batch, actions]` action indices, padded with 0.
    pub actions_ixs: Vec<Vec<u32>>,
    /// `[batch, states]` terminal flags, padded with 0.
    pub dones: Vec<Vec<u32>>,
}

/// Per-step tensors of one rollout trajectory for encoder-decoder models.
#[derive(Debug, Clone, PartialEq)]
pub struct IlqlSeq2SeqElement {
    /// Encoder token ids.
    pub input_ids: Vec<u32>,
    /// 0/1 attention mask.
    pub attention_mask: Vec<u32>,
    /// Decoder token ids.
    pub decoder_input_ids: Vec<u32>,
    /// Per-action rewards.
    pub rewards: Vec<f32>,
    /// Indices of state positions within the trajectory.
    pub states_ixs: Vec<u32>,
    /// Indices of action positions within the trajectory.
    pub actions_ixs: Vec<u32>,
    /// 0/1 terminal flags per state.
    pub dones: Vec<u32>,
}

/// Padded batch of seq2seq trajectories.
#[derive(Debug, Clone, PartialEq)]
pub struct IlqlSeq2SeqBatch {
    /// `[batch, seq]` encoder token ids, padded with 0.
    pub input_ids: Vec<Vec<u32>>,
    /// `[batch, seq]` mask, 0 at padded positions.
    pub attention_mask: Vec<Vec<u32>>,
    /// `[batch, seq]` decoder token ids, padded with 0.
    pub decoder_input_ids: Vec<Vec<u32>>,
    /// `[batch, actions]` rewards, padded with 0.0.
    pub rewards: Vec<Vec<f32>>,
    /// `[batch, states]` state indices, padded with 0.
    pub states_ixs: Vec<Vec<u32>>,
    /// `[batch, actions]` action indices, padded with 0.
    pub actions_ixs: Vec<Vec<u32>>,
    /// `[batch, states]` terminal flags, padded with 0.
    pub dones: Vec<Vec<u32>>,
}

fn check_len(field: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(RlprepError::LengthMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Rollout storage for training ILQL.
#[derive(Debug)]
pub struct IlqlRolloutStorage {
    input_ids: Vec<Vec<u32>>,
    attention_mask: Vec<Vec<u32>>,
    rewards: Vec<Vec<f32>>,
    states_ixs: Vec<Vec<u32>>,
    actions_ixs: Vec<Vec<u32>>,
    dones: Vec<Vec<u32>>,
}

impl IlqlRolloutStorage {
    /// Create storage from parallel per-trajectory arrays.
    pub fn new(
        input_ids: Vec<Vec<u32>>,
        attention_mask: Vec<Vec<u32>>,
        rewards: Vec<Vec<f32>>,
        states_ixs: Vec<Vec<u32>>,
        actions_ixs: Vec<Vec<u32>>,
        dones: Vec<Vec<u32>>,
    ) -> Result<Self> {
        let expected = input_ids.len();
        check_len("attention_mask", attention_mask.len(), expected)?;
        check_len("rewards", rewards.len(), expected)?;
        check_len("states_ixs", states_ixs.len(), expected)?;
        check_len("actions_ixs", actions_ixs.len(), expected)?;
        check_len("dones", dones.len(), expected)?;
        Ok(Self {
            input_ids,
            attention_mask,
            rewards,
            states_ixs,
            actions_ixs,
            dones,
        })
    }

    /// Loader for ILQL training: always shuffles; the final partial batch is
    /// dropped exactly when `distributed` collective training is active.
    pub fn create_loader(
        &self,
        batch_size: usize,
        seed: u64,
        distributed: bool,
    ) -> BatchLoader<'_, Self> {
        BatchLoader::new(
            self,
            LoaderConfig {
                batch_size,
                shuffle: true,
                seed,
                drop_last: distributed,
            },
        )
    }
}

impl RolloutStore for IlqlRolloutStorage {
    type Item = IlqlElement;
    type Batch = IlqlBatch;

    fn len(&self) -> usize {
        self.input_ids.len()
    }

    fn get(&self, index: usize) -> Result<IlqlElement> {
        if index >= self.len() {
            return Err(RlprepError::InvalidArgument(format!(
                "index {index} out of bounds for storage of length {}",
                self.len()
            )));
        }
        Ok(IlqlElement {
            input_ids: self.input_ids[index].clone(),
            attention_mask: self.attention_mask[index].clone(),
            rewards: self.rewards[index].clone(),
            states_ixs: self.states_ixs[index].clone(),
            actions_ixs: self.actions_ixs[index].clone(),
            dones: self.dones[index].clone(),
        })
    }

    fn collate(&self, items: &[IlqlElement]) -> IlqlBatch {
        let field = |f: fn(&IlqlElement) -> &Vec<u32>| -> Vec<Vec<u32>> {
            items.iter().map(|e| f(e).clone()).collect()
        };
        IlqlBatch {
            input_ids: pad_to_longest(&field(|e| &e.input_ids), 0),
            attention_mask: pad_to_longest(&field(|e| &e.attention_mask), 0),
            rewards: pad_to_longest(
                &items.iter().map(|e| e.rewards.clone()).collect::<Vec<_>>(),
                0.0,
            ),
            states_ixs: pad_to_longest(&field(|e| &e.states_ixs), 0),
            actions_ixs: pad_to_longest(&field(|e| &e.actions_ixs), 0),
            dones: pad_to_longest(&field(|e| &e.dones), 0),
        }
    }
}

/// Rollout storage for training ILQL with encoder-decoder models.
pub struct IlqlSeq2SeqRolloutStorage {
    input_ids: Vec<Vec<u32>>,
    attention_mask: Vec<Vec<u32>>,
    decoder_input_ids: Vec<Vec<u32>>,
    rewards: Vec<Vec<f32>>,
    states_ixs: Vec<Vec<u32>>,
    actions_ixs: Vec<Vec<u32>>,
    dones: Vec<Vec<u32>>,
}

impl IlqlSeq2SeqRolloutStorage {
    /// Create storage from parallel per-trajectory arrays.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_ids: Vec<Vec<u32>>,
        attention_mask: Vec<Vec<u32>>,
        decoder_input_ids: Vec<Vec<u32>>,
        rewards: Vec<Vec<f32>>,
        states_ixs: Vec<Vec<u32>>,
        actions_ixs: Vec<Vec<u32>>,
        dones: Vec<Vec<u32>>,
    ) -> Result<Self> {
        let expected = input_ids.len();
        check_len("attention_mask", attention_mask.len(), expected)?;
        check_len("decoder_input_ids", decoder_input_ids.len(), expected)?;
        check_len("rewards", rewards.len(), expected)?;
        check_len("states_ixs", states_ixs.len(), expected)?;
        check_len("actions_ixs", actions_ixs.len(), expected)?;
        check_len("dones", dones.len(), expected)?;
        Ok(Self {
            input_ids,
            attention_mask,
            decoder_input_ids,
            rewards,
            states_ixs,
            actions_ixs,
            dones,
        })
    }

    /// Loader for ILQL seq2seq training; same shuffle and drop-last contract
    /// as [`IlqlRolloutStorage::create_loader`].
    pub fn create_loader(
        &self,
        batch_size: usize,
        seed: u64,
        distributed: bool,
    ) -> BatchLoader<'_, Self> {
        BatchLoader::new(
            self,
            LoaderConfig {
                batch_size,
                shuffle: true,
                seed,
                drop_last: distributed,
            },
        )
    }
}

impl RolloutStore for IlqlSeq2SeqRolloutStorage {
    type Item = IlqlSeq2SeqElement;
    type Batch = IlqlSeq2SeqBatch;

    fn len(&self) -> usize {
        self.input_ids.len()
    }

    fn get(&self, index: usize) -> Result<IlqlSeq2SeqElement> {
        if index >= self.len() {
            return Err(RlprepError::InvalidArgument(format!(
                "index {index} out of bounds for storage of length {}",
                self.len()
            )));
        }
        Ok(IlqlSeq2SeqElement {
            input_ids: self.input_ids[index].clone(),
            attention_mask: self.attention_mask[index].clone(),
            decoder_input_ids: self.decoder_input_ids[index].clone(),
            rewards: self.rewards[index].clone(),
            states_ixs: self.states_ixs[index].clone(),
            actions_ixs: self.actions_ixs[index].clone(),
            dones: self.dones[index].clone(),
        })
    }

    fn collate(&self, items: &[IlqlSeq2SeqElement]) -> IlqlSeq2SeqBatch {
        let field = |f: fn(&IlqlSeq2SeqElement) -> &Vec<u32>| -> Vec<Vec<u32>> {
            items.iter().map(|e| f(e).clone()).collect()
        };
        IlqlSeq2SeqBatch {
            input_ids: pad_to_longest(&field(|e| &e.input_ids), 0),
            attention_mask: pad_to_longest(&field(|e| &e.attention_mask), 0),
            decoder_input_ids: pad_to_longest(&field(|e| &e.decoder_input_ids), 0),
            rewards: pad_to_longest(
                &items.iter().map(|e| e.rewards.clone()).collect::<Vec<_>>(),
                0.0,
            ),
            states_ixs: pad_to_longest(&field(|e| &e.states_ixs), 0),
            actions_ixs: pad_to_longest(&field(|e| &e.actions_ixs), 0),
            dones: pad_to_longest(&field(|e| &e.dones), 0),
        }
    }
}
