//! Truncation policies for fitting tokenized prompts into a length budget.
//!
//! Besides the plain `left`/`right` directions, prompts can be trimmed in the
//! middle: the region between two configured marker tokens is shortened chunk
//! by chunk at separator boundaries, while everything before the start marker
//! and from the end marker onward survives verbatim.

use std::fmt;
use std::str::FromStr;

use rlprep_core::{Result, RlprepError};
use serde::{Deserialize, Serialize};

use crate::message::{DialogMessage, PromptMessage};
use crate::tokenizer::TextEncoder;

/// Direction policy controlling where excess tokens are dropped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationSide {
    /// Drop tokens from the front of the sequence.
    Left,
    /// Drop tokens from the back of the sequence.
    Right,
    /// Trim the marked middle region, dropping its leading chunks first.
    MiddleLeft,
    /// Trim the marked middle region, dropping its trailing chunks first.
    MiddleRight,
}

impl TruncationSide {
    /// Whether this policy trims the marked middle region.
    pub fn is_middle(self) -> bool {
        matches!(self, Self::MiddleLeft | Self::MiddleRight)
    }
}

impl fmt::Display for TruncationSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::MiddleLeft => "middle-left",
            Self::MiddleRight => "middle-right",
        };
        f.write_str(s)
    }
}

impl FromStr for TruncationSide {
    type Err = RlprepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle-left" => Ok(Self::MiddleLeft),
            "middle-right" => Ok(Self::MiddleRight),
            other => Err(RlprepError::InvalidArgument(format!(
                "unknown truncation side: {other:?}"
            ))),
        }
    }
}

/// Token ids of the three markers delimiting the trimmable middle region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiddleMarkers {
    /// The prompt up to and including the first occurrence is preserved.
    pub start: u32,
    /// The prompt from the first occurrence onward is preserved.
    pub end: u32,
    /// Chunk boundary inside the middle region; trimming drops whole chunks.
    pub sep: u32,
}

impl MiddleMarkers {
    /// Resolve marker strings to token ids, taking the final token of each
    /// marker's encoding.
    pub fn resolve<E: TextEncoder + ?Sized>(
        tokenizer: &E,
        start: &str,
        end: &str,
        sep: &str,
    ) -> Result<Self> {
        let id_of = |text: &str| -> Result<u32> {
            tokenizer.encode(text)?.last().copied().ok_or_else(|| {
                RlprepError::Tokenizer(format!("marker {text:?} encodes to no tokens"))
            })
        };
        Ok(Self {
            start: id_of(start)?,
            end: id_of(end)?,
            sep: id_of(sep)?,
        })
    }
}

/// Truncation policy threaded explicitly through tokenization and the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationConfig {
    /// Truncation direction.
    pub side: TruncationSide,
    /// Resolved marker ids; required whenever `side` is a middle policy.
    pub markers: Option<MiddleMarkers>,
}

impl TruncationConfig {
    /// Plain directional truncation without markers.
    pub fn new(side: TruncationSide) -> Self {
        Self { side, markers: None }
    }

    /// Middle truncation with the given resolved markers.
    pub fn with_markers(side: TruncationSide, markers: MiddleMarkers) -> Self {
        Self {
            side,
            markers: Some(markers),
        }
    }

    /// The markers, or a validation error when the side needs them.
    pub fn require_markers(&self) -> Result<MiddleMarkers> {
        self.markers.ok_or_else(|| {
            RlprepError::Validation(format!(
                "truncation side {} requires middle markers",
                self.side
            ))
        })
    }
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self::new(TruncationSide::Right)
    }
}

/// Shrink a prompt so that `tokens.len() + output_len <= max_length`,
/// preserving the prefix through the first start marker and the suffix from
/// the first end marker onward.
///
/// The optional mask is sliced in lockstep with the tokens. Missing markers
/// degrade to treating the whole prompt as trimmable (logged as a warning);
/// a budget that stays negative even with the middle fully removed is a fatal
/// [`RlprepError::PromptBudget`]. Returns freshly allocated sequences.
pub fn truncate_middle_span(
    tokens: &[u32],
    mask: Option<&[u32]>,
    output_len: usize,
    max_length: usize,
    side: TruncationSide,
    markers: &MiddleMarkers,
) -> Result<(Vec<u32>, Option<Vec<u32>>)> {
    if let Some(m) = mask {
        if m.len() != tokens.len() {
            return Err(RlprepError::LengthMismatch {
                field: "mask",
                expected: tokens.len(),
                actual: m.len(),
            });
        }
    }

    let prompt_len = tokens.len();
    if prompt_len + output_len <= max_length {
        return Ok((tokens.to_vec(), mask.map(|m| m.to_vec())));
    }

    // Only the prompt is trimmed. Record the first occurrence of each
    // boundary marker in a single pass.
    let mut start_idx = None;
    let mut end_idx = None;
    for (i, &token_id) in tokens.iter().enumerate() {
        if start_idx.is_none() && token_id == markers.start {
            start_idx = Some(i);
        }
        if end_idx.is_none() && token_id == markers.end {
            end_idx = Some(i);
        }
        if start_idx.is_some() && end_idx.is_some() {
            break;
        }
    }
    let (start_idx, end_idx) = match (start_idx, end_idx) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            tracing::warn!(
                start_marker = markers.start,
                end_marker = markers.end,
                "middle markers not found in prompt, treating the whole prompt as trimmable"
            );
            (0, prompt_len.saturating_sub(1))
        }
    };

    // Open interval between the markers; degenerate geometry leaves it empty.
    let middle_range = if start_idx + 1 < end_idx {
        start_idx + 1..end_idx
    } else {
        end_idx..end_idx
    };
    let mut middle: Vec<u32> = tokens[middle_range.clone()].to_vec();
    let mut middle_mask: Option<Vec<u32>> = mask.map(|m| m[middle_range].to_vec());

    let preserved = prompt_len - middle.len();
    let budget = max_length as isize - output_len as isize - preserved as isize;
    if budget < 0 {
        return Err(RlprepError::PromptBudget {
            max_length,
            prompt_tokens: prompt_len,
            output_tokens: output_len,
            middle_budget: budget,
        });
    }
    let budget = budget as usize;

    // Trimming always consumes the middle from the front; for middle-right
    // the segment is reversed so chunks drop from the far end instead.
    let reversed = side == TruncationSide::MiddleRight;
    if reversed {
        middle.reverse();
        if let Some(m) = middle_mask.as_mut() {
            m.reverse();
        }
    }

    while middle.len() > budget {
        match middle.iter().position(|&t| t == markers.sep) {
            Some(sep_idx) => {
                middle.drain(..=sep_idx);
                if let Some(m) = middle_mask.as_mut() {
                    m.drain(..=sep_idx);
                }
            }
            None => {
                middle.clear();
                if let Some(m) = middle_mask.as_mut() {
                    m.clear();
                }
                break;
            }
        }
    }

    if reversed {
        middle.reverse();
        if let Some(m) = middle_mask.as_mut() {
            m.reverse();
        }
    }

    let mut out = Vec::with_capacity(start_idx + 1 + middle.len() + prompt_len - end_idx);
    out.extend_from_slice(&tokens[..=start_idx]);
    out.extend_from_slice(&middle);
    out.extend_from_slice(&tokens[end_idx..]);

    let out_mask = mask.map(|m| {
        let mut padded = Vec::with_capacity(out.len());
        padded.extend_from_slice(&m[..=start_idx]);
        padded.extend_from_slice(middle_mask.as_deref().unwrap_or(&[]));
        padded.extend_from_slice(&m[end_idx..]);
        padded
    });

    Ok((out, out_mask))
}

/// Middle-truncate a lone prompt message, keeping its mask in lockstep with
/// the tokens. Returns a new message.
pub fn truncate_prompt_message(
    message: &PromptMessage,
    max_length: usize,
    side: TruncationSide,
    markers: &MiddleMarkers,
) -> Result<PromptMessage> {
    let (tokens, mask) = truncate_middle_span(
        &message.tokens,
        Some(&message.mask),
        0,
        max_length,
        side,
        markers,
    )?;
    Ok(PromptMessage {
        tokens,
        mask: mask.unwrap_or_default(),
    })
}

/// Apply the cumulative left-to-right budget: each message keeps
/// `max(max_length - tokens_before_it, 0)` of its tokens, dropping overflow
/// from its own tail.
pub fn truncate_messages(messages: &[DialogMessage], max_length: usize) -> Vec<DialogMessage> {
    let mut cumulative = 0usize;
    messages
        .iter()
        .map(|message| {
            let keep = max_length
                .saturating_sub(cumulative)
                .min(message.tokens.len());
            cumulative += message.tokens.len();
            DialogMessage::new(message.is_output, message.tokens[..keep].to_vec())
        })
        .collect()
}
