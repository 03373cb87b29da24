//! Dialogue tokenization.

use rlprep_core::{Result, RlprepError};

use crate::message::{total_tokens, DialogMessage};
use crate::tokenizer::TextEncoder;
use crate::truncation::{
    truncate_messages, truncate_middle_span, TruncationConfig, TruncationSide,
};

/// Raw dialogue input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialogue {
    /// A bare completion; tokenization prepends a bos placeholder turn.
    Text(String),
    /// Alternating `[prompt, output, prompt, output, ...]` turns; the count
    /// must be even.
    Turns(Vec<String>),
}

impl From<String> for Dialogue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Dialogue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<String>> for Dialogue {
    fn from(turns: Vec<String>) -> Self {
        Self::Turns(turns)
    }
}

/// Tokenize a dialogue of interleaved `(prompt_1, output_1, prompt_2, ...)`
/// turns into role-tagged messages that fit `max_length`.
///
/// The final turn is eos-terminated if it is not already. The `left` side is
/// handled by reversing messages and tokens, trimming as if from the right,
/// and reversing back; the middle sides dispatch to
/// [`truncate_middle_span`]. Messages emptied by truncation are dropped, and
/// the result always begins with a one-token non-output bos message (shaving
/// a single token when the dialogue sits exactly at `max_length` to make
/// room).
pub fn tokenize_dialogue<E: TextEncoder + ?Sized>(
    dialogue: &Dialogue,
    tokenizer: &E,
    truncation: &TruncationConfig,
    max_length: usize,
) -> Result<Vec<DialogMessage>> {
    let eos_token = tokenizer.eos_token();
    let mut turns: Vec<String> = match dialogue {
        Dialogue::Text(text) => {
            let bos = tokenizer.bos_token().unwrap_or_else(|| eos_token.clone());
            vec![bos, text.clone()]
        }
        Dialogue::Turns(turns) => {
            if turns.len() % 2 != 0 {
                return Err(RlprepError::Validation(
                    "dialogue must have an even number of phrases, alternating prompt and output"
                        .to_string(),
                ));
            }
            turns.clone()
        }
    };

    let Some(last) = turns.last_mut() else {
        return Err(RlprepError::Validation("dialogue must not be empty".to_string()));
    };
    if !last.ends_with(&eos_token) {
        last.push_str(&eos_token);
    }

    let mut tokenized = Vec::with_capacity(turns.len());
    for (i, turn) in turns.iter().enumerate() {
        tokenized.push(DialogMessage::new(i % 2 == 1, tokenizer.encode(turn)?));
    }

    // Flip so the truncation below always trims from the right.
    if truncation.side == TruncationSide::Left {
        tokenized = reverse_messages(tokenized);
    }

    let truncated = if truncation.side.is_middle() {
        let markers = truncation.require_markers()?;
        if tokenized.len() != 2 {
            return Err(RlprepError::Validation(format!(
                "middle truncation supports a single prompt/output pair, got {} messages",
                tokenized.len()
            )));
        }
        let output_len = tokenized[1].tokens.len();
        let (tokens, _) = truncate_middle_span(
            &tokenized[0].tokens,
            None,
            output_len,
            max_length,
            truncation.side,
            &markers,
        )?;
        vec![
            DialogMessage::new(tokenized[0].is_output, tokens),
            tokenized[1].clone(),
        ]
    } else {
        truncate_messages(&tokenized, max_length)
    };

    // Flip back if it was flipped for left truncation.
    let mut out = if truncation.side == TruncationSide::Left {
        reverse_messages(truncated)
    } else {
        truncated
    };

    // Remove empty messages.
    out.retain(|m| !m.tokens.is_empty());

    // Boundary repair: every example starts with a one-token bos prompt
    // message unless the surviving prompt already begins with it.
    let bos_id = tokenizer
        .bos_token_id()
        .or_else(|| tokenizer.eos_token_id())
        .ok_or_else(|| {
            RlprepError::Tokenizer(
                "tokenizer defines neither a bos nor an eos token id".to_string(),
            )
        })?;
    let needs_bos = match out.first() {
        Some(first) => first.is_output || first.tokens.first() != Some(&bos_id),
        None => true,
    };
    if needs_bos {
        if total_tokens(&out) == max_length {
            if truncation.side == TruncationSide::Left {
                if let Some(first) = out.first_mut() {
                    first.tokens.remove(0);
                }
            } else if let Some(last) = out.last_mut() {
                last.tokens.pop();
            }
            // the shave may have emptied a message; those are dropped too
            out.retain(|m| !m.tokens.is_empty());
        }
        out.insert(0, DialogMessage::prompt(vec![bos_id]));
    }

    Ok(out)
}

fn reverse_messages(messages: Vec<DialogMessage>) -> Vec<DialogMessage> {
    messages
        .into_iter()
        .rev()
        .map(|m| DialogMessage::new(m.is_output, m.tokens.into_iter().rev().collect()))
        .collect()
}
