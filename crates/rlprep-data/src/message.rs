//! Role-tagged message records produced by tokenization.

/// Label value excluded from the cross-entropy loss.
pub const IGNORE_INDEX: i64 = -100;

/// Single message in a dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogMessage {
    /// Whether the message is a model output or a prompt.
    pub is_output: bool,
    /// Tokenized message.
    pub tokens: Vec<u32>,
}

impl DialogMessage {
    /// Create a new message.
    pub fn new(is_output: bool, tokens: Vec<u32>) -> Self {
        Self { is_output, tokens }
    }

    /// Create a prompt-role message.
    pub fn prompt(tokens: Vec<u32>) -> Self {
        Self::new(false, tokens)
    }

    /// Create an output-role message.
    pub fn output(tokens: Vec<u32>) -> Self {
        Self::new(true, tokens)
    }
}

/// Single-turn prompt with an attention mask kept in lockstep with the tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    /// Tokenized prompt.
    pub tokens: Vec<u32>,
    /// 0/1 mask, one entry per token.
    pub mask: Vec<u32>,
}

/// Total token count across `messages`.
pub fn total_tokens(messages: &[DialogMessage]) -> usize {
    messages.iter().map(|m| m.tokens.len()).sum()
}
