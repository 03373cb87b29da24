//! Error types for rlprep.

use thiserror::Error;

/// Result type alias for rlprep operations.
pub type Result<T> = std::result::Result<T, RlprepError>;

/// Main error type for rlprep operations.
#[derive(Error, Debug)]
pub enum RlprepError {
    /// Invalid input data (odd dialogue turns, reserved metadata keys, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A prompt/output pair that cannot fit the length budget even after
    /// maximal middle trimming. Surfaced to the user as-is.
    #[error(
        "please shorten the prompt or output: max_length {max_length}, \
         prompt tokens {prompt_tokens}, output tokens {output_tokens}, \
         middle budget {middle_budget}"
    )]
    PromptBudget {
        /// Configured maximum sequence length.
        max_length: usize,
        /// Token count of the prompt message.
        prompt_tokens: usize,
        /// Token count of the output message.
        output_tokens: usize,
        /// The (negative) budget left for the trimmable middle segment.
        middle_budget: isize,
    },

    /// Parallel storage arrays with mismatched lengths.
    #[error("Length mismatch for {field}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Name of the offending field.
        field: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Tokenizer errors.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
