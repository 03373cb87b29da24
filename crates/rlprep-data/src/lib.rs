//! Data preparation for feedback-driven policy optimization.
//!
//! This crate provides:
//! - Dialogue tokenization with left/right/middle truncation policies
//! - Middle truncation that preserves marked prompt regions
//! - Eager and streaming rollout stores with padded batch iteration
//! - A prompt pipeline with opaque metadata pass-through
//! - ILQL trajectory storage and collation

#![warn(missing_docs)]

pub mod collate;
pub mod dataset;
pub mod dialogue;
pub mod ilql;
pub mod loader;
pub mod message;
pub mod prompt;
pub mod store;
pub mod tokenizer;
pub mod truncation;

pub use collate::*;
pub use dataset::*;
pub use dialogue::*;
pub use ilql::*;
pub use loader::*;
pub use message::*;
pub use prompt::*;
pub use store::*;
pub use tokenizer::*;
pub use truncation::*;

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixed-vocabulary encoder for exercising the pipeline without a model
    //! tokenizer.

    use std::collections::HashMap;

    use rlprep_core::{Result, RlprepError};

    use crate::tokenizer::TextEncoder;

    pub const BOS_ID: u32 = 0;
    pub const EOS_ID: u32 = 9;

    /// Whitespace tokenizer over a hand-written vocabulary. `<s>` maps to the
    /// bos id and a trailing `</s>` to the eos id.
    pub struct VocabEncoder {
        vocab: HashMap<String, Vec<u32>>,
    }

    impl VocabEncoder {
        pub fn new() -> Self {
            Self {
                vocab: HashMap::new(),
            }
        }

        pub fn word(mut self, word: &str, ids: &[u32]) -> Self {
            self.vocab.insert(word.to_string(), ids.to_vec());
            self
        }
    }

    impl TextEncoder for VocabEncoder {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            let mut out = Vec::new();
            let (body, eos) = match text.strip_suffix("</s>") {
                Some(body) => (body, true),
                None => (text, false),
            };
            for word in body.split_whitespace() {
                if word == "<s>" {
                    out.push(BOS_ID);
                    continue;
                }
                let ids = self.vocab.get(word).ok_or_else(|| {
                    RlprepError::Tokenizer(format!("word {word:?} not in test vocabulary"))
                })?;
                out.extend_from_slice(ids);
            }
            if eos {
                out.push(EOS_ID);
            }
            Ok(out)
        }

        fn encode_with_special_tokens(&self, text: &str) -> Result<Vec<u32>> {
            let mut out = vec![BOS_ID];
            out.extend(self.encode(text)?);
            Ok(out)
        }

        fn bos_token(&self) -> Option<String> {
            Some("<s>".to_string())
        }

        fn eos_token(&self) -> String {
            "</s>".to_string()
        }

        fn bos_token_id(&self) -> Option<u32> {
            Some(BOS_ID)
        }

        fn eos_token_id(&self) -> Option<u32> {
            Some(EOS_ID)
        }

        fn pad_token_id(&self) -> Option<u32> {
            Some(0)
        }
    }
}
