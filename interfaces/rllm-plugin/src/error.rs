use std::collections::BTreeSet;

use crate::{ConfigError, FormatError, TokenizerError};

/// An error that can occur while sanitizing, generating, embedding or post-processing with a plugin.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The template's primary slot was passed as an extra attribute while the default prompt template is enabled.
    #[error("'{slot}' should be passed as the first argument instead of as a keyword argument when the default prompt template is enabled")]
    PrimarySlotCollision {
        /// The name of the primary slot.
        slot: String,
    },
    /// The prompt template references a placeholder that was not given a value.
    #[error("Missing variable '{missing}' (required: {}) in prompt template. Pass it as an attribute or disable the default prompt template", .required.iter().map(String::as_str).collect::<Vec<_>>().join(", "))]
    MissingTemplateVariable {
        /// The placeholder without a value.
        missing: String,
        /// Every placeholder the template references.
        required: BTreeSet<String>,
    },
    /// Generation finished without producing any sequence.
    #[error("Generation produced no output")]
    EmptyGeneration,
    /// A prompt passed to the embedding extractor has no tokens.
    #[error("Cannot embed prompt {index}: it has no tokens")]
    EmptyEmbeddingInput {
        /// The index of the prompt in the batch.
        index: usize,
    },
    /// The model did not return hidden states when they were requested.
    #[error("The model did not return hidden states")]
    MissingHiddenStates,
    /// An error from candle.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
    /// An error from the tokenizer.
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    /// An error in the prompt template.
    #[error("Prompt template error: {0}")]
    Template(#[from] FormatError),
    /// An error reading the generation settings.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[test]
fn missing_variable_message_lists_the_required_set() {
    let err = PluginError::MissingTemplateVariable {
        missing: "system".to_string(),
        required: ["instruction", "system"]
            .into_iter()
            .map(String::from)
            .collect(),
    };
    let message = err.to_string();
    assert!(message.contains("'system'"));
    assert!(message.contains("instruction, system"));
    assert!(message.contains("disable the default prompt template"));
}
