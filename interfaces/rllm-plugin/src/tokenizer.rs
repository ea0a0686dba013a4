use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use candle_core::{Device, Tensor};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};

/// An error from a tokenizer.
#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    /// An error from the tokenizers crate.
    #[error("Tokenizer error: {0}")]
    Tokenizers(tokenizers::Error),
}

/// Tokens that are tried, in order, as the padding token.
const PAD_TOKENS: [&str; 4] = ["<pad>", "[PAD]", "<unk>", "</s>"];

/// Tokens that are tried, in order, as the end of sequence token.
const EOS_TOKENS: [&str; 3] = ["</s>", "<|end_of_text|>", "<|endoftext|>"];

/// Spaces the tokenizer leaves before punctuation and English contractions, and their replacements.
const TOKENIZATION_SPACES: [(&str, &str); 10] = [
    (" .", "."),
    (" ?", "?"),
    (" !", "!"),
    (" ,", ","),
    (" ' ", "'"),
    (" n't", "n't"),
    (" 'm", "'m"),
    (" 's", "'s"),
    (" 've", "'ve"),
    (" 're", "'re"),
];

/// Remove the spaces tokenization inserts before punctuation and contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    TOKENIZATION_SPACES
        .iter()
        .fold(text.to_string(), |text, (from, to)| text.replace(from, to))
}

/// A batch of token ids padded to a common length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchEncoding {
    /// The token ids of each sequence, padded on the right.
    pub input_ids: Vec<Vec<u32>>,
    /// `1` for real tokens and `0` for padding, in the same shape as `input_ids`.
    pub attention_mask: Vec<Vec<u32>>,
}

impl BatchEncoding {
    /// The number of sequences in the batch.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    /// Check if the batch has no sequences.
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// The padded length of every sequence.
    pub fn sequence_len(&self) -> usize {
        self.input_ids.first().map(Vec::len).unwrap_or_default()
    }

    /// The number of non-padding tokens across the whole batch.
    pub fn num_tokens(&self) -> usize {
        self.attention_mask
            .iter()
            .flatten()
            .map(|mask| *mask as usize)
            .sum()
    }

    /// Create `(input_ids, attention_mask)` tensors of shape `(batch, sequence)` on a device.
    pub fn to_tensors(&self, device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
        let batch = self.len();
        let sequence_len = self.sequence_len();
        if self.attention_mask.len() != batch
            || self
                .input_ids
                .iter()
                .chain(&self.attention_mask)
                .any(|row| row.len() != sequence_len)
        {
            candle_core::bail!("Cannot create tensors from a batch of ragged sequences");
        }

        let input_ids = self.input_ids.concat();
        let attention_mask = self.attention_mask.concat();
        let input_ids = Tensor::from_vec(input_ids, (batch, sequence_len), device)?;
        let attention_mask = Tensor::from_vec(attention_mask, (batch, sequence_len), device)?;
        Ok((input_ids, attention_mask))
    }
}

/// The tokenizer capability a plugin needs: turn text into token ids and back.
pub trait TextTokenizer {
    /// Encode text into token ids, adding the tokenizer's special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError>;

    /// Decode token ids into text.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError>;

    /// Look up the id of a token in the vocabulary.
    fn token_to_id(&self, token: &str) -> Option<u32>;

    /// The id used to pad batches.
    fn pad_token_id(&self) -> u32 {
        PAD_TOKENS
            .iter()
            .find_map(|token| self.token_to_id(token))
            .unwrap_or_default()
    }

    /// The end of sequence token, if the vocabulary has one.
    fn eos_token_id(&self) -> Option<u32> {
        EOS_TOKENS.iter().find_map(|token| self.token_to_id(token))
    }

    /// Encode a batch of texts, padding every sequence on the right to the longest one.
    fn encode_batch(&self, texts: &[&str]) -> Result<BatchEncoding, TokenizerError> {
        let encoded = texts
            .iter()
            .map(|text| self.encode(text))
            .collect::<Result<Vec<_>, _>>()?;
        let longest = encoded.iter().map(Vec::len).max().unwrap_or_default();
        let pad_token_id = self.pad_token_id();

        let mut batch = BatchEncoding::default();
        for mut ids in encoded {
            let mut mask = vec![1; ids.len()];
            mask.resize(longest, 0);
            ids.resize(longest, pad_token_id);
            batch.input_ids.push(ids);
            batch.attention_mask.push(mask);
        }
        Ok(batch)
    }

    /// Decode generated sequences, skipping special tokens and cleaning up tokenization spaces.
    fn decode_batch(&self, sequences: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        sequences
            .iter()
            .map(|ids| Ok(clean_up_tokenization(&self.decode(ids, true)?)))
            .collect()
    }
}

/// A [`TextTokenizer`] backed by a Hugging Face `tokenizers` tokenizer.
pub struct HuggingFaceTokenizer {
    tokenizer: RwLock<Tokenizer>,
}

impl std::fmt::Debug for HuggingFaceTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceTokenizer").finish_non_exhaustive()
    }
}

impl From<Tokenizer> for HuggingFaceTokenizer {
    fn from(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer: RwLock::new(tokenizer),
        }
    }
}

impl HuggingFaceTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        Ok(Tokenizer::from_file(path)
            .map_err(TokenizerError::Tokenizers)?
            .into())
    }

    /// Load a tokenizer from the bytes of a `tokenizer.json` file.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, TokenizerError> {
        Ok(Tokenizer::from_bytes(bytes)
            .map_err(TokenizerError::Tokenizers)?
            .into())
    }

    fn read(&self) -> RwLockReadGuard<'_, Tokenizer> {
        self.tokenizer.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tokenizer> {
        self.tokenizer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl TextTokenizer for HuggingFaceTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .read()
            .encode(text, true)
            .map_err(TokenizerError::Tokenizers)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        self.read()
            .decode(ids, skip_special_tokens)
            .map_err(TokenizerError::Tokenizers)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.read().token_to_id(token)
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<BatchEncoding, TokenizerError> {
        let pad_token = PAD_TOKENS
            .iter()
            .find_map(|token| Some((*token, self.token_to_id(token)?)));
        let encodings = {
            let mut tokenizer_write = self.write();
            if let Some(pp) = tokenizer_write.get_padding_mut() {
                pp.strategy = PaddingStrategy::BatchLongest
            } else {
                let mut pp = PaddingParams {
                    strategy: PaddingStrategy::BatchLongest,
                    ..Default::default()
                };
                if let Some((token, id)) = pad_token {
                    pp.pad_token = token.to_string();
                    pp.pad_id = id;
                }
                tokenizer_write.with_padding(Some(pp));
            }
            tokenizer_write
                .encode_batch(texts.to_vec(), true)
                .map_err(TokenizerError::Tokenizers)?
        };

        Ok(BatchEncoding {
            input_ids: encodings
                .iter()
                .map(|encoding| encoding.get_ids().to_vec())
                .collect(),
            attention_mask: encodings
                .iter()
                .map(|encoding| encoding.get_attention_mask().to_vec())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 2, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"<pad>": 0, "<s>": 1, "</s>": 2, "<unk>": 3, "hello": 4, "world": 5, "it": 6, "'s": 7, "done": 8, ".": 9},
            "unk_token": "<unk>"
        }
    }"#;

    /// Splits on whitespace and looks words up in a fixed vocabulary.
    struct WordTokenizer(Vec<&'static str>);

    impl TextTokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
            Ok(text
                .split_whitespace()
                .map(|word| self.token_to_id(word).unwrap_or(1))
                .collect())
        }

        fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
            Ok(ids
                .iter()
                .filter(|id| !skip_special_tokens || **id > 1)
                .map(|id| self.0[*id as usize])
                .collect::<Vec<_>>()
                .join(" "))
        }

        fn token_to_id(&self, token: &str) -> Option<u32> {
            self.0.iter().position(|word| *word == token).map(|i| i as u32)
        }
    }

    fn word_tokenizer() -> WordTokenizer {
        WordTokenizer(vec!["<pad>", "<unk>", "a", "b", "c", "!"])
    }

    #[test]
    fn cleans_up_tokenization_spaces() {
        assert_eq!(
            clean_up_tokenization("it 's done , is n't it ? yes !"),
            "it's done, isn't it? yes!"
        );
        assert_eq!(clean_up_tokenization("no change"), "no change");
    }

    #[test]
    fn default_batch_encoding_pads_on_the_right() {
        let batch = word_tokenizer().encode_batch(&["a b c", "b"]).unwrap();
        assert_eq!(batch.input_ids, vec![vec![2, 3, 4], vec![3, 0, 0]]);
        assert_eq!(batch.attention_mask, vec![vec![1, 1, 1], vec![1, 0, 0]]);
        assert_eq!(batch.num_tokens(), 4);
        assert_eq!(batch.sequence_len(), 3);
    }

    #[test]
    fn batch_tensors_have_batch_by_sequence_shape() {
        let batch = word_tokenizer().encode_batch(&["a b", "c"]).unwrap();
        let (ids, mask) = batch.to_tensors(&Device::Cpu).unwrap();
        assert_eq!(ids.dims(), &[2, 2]);
        assert_eq!(mask.to_vec2::<u32>().unwrap(), vec![vec![1, 1], vec![1, 0]]);
    }

    #[test]
    fn ragged_batches_are_rejected() {
        let batch = BatchEncoding {
            input_ids: vec![vec![1, 2], vec![3]],
            attention_mask: vec![vec![1, 1], vec![1]],
        };
        assert!(batch.to_tensors(&Device::Cpu).is_err());
    }

    #[test]
    fn decode_batch_skips_special_tokens() {
        let decoded = word_tokenizer()
            .decode_batch(&[vec![2, 3, 0, 5], vec![4]])
            .unwrap();
        assert_eq!(decoded, vec!["a b!".to_string(), "c".to_string()]);
    }

    #[test]
    fn hugging_face_tokenizer_pads_with_the_pad_token() {
        let tokenizer = HuggingFaceTokenizer::from_bytes(TOKENIZER_JSON).unwrap();
        assert_eq!(tokenizer.pad_token_id(), 0);
        assert_eq!(tokenizer.eos_token_id(), Some(2));

        let batch = tokenizer.encode_batch(&["hello world", "world"]).unwrap();
        assert_eq!(batch.input_ids, vec![vec![4, 5], vec![5, 0]]);
        assert_eq!(batch.attention_mask, vec![vec![1, 1], vec![1, 0]]);
    }

    #[test]
    fn hugging_face_tokenizer_round_trips_text() {
        let tokenizer = HuggingFaceTokenizer::from_bytes(TOKENIZER_JSON).unwrap();
        let ids = tokenizer.encode("hello world.").unwrap();
        assert_eq!(ids, vec![4, 5, 9]);
        let decoded = tokenizer.decode_batch(&[vec![6, 7, 8, 9, 2]]).unwrap();
        assert_eq!(decoded, vec!["it's done.".to_string()]);
    }
}
