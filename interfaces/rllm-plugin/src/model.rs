use candle_core::{DType, Device, Tensor};

use crate::{GenerationConfig, PluginError, StoppingCriteria};

/// The result of running a causal language model over a batch.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Logits of shape `(batch, sequence, vocab)`.
    pub logits: Tensor,
    /// The hidden states of every layer, each of shape `(batch, sequence, hidden)`, if they were requested.
    pub hidden_states: Option<Vec<Tensor>>,
}

impl ModelOutput {
    /// The hidden states of the last layer.
    pub fn last_hidden_state(&self) -> Result<&Tensor, PluginError> {
        self.hidden_states
            .as_ref()
            .and_then(|states| states.last())
            .ok_or(PluginError::MissingHiddenStates)
    }
}

/// A causal language model that can be driven by a plugin.
pub trait CausalLanguageModel {
    /// The device the model's weights live on.
    fn device(&self) -> &Device;

    /// Run the model over a batch of `u32` token ids of shape `(batch, sequence)`.
    ///
    /// `attention_mask` has the same shape as `input_ids` with `1` for real tokens and `0` for padding.
    fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        output_hidden_states: bool,
    ) -> candle_core::Result<ModelOutput>;

    /// Sample new tokens after every prompt in `input_ids` until `max_new_tokens` are generated,
    /// the end of sequence token is sampled, or `stopping` fires.
    ///
    /// The returned sequences include their prompt tokens.
    ///
    /// The default implementation is uncached: every step runs the whole sequence through
    /// [`CausalLanguageModel::forward`] again. It decodes each row of `input_ids` on its own and
    /// passes no attention mask, so rows must not be padded. Use it with a batch size of 1, and
    /// override it with a key/value cache for long generations.
    fn generate(
        &self,
        input_ids: &Tensor,
        config: &GenerationConfig,
        stopping: &dyn StoppingCriteria,
    ) -> Result<Vec<Vec<u32>>, PluginError> {
        let prompts = input_ids.to_vec2::<u32>()?;
        let mut sequences = Vec::with_capacity(prompts.len());

        for mut tokens in prompts {
            if tokens.is_empty() {
                return Err(candle_core::Error::Msg("Cannot run model on empty input".into()).into());
            }
            let mut sampler = config.logits_processor();

            for index in 0..config.max_new_tokens {
                let input = Tensor::new(tokens.as_slice(), self.device())?.unsqueeze(0)?;
                let output = self.forward(&input, None, false)?;
                let logits = output
                    .logits
                    .get(0)?
                    .get(tokens.len() - 1)?
                    .to_dtype(DType::F32)?;
                let next_token = sampler.sample(&logits)?;
                tokens.push(next_token);
                tracing::trace!(index, next_token, "sampled token");

                if config.eos_token_id == Some(next_token) || stopping.should_stop(&tokens) {
                    break;
                }
            }

            sequences.push(tokens);
        }

        Ok(sequences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StopOnTokens;
    use pretty_assertions::assert_eq;

    /// Always predicts `(last token + 1) % VOCAB`.
    struct Counter {
        device: Device,
    }

    const VOCAB: usize = 6;

    impl CausalLanguageModel for Counter {
        fn device(&self) -> &Device {
            &self.device
        }

        fn forward(
            &self,
            input_ids: &Tensor,
            _: Option<&Tensor>,
            _: bool,
        ) -> candle_core::Result<ModelOutput> {
            let (batch, seq) = input_ids.dims2()?;
            let ids = input_ids.flatten_all()?.to_vec1::<u32>()?;
            let mut logits = vec![0f32; batch * seq * VOCAB];
            for (i, id) in ids.into_iter().enumerate() {
                logits[i * VOCAB + (id as usize + 1) % VOCAB] = 10.0;
            }
            Ok(ModelOutput {
                logits: Tensor::from_vec(logits, (batch, seq, VOCAB), &self.device)?,
                hidden_states: None,
            })
        }
    }

    fn greedy(max_new_tokens: u32) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens,
            temperature: 0.0,
            ..Default::default()
        }
    }

    fn prompt(ids: &[u32]) -> Tensor {
        Tensor::new(ids, &Device::Cpu).unwrap().unsqueeze(0).unwrap()
    }

    #[test]
    fn generates_up_to_max_new_tokens() {
        let model = Counter {
            device: Device::Cpu,
        };
        let sequences = model
            .generate(&prompt(&[1]), &greedy(3), &|_: &[u32]| false)
            .unwrap();
        assert_eq!(sequences, vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn stops_on_the_eos_token() {
        let model = Counter {
            device: Device::Cpu,
        };
        let config = GenerationConfig {
            eos_token_id: Some(3),
            ..greedy(10)
        };
        let sequences = model
            .generate(&prompt(&[1]), &config, &|_: &[u32]| false)
            .unwrap();
        assert_eq!(sequences, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn rows_are_decoded_independently() {
        let model = Counter {
            device: Device::Cpu,
        };
        let input_ids = Tensor::new(&[[1u32], [3]], &Device::Cpu).unwrap();
        let sequences = model
            .generate(&input_ids, &greedy(2), &|_: &[u32]| false)
            .unwrap();
        assert_eq!(sequences, vec![vec![1, 2, 3], vec![3, 4, 5]]);
    }

    #[test]
    fn stops_when_a_criteria_fires() {
        let model = Counter {
            device: Device::Cpu,
        };
        let sequences = model
            .generate(&prompt(&[4]), &greedy(10), &StopOnTokens::new([0]))
            .unwrap();
        assert_eq!(sequences, vec![vec![4, 5, 0]]);
    }

    #[test]
    fn missing_hidden_states_is_an_error() {
        let output = ModelOutput {
            logits: Tensor::zeros((1, 1, 1), DType::F32, &Device::Cpu).unwrap(),
            hidden_states: None,
        };
        assert!(matches!(
            output.last_hidden_state(),
            Err(PluginError::MissingHiddenStates)
        ));
    }
}
