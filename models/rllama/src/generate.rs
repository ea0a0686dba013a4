use candle_core::Tensor;
use rllm_plugin::{
    with_inference_mode, CausalLanguageModel, GenerationOverrides, PluginError,
    StoppingCriteriaList, TextTokenizer,
};

use crate::Llama;

impl<M: CausalLanguageModel, T: TextTokenizer> Llama<M, T> {
    /// Generate text for a prompt with the model defaults, the environment and `overrides` merged.
    ///
    /// Each returned string is a whole decoded sequence, prompt included.
    #[tracing::instrument(skip_all, fields(prompt_len = prompt.len()))]
    pub(crate) fn generate_sequences(
        &self,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> Result<Vec<String>, PluginError> {
        let mut config = self
            .config
            .generation()
            .model_construct_env(overrides, self.env.as_ref())?;
        if config.eos_token_id.is_none() {
            config.eos_token_id = self.tokenizer.eos_token_id();
        }
        let stopping = StoppingCriteriaList::new().with(self.stop_tokens.clone());

        let tokens = self.tokenizer.encode(prompt)?;
        let input_ids = Tensor::new(tokens.as_slice(), self.model.device())?.unsqueeze(0)?;

        let sequences =
            with_inference_mode(|| self.model.generate(&input_ids, &config, &stopping))?;
        tracing::debug!(
            sequences = sequences.len(),
            prompt_tokens = tokens.len(),
            "finished generating"
        );

        Ok(self.tokenizer.decode_batch(&sequences)?)
    }
}
