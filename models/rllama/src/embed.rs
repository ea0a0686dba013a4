use candle_core::Tensor;
use rllm_plugin::{
    with_inference_mode, CausalLanguageModel, Embeddings, PluginError, TextTokenizer,
};

use crate::Llama;

/// Average the hidden states of every non-padding token.
///
/// `hidden` is `(batch, sequence, hidden)` and `attention_mask` is `(batch, sequence)`. Rows
/// without any non-padding token divide by zero.
pub fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask
        .to_dtype(hidden.dtype())?
        .unsqueeze(2)?
        .broadcast_as(hidden.shape())?;
    let summed = (hidden * &mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    summed / counts
}

/// Scale every row of a `(batch, hidden)` tensor to unit L2 norm.
pub fn normalize_l2(v: &Tensor) -> candle_core::Result<Tensor> {
    v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-12)?)
}

impl<M: CausalLanguageModel, T: TextTokenizer> Llama<M, T> {
    /// Embed a batch of prompts with the mean of the last hidden layer over non-padding tokens.
    #[tracing::instrument(skip_all, fields(batch = prompts.len()))]
    pub(crate) fn embed(&self, prompts: &[&str]) -> Result<Embeddings, PluginError> {
        if prompts.is_empty() {
            return Err(PluginError::EmptyEmbeddingInput { index: 0 });
        }

        let batch = self.tokenizer.encode_batch(prompts)?;
        if let Some(index) = batch
            .attention_mask
            .iter()
            .position(|mask| mask.iter().all(|token| *token == 0))
        {
            return Err(PluginError::EmptyEmbeddingInput { index });
        }
        let num_tokens = batch.num_tokens();
        let (input_ids, attention_mask) = batch.to_tensors(self.model.device())?;

        let embeddings = with_inference_mode(|| -> Result<Tensor, PluginError> {
            let output = self
                .model
                .forward(&input_ids, Some(&attention_mask), true)?;
            let pooled = mean_pool(output.last_hidden_state()?, &attention_mask)?;
            Ok(normalize_l2(&pooled)?.detach())
        })?;

        Ok(Embeddings {
            embeddings,
            num_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn mean_pool_ignores_padding() -> candle_core::Result<()> {
        let hidden = Tensor::new(
            &[[[1f32, 2.], [3., 4.], [100., 100.]], [[5., 6.], [7., 8.], [9., 10.]]],
            &Device::Cpu,
        )?;
        let mask = Tensor::new(&[[1u32, 1, 0], [1, 1, 1]], &Device::Cpu)?;
        let pooled = mean_pool(&hidden, &mask)?.to_vec2::<f32>()?;
        assert_eq!(pooled, vec![vec![2., 3.], vec![7., 8.]]);
        Ok(())
    }

    #[test]
    fn normalized_rows_have_unit_norm() -> candle_core::Result<()> {
        let v = Tensor::new(&[[3f32, 4.], [0., 0.]], &Device::Cpu)?;
        let normalized = normalize_l2(&v)?.to_vec2::<f32>()?;
        assert_eq!(normalized, vec![vec![0.6, 0.8], vec![0., 0.]]);
        Ok(())
    }
}
