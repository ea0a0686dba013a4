#![allow(dead_code)]

use std::collections::HashMap;

use candle_core::{Device, Module, Tensor};
use candle_nn::{Embedding, Linear};
use rllama::prelude::*;

pub const VOCAB: usize = 8;

pub const TOKENIZER_JSON: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        {"id": 0, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 1, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 2, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 3, "content": "<unk>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
    ],
    "normalizer": null,
    "pre_tokenizer": {"type": "Whitespace"},
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {"<pad>": 0, "<s>": 1, "</s>": 2, "<unk>": 3, "hello": 4, "world": 5, "foo": 6, "bar": 7},
        "unk_token": "<unk>"
    }
}"#;

/// A one layer model that always predicts `hello -> world -> foo -> bar -> </s>`.
/// Every other token predicts `</s>`.
pub struct TinyModel {
    embedding: Embedding,
    lm_head: Linear,
    device: Device,
}

impl TinyModel {
    pub fn new() -> candle_core::Result<Self> {
        let device = Device::Cpu;
        let one_hot = (0..VOCAB * VOCAB)
            .map(|i| if i / VOCAB == i % VOCAB { 1f32 } else { 0. })
            .collect::<Vec<_>>();
        let embedding = Embedding::new(Tensor::from_vec(one_hot, (VOCAB, VOCAB), &device)?, VOCAB);

        let mut weight = vec![0f32; VOCAB * VOCAB];
        for (from, to) in [(0, 2), (1, 2), (2, 2), (3, 2), (4, 5), (5, 6), (6, 7), (7, 2)] {
            weight[to * VOCAB + from] = 1.0;
        }
        let lm_head = Linear::new(Tensor::from_vec(weight, (VOCAB, VOCAB), &device)?, None);

        Ok(Self {
            embedding,
            lm_head,
            device,
        })
    }
}

impl CausalLanguageModel for TinyModel {
    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(
        &self,
        input_ids: &Tensor,
        _attention_mask: Option<&Tensor>,
        output_hidden_states: bool,
    ) -> candle_core::Result<ModelOutput> {
        let embedded = self.embedding.forward(input_ids)?;
        let hidden = embedded.tanh()?;
        let logits = self.lm_head.forward(&hidden)?;
        Ok(ModelOutput {
            logits,
            hidden_states: output_hidden_states.then(|| vec![embedded, hidden]),
        })
    }
}

pub fn tokenizer() -> HuggingFaceTokenizer {
    HuggingFaceTokenizer::from_bytes(TOKENIZER_JSON).unwrap()
}

pub fn builder() -> LlamaBuilder<TinyModel, HuggingFaceTokenizer> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Llama::builder(TinyModel::new().unwrap(), tokenizer())
        .with_env(HashMap::<String, String>::new())
        .with_device_inventory(FixedDeviceInventory(0))
}

pub fn llama() -> Llama<TinyModel, HuggingFaceTokenizer> {
    builder().build()
}

/// A request that uses the plain template and greedy decoding.
pub fn greedy(prompt: &str) -> SanitizeRequest {
    SanitizeRequest::new(prompt)
        .with_llama2_prompt(false)
        .with_temperature(0.0)
}
