use rllm_plugin::{GenerationConfig, ModelConfig};

/// Metadata and generation defaults for the Llama family.
#[derive(Debug, Clone, PartialEq)]
pub struct LlamaConfig {
    default_id: String,
    model_ids: Vec<String>,
    url: String,
    generation: ModelConfig,
}

impl Default for LlamaConfig {
    fn default() -> Self {
        Self {
            default_id: "meta-llama/Llama-2-70b-chat-hf".to_string(),
            model_ids: [
                "meta-llama/Llama-2-70b-chat-hf",
                "meta-llama/Llama-2-13b-chat-hf",
                "meta-llama/Llama-2-7b-chat-hf",
                "meta-llama/Llama-2-70b-hf",
                "meta-llama/Llama-2-13b-hf",
                "meta-llama/Llama-2-7b-hf",
                "NousResearch/llama-2-70b-chat-hf",
                "NousResearch/llama-2-13b-chat-hf",
                "NousResearch/llama-2-7b-chat-hf",
                "NousResearch/llama-2-70b-hf",
                "NousResearch/llama-2-13b-hf",
                "NousResearch/llama-2-7b-hf",
                "openlm-research/open_llama_7b_v2",
                "openlm-research/open_llama_3b_v2",
                "openlm-research/open_llama_13b",
                "huggyllama/llama-65b",
                "huggyllama/llama-30b",
                "huggyllama/llama-13b",
                "huggyllama/llama-7b",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            url: "https://github.com/facebookresearch/llama".to_string(),
            generation: ModelConfig::new(
                "llama",
                GenerationConfig {
                    max_new_tokens: 256,
                    temperature: 0.45,
                    top_p: 0.95,
                    top_k: 12,
                    ..Default::default()
                },
            ),
        }
    }
}

impl LlamaConfig {
    /// Set the model id used when none is given.
    pub fn with_default_id(mut self, default_id: impl Into<String>) -> Self {
        self.default_id = default_id.into();
        self
    }

    /// Set the generation defaults and environment prefix.
    pub fn with_generation(mut self, generation: ModelConfig) -> Self {
        self.generation = generation;
        self
    }

    /// The name of the model family.
    pub fn name(&self) -> &str {
        self.generation.name()
    }

    /// The model id used when none is given.
    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Every known model id of the family.
    pub fn model_ids(&self) -> &[String] {
        &self.model_ids
    }

    /// The home page of the model family.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The generation defaults and environment prefix.
    pub fn generation(&self) -> &ModelConfig {
        &self.generation
    }
}

#[test]
fn llama_defaults() {
    let config = LlamaConfig::default();
    assert_eq!(config.name(), "llama");
    assert_eq!(config.generation().env_prefix(), "LLAMA");
    assert!(config.model_ids().iter().any(|id| id == config.default_id()));

    let defaults = config.generation().defaults();
    assert_eq!(defaults.max_new_tokens, 256);
    assert_eq!(defaults.temperature, 0.45);
    assert_eq!(defaults.top_p, 0.95);
    assert_eq!(defaults.top_k, 12);
}
