use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    CausalLanguageModel, GenerationOverrides, ModelConfig, PluginError, TemplateVersion,
    TextTokenizer,
};

/// A raw generation request, before the plugin turns it into a prompt and generation overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeRequest {
    /// The user's prompt. With the default prompt template enabled, this fills the `instruction` slot.
    pub prompt: String,
    /// The number of most likely tokens to sample from.
    pub top_k: Option<usize>,
    /// The nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// The sampling temperature.
    pub temperature: Option<f64>,
    /// The maximum number of tokens to generate.
    pub max_new_tokens: Option<u32>,
    /// Wrap the prompt in the model's default prompt template.
    pub use_default_prompt_template: bool,
    /// Which default prompt template to use.
    pub template_version: TemplateVersion,
    /// Extra keyword values for the template's other placeholders.
    pub attrs: Map<String, Value>,
}

impl SanitizeRequest {
    /// Create a request for a prompt with every knob unset and the default prompt template enabled.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            top_k: None,
            top_p: None,
            temperature: None,
            max_new_tokens: None,
            use_default_prompt_template: true,
            template_version: TemplateVersion::default(),
            attrs: Map::new(),
        }
    }

    /// Set the top-k cutoff.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set the nucleus sampling threshold.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of new tokens.
    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = Some(max_new_tokens);
        self
    }

    /// Enable or disable the default prompt template.
    pub fn with_default_prompt_template(mut self, enabled: bool) -> Self {
        self.use_default_prompt_template = enabled;
        self
    }

    /// Set the default prompt template version.
    pub fn with_template_version(mut self, version: TemplateVersion) -> Self {
        self.template_version = version;
        self
    }

    /// Use the chat template ([`TemplateVersion::V2`]) if `true`, otherwise the plain one.
    pub fn with_llama2_prompt(self, llama2: bool) -> Self {
        self.with_template_version(if llama2 {
            TemplateVersion::V2
        } else {
            TemplateVersion::V1
        })
    }

    /// Add an extra keyword value.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// The generation knobs of this request.
    pub fn overrides(&self) -> GenerationOverrides {
        GenerationOverrides {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }
}

/// A request after sanitization: the final prompt text and the generation overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedRequest {
    /// The prompt to feed the model.
    pub prompt: String,
    /// The generation knobs. Unset knobs stay unset.
    pub generation_config: GenerationOverrides,
    /// Extra settings for the host. Always empty for the plugins in this workspace.
    pub extra: Map<String, Value>,
}

/// How the host should place a model's weights across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMap {
    /// Let the host split the model across every available accelerator.
    Auto,
}

/// Options for loading the model weights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelImportOptions {
    /// The device placement. `None` leaves placement to the host's default.
    pub device_map: Option<DeviceMap>,
}

/// Options for loading the tokenizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerImportOptions {}

/// Options the host uses when it loads a plugin's model and tokenizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Options for the model.
    pub model: ModelImportOptions,
    /// Options for the tokenizer.
    pub tokenizer: TokenizerImportOptions,
}

/// Sentence embeddings for a batch of prompts.
#[derive(Debug, Clone)]
pub struct Embeddings {
    /// L2 normalized embeddings of shape `(batch, hidden)`.
    pub embeddings: Tensor,
    /// The number of non-padding tokens across the whole batch.
    pub num_tokens: usize,
}

impl Embeddings {
    /// Copy the embeddings to the host, one row per prompt.
    pub fn to_vec2(&self) -> candle_core::Result<Vec<Vec<f32>>> {
        self.embeddings.to_dtype(DType::F32)?.to_vec2()
    }
}

/// The contract between a model family and the host serving framework.
pub trait LanguageModelPlugin {
    /// The model the plugin drives.
    type Model: CausalLanguageModel;
    /// The tokenizer the plugin uses.
    type Tokenizer: TextTokenizer;

    /// The model family's generation defaults.
    fn config(&self) -> &ModelConfig;

    /// The model.
    fn model(&self) -> &Self::Model;

    /// The tokenizer.
    fn tokenizer(&self) -> &Self::Tokenizer;

    /// The device the model runs on.
    fn device(&self) -> &Device {
        self.model().device()
    }

    /// Turn a raw request into the final prompt and generation overrides.
    fn sanitize_parameters(&self, request: SanitizeRequest)
        -> Result<SanitizedRequest, PluginError>;

    /// The options the host should load the model and tokenizer with.
    fn import_kwargs(&self) -> ImportOptions;

    /// Generate text for a prompt. Returns one string per generated sequence.
    fn generate(
        &self,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> Result<Vec<String>, PluginError>;

    /// Reduce the raw generations to the response for a prompt.
    fn postprocess_generate(
        &self,
        prompt: &str,
        results: Vec<String>,
    ) -> Result<String, PluginError>;

    /// Embed a batch of prompts.
    fn embeddings(&self, prompts: &[&str]) -> Result<Embeddings, PluginError>;

    /// Sanitize a request, generate, then post-process the result.
    fn generate_text(&self, request: SanitizeRequest) -> Result<String, PluginError> {
        let SanitizedRequest {
            prompt,
            generation_config,
            ..
        } = self.sanitize_parameters(request)?;
        let results = self.generate(&prompt, &generation_config)?;
        self.postprocess_generate(&prompt, results)
    }
}
