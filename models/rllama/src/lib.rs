//! # RLlama
//!
//! RLlama adapts the [Llama](https://github.com/facebookresearch/llama) family of causal language models to the
//! [`LanguageModelPlugin`] contract a serving host drives.
//!
//! The plugin does not own a model architecture or a tokenizer. You give it any model that implements
//! [`CausalLanguageModel`] and any tokenizer that implements [`TextTokenizer`], and it takes care of:
//! - wrapping prompts in the Llama prompt templates
//! - merging generation settings from the Llama defaults, the `LLAMA_GENERATION_*` environment variables and each request
//! - decoding text until a stop token
//! - extracting normalized sentence embeddings
//!
//! ## Usage
//!
//! ```rust, no_run
//! use rllama::prelude::*;
//!
//! fn run(model: impl CausalLanguageModel) -> anyhow::Result<()> {
//!     let tokenizer = HuggingFaceTokenizer::from_file("tokenizer.json")?;
//!     let llama = Llama::builder(model, tokenizer).build();
//!
//!     let request = SanitizeRequest::new("What is the capital of France?").with_max_new_tokens(64);
//!     println!("{}", llama.generate_text(request)?);
//!
//!     let embeddings = llama.embeddings(&["The capital of France is Paris."])?;
//!     println!("{:?}", embeddings.to_vec2()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod config;
mod embed;
mod generate;
mod import;
mod postprocess;
mod sanitize;
mod templates;

pub use config::LlamaConfig;
pub use embed::{mean_pool, normalize_l2};
pub use import::import_options;
pub use postprocess::postprocess;
pub use sanitize::{sanitize, PRIMARY_SLOT};
pub use templates::{LlamaPromptTemplates, DEFAULT_SYSTEM_MESSAGE};

use rllm_plugin::{
    CandleDeviceInventory, CausalLanguageModel, DeviceInventory, Embeddings, EnvSource,
    GenerationOverrides, ImportOptions, LanguageModelPlugin, ModelConfig, PluginError,
    ProcessEnv, PromptTemplateResolver, SanitizeRequest, SanitizedRequest, StopOnTokens,
    TextTokenizer,
};

/// A prelude of commonly used items in rllama.
pub mod prelude {
    pub use crate::{Llama, LlamaBuilder, LlamaConfig, LlamaPromptTemplates};
    pub use rllm_plugin::*;
}

/// A Llama plugin over an injected model and tokenizer.
pub struct Llama<M, T> {
    model: M,
    tokenizer: T,
    config: LlamaConfig,
    templates: Box<dyn PromptTemplateResolver + Send + Sync>,
    devices: Box<dyn DeviceInventory>,
    env: Box<dyn EnvSource + Send + Sync>,
    stop_tokens: StopOnTokens,
}

impl<M, T> std::fmt::Debug for Llama<M, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llama")
            .field("config", &self.config)
            .field("stop_tokens", &self.stop_tokens)
            .finish_non_exhaustive()
    }
}

impl<M: CausalLanguageModel, T: TextTokenizer> Llama<M, T> {
    /// Create a builder for a Llama plugin over a model and tokenizer.
    pub fn builder(model: M, tokenizer: T) -> LlamaBuilder<M, T> {
        LlamaBuilder::new(model, tokenizer)
    }

    /// The metadata and generation defaults of the plugin.
    pub fn llama_config(&self) -> &LlamaConfig {
        &self.config
    }
}

impl<M: CausalLanguageModel, T: TextTokenizer> LanguageModelPlugin for Llama<M, T> {
    type Model = M;
    type Tokenizer = T;

    fn config(&self) -> &ModelConfig {
        self.config.generation()
    }

    fn model(&self) -> &M {
        &self.model
    }

    fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    fn sanitize_parameters(
        &self,
        request: SanitizeRequest,
    ) -> Result<SanitizedRequest, PluginError> {
        sanitize(self.templates.as_ref(), request)
    }

    fn import_kwargs(&self) -> ImportOptions {
        import_options(self.devices.as_ref())
    }

    fn generate(
        &self,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> Result<Vec<String>, PluginError> {
        self.generate_sequences(prompt, overrides)
    }

    fn postprocess_generate(
        &self,
        _prompt: &str,
        results: Vec<String>,
    ) -> Result<String, PluginError> {
        postprocess(results)
    }

    fn embeddings(&self, prompts: &[&str]) -> Result<Embeddings, PluginError> {
        self.embed(prompts)
    }
}

/// A builder with configuration for a Llama plugin.
pub struct LlamaBuilder<M, T> {
    model: M,
    tokenizer: T,
    config: LlamaConfig,
    templates: Box<dyn PromptTemplateResolver + Send + Sync>,
    devices: Box<dyn DeviceInventory>,
    env: Box<dyn EnvSource + Send + Sync>,
    stop_tokens: StopOnTokens,
}

impl<M: CausalLanguageModel, T: TextTokenizer> LlamaBuilder<M, T> {
    /// Start building a plugin with the default Llama config and prompt templates, the process
    /// environment, and the accelerators candle can see.
    pub fn new(model: M, tokenizer: T) -> Self {
        Self {
            model,
            tokenizer,
            config: LlamaConfig::default(),
            templates: Box::new(LlamaPromptTemplates::default()),
            devices: Box::new(CandleDeviceInventory),
            env: Box::new(ProcessEnv),
            stop_tokens: StopOnTokens::default(),
        }
    }

    /// Set the metadata and generation defaults.
    pub fn with_config(mut self, config: LlamaConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default prompt templates.
    pub fn with_prompt_templates(
        mut self,
        templates: impl PromptTemplateResolver + Send + Sync + 'static,
    ) -> Self {
        self.templates = Box::new(templates);
        self
    }

    /// Set the accelerator inventory used to choose device placement.
    pub fn with_device_inventory(mut self, devices: impl DeviceInventory + 'static) -> Self {
        self.devices = Box::new(devices);
        self
    }

    /// Set where generation settings are read from instead of the process environment.
    pub fn with_env(mut self, env: impl EnvSource + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Set the tokens that stop generation.
    pub fn with_stop_tokens(mut self, stop_tokens: StopOnTokens) -> Self {
        self.stop_tokens = stop_tokens;
        self
    }

    /// Build the plugin.
    pub fn build(self) -> Llama<M, T> {
        let Self {
            model,
            tokenizer,
            config,
            templates,
            devices,
            env,
            stop_tokens,
        } = self;
        Llama {
            model,
            tokenizer,
            config,
            templates,
            devices,
            env,
            stop_tokens,
        }
    }
}
