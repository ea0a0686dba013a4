use std::collections::{BTreeMap, HashMap};

use candle_transformers::generation::{LogitsProcessor, Sampling};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Per-request generation knobs.
///
/// Every field is optional and `None` means "use the model default". The struct always carries
/// all four knobs so an unset value stays visible as unset instead of disappearing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOverrides {
    /// The maximum number of tokens to generate after the prompt.
    pub max_new_tokens: Option<u32>,
    /// The sampling temperature. Zero or below means greedy decoding.
    pub temperature: Option<f64>,
    /// The nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// The number of most likely tokens to sample from.
    pub top_k: Option<usize>,
}

impl GenerationOverrides {
    /// The names of the knobs, in the order they appear in [`GenerationOverrides::to_map`].
    pub const KEYS: [&'static str; 4] = ["max_new_tokens", "temperature", "top_p", "top_k"];

    /// Set the maximum number of new tokens.
    pub fn with_max_new_tokens(mut self, max_new_tokens: impl Into<Option<u32>>) -> Self {
        self.max_new_tokens = max_new_tokens.into();
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: impl Into<Option<f64>>) -> Self {
        self.temperature = temperature.into();
        self
    }

    /// Set the nucleus sampling threshold.
    pub fn with_top_p(mut self, top_p: impl Into<Option<f64>>) -> Self {
        self.top_p = top_p.into();
        self
    }

    /// Set the top-k cutoff.
    pub fn with_top_k(mut self, top_k: impl Into<Option<usize>>) -> Self {
        self.top_k = top_k.into();
        self
    }

    /// Get the overrides as a four-key map. Unset knobs map to `null`.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("max_new_tokens".to_string(), json!(self.max_new_tokens));
        map.insert("temperature".to_string(), json!(self.temperature));
        map.insert("top_p".to_string(), json!(self.top_p));
        map.insert("top_k".to_string(), json!(self.top_k));
        map
    }
}

/// The concrete settings a model decodes with, after defaults, the environment and overrides are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// The maximum number of tokens to generate after the prompt.
    pub max_new_tokens: u32,
    /// The sampling temperature. Zero or below means greedy decoding.
    pub temperature: f64,
    /// The nucleus sampling threshold. `1.0` or above disables it.
    pub top_p: f64,
    /// The number of most likely tokens to sample from. `0` disables it.
    pub top_k: usize,
    /// The seed for the sampler.
    pub seed: u64,
    /// The end of sequence token. Generation stops after it is sampled.
    pub eos_token_id: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 128,
            temperature: 0.8,
            top_p: 1.0,
            top_k: 0,
            seed: 299792458,
            eos_token_id: None,
        }
    }
}

impl GenerationConfig {
    /// Apply every override that is set.
    pub fn apply(&mut self, overrides: &GenerationOverrides) {
        let GenerationOverrides {
            max_new_tokens,
            temperature,
            top_p,
            top_k,
        } = overrides;
        if let Some(max_new_tokens) = max_new_tokens {
            self.max_new_tokens = *max_new_tokens;
        }
        if let Some(temperature) = temperature {
            self.temperature = *temperature;
        }
        if let Some(top_p) = top_p {
            self.top_p = *top_p;
        }
        if let Some(top_k) = top_k {
            self.top_k = *top_k;
        }
    }

    /// The sampling strategy these settings describe.
    pub fn sampling(&self) -> Sampling {
        if self.temperature <= 0.0 {
            return Sampling::ArgMax;
        }
        let temperature = self.temperature;
        let top_k = (self.top_k > 0).then_some(self.top_k);
        let top_p = (self.top_p > 0.0 && self.top_p < 1.0).then_some(self.top_p);
        match (top_k, top_p) {
            (None, None) => Sampling::All { temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        }
    }

    /// Create a fresh sampler for these settings.
    pub fn logits_processor(&self) -> LogitsProcessor {
        LogitsProcessor::from_sampling(self.seed, self.sampling())
    }
}

/// An error that can occur while reading generation settings from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable did not hold a valid value for its setting.
    #[error("Invalid value {value:?} for environment variable {variable}: {source}")]
    InvalidEnvironmentValue {
        /// The variable that was read.
        variable: String,
        /// The raw value.
        value: String,
        /// Why the value could not be parsed.
        #[source]
        source: serde_json::Error,
    },
}

/// A source of environment variables.
pub trait EnvSource {
    /// Read a variable, if it is set.
    fn var(&self, key: &str) -> Option<String>;
}

/// The environment of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// The generation defaults of a model family and the environment prefix used to override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    name: String,
    env_prefix: String,
    defaults: GenerationConfig,
}

impl ModelConfig {
    /// Create a config for a model family. The environment prefix is the upper-cased name.
    pub fn new(name: impl Into<String>, defaults: GenerationConfig) -> Self {
        let name = name.into();
        let env_prefix = name.to_uppercase().replace(&['-', ' ', '.'][..], "_");
        Self {
            name,
            env_prefix,
            defaults,
        }
    }

    /// Set the prefix of the environment variables that override the defaults.
    pub fn with_env_prefix(mut self, env_prefix: impl Into<String>) -> Self {
        self.env_prefix = env_prefix.into();
        self
    }

    /// The name of the model family.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The prefix of the environment variables that override the defaults.
    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }

    /// The defaults before the environment and overrides are applied.
    pub fn defaults(&self) -> &GenerationConfig {
        &self.defaults
    }

    /// The environment variable that overrides a generation setting, e.g. `LLAMA_GENERATION_TOP_K`.
    pub fn env_var(&self, field: &str) -> String {
        format!("{}_GENERATION_{}", self.env_prefix, field.to_uppercase())
    }

    fn read_env<T: DeserializeOwned>(
        &self,
        env: &dyn EnvSource,
        field: &str,
    ) -> Result<Option<T>, ConfigError> {
        let variable = self.env_var(field);
        let Some(value) = env.var(&variable) else {
            return Ok(None);
        };
        match serde_json::from_str(&value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(source) => Err(ConfigError::InvalidEnvironmentValue {
                variable,
                value,
                source,
            }),
        }
    }

    /// Build the settings for one request: the model defaults, then any environment
    /// variables, then every override that is set.
    pub fn model_construct_env(
        &self,
        overrides: &GenerationOverrides,
        env: &dyn EnvSource,
    ) -> Result<GenerationConfig, ConfigError> {
        let mut config = self.defaults.clone();

        if let Some(max_new_tokens) = self.read_env(env, "max_new_tokens")? {
            config.max_new_tokens = max_new_tokens;
        }
        if let Some(temperature) = self.read_env(env, "temperature")? {
            config.temperature = temperature;
        }
        if let Some(top_p) = self.read_env(env, "top_p")? {
            config.top_p = top_p;
        }
        if let Some(top_k) = self.read_env(env, "top_k")? {
            config.top_k = top_k;
        }
        if let Some(seed) = self.read_env(env, "seed")? {
            config.seed = seed;
        }
        if let Some(eos_token_id) = self.read_env::<u32>(env, "eos_token_id")? {
            config.eos_token_id = Some(eos_token_id);
        }

        config.apply(overrides);
        tracing::debug!(model = %self.name, ?config, "resolved generation config");

        Ok(config)
    }
}
