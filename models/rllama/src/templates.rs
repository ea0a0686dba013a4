use std::borrow::Cow;

use rllm_plugin::{PromptTemplateResolver, TemplateVersion};

/// The system message baked into the default Llama 2 chat template.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful, respectful and honest assistant. Always answer as helpfully as possible, while being safe. Your answers should not include any harmful, unethical, racist, sexist, toxic, dangerous, or illegal content. Please ensure that your responses are socially unbiased and positive in nature.\n\nIf a question does not make any sense, or is not factually coherent, explain why instead of answering something not correct. If you don't know the answer to a question, please don't share false information.";

/// The default prompt templates for Llama models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlamaPromptTemplates {
    v1: String,
    v2: String,
}

impl Default for LlamaPromptTemplates {
    fn default() -> Self {
        Self {
            v1: "{instruction}".to_string(),
            v2: format!("[INST] <<SYS>>\n{DEFAULT_SYSTEM_MESSAGE}\n<</SYS>>\n\n{{instruction}} [/INST] "),
        }
    }
}

impl LlamaPromptTemplates {
    /// Replace the plain template.
    pub fn with_v1(mut self, template: impl Into<String>) -> Self {
        self.v1 = template.into();
        self
    }

    /// Replace the chat template.
    pub fn with_v2(mut self, template: impl Into<String>) -> Self {
        self.v2 = template.into();
        self
    }
}

impl PromptTemplateResolver for LlamaPromptTemplates {
    fn resolve(&self, version: TemplateVersion) -> Cow<'_, str> {
        match version {
            TemplateVersion::V1 => Cow::Borrowed(&self.v1),
            TemplateVersion::V2 => Cow::Borrowed(&self.v2),
        }
    }
}
