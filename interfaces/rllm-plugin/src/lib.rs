//! # RLLM Plugin
//!
//! This crate defines the contract between a serving host and a causal language model adapter.
//!
//! A plugin is generic over two capabilities:
//! - a [`CausalLanguageModel`] that can run a forward pass (optionally returning hidden states) and decode new tokens
//! - a [`TextTokenizer`] that can encode text into token ids and decode ids back into text
//!
//! Any model/tokenizer pair that implements those traits can be plugged into a [`LanguageModelPlugin`].
//!
//! The crate also ships the collaborators a plugin leans on: a `{name}` prompt formatter,
//! stopping rules, and generation configuration merged from model defaults, the environment and
//! per-request overrides.

#![warn(missing_docs)]

mod error;
pub use error::*;
mod generation;
pub use generation::*;
mod model;
pub use model::*;
mod plugin;
pub use plugin::*;
mod prompt;
pub use prompt::*;
mod stopping;
pub use stopping::*;
mod tokenizer;
pub use tokenizer::*;

pub use rllm_common::*;
