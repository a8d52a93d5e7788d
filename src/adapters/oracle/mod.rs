//! Reasoning oracle adapters.

pub mod anthropic;

pub use anthropic::AnthropicOracle;
