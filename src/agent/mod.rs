//! Model querying: prompt construction, providers and concurrent fan-out.

pub mod fanout;
pub mod prompt;
pub mod provider;

pub use fanout::{parse_prediction, ModelFanout};
pub use prompt::{build_prompt, PromptOptions};
pub use provider::{ModelProvider, OpenAiProvider, ProviderConfig};
