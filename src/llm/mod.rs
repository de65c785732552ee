//! LLM client abstraction layer
//!
//! Plan generation and specification synthesis talk to models through the
//! [`LLMClient`] trait so real providers and scripted mocks are
//! interchangeable.

mod client;
mod error;
mod genai;
mod mock;
mod types;

pub use client::LLMClient;
pub use error::BackendError;
pub use genai::GenAIClient;
pub use mock::{MockLLMClient, MockResponse};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
