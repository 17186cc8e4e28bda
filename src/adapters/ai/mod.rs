//! Chat inference adapters implementing `ChatPort`.

pub mod mock_adapter;
pub mod ollama_adapter;

pub use mock_adapter::MockChatAdapter;
pub use ollama_adapter::OllamaAdapter;
