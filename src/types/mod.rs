mod function;
mod message;
mod ollama;

pub use function::{FunctionCall, FunctionDefinition, Tool, ToolCall};
pub use message::{Message, Role, PRODUCER_KEY};
pub use ollama::{ChatMessage, OllamaOptions, OllamaRequest, OllamaResponse};
