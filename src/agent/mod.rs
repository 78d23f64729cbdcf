pub mod core;
pub mod llm;
pub mod memory;
pub mod mock;
pub mod task_specify;

pub use self::core::{AgentResponse, AgentRole, ChatAgent, PendingResponse};
pub use llm::{Completion, ModelBackend, OllamaClient};
pub use memory::{ChatMemory, MemoryRecord};
pub use mock::ScriptedBackend;
pub use task_specify::TaskSpecifier;
