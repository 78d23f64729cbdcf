pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod prompts;
pub mod session;
pub mod tools;
pub mod types;

pub use agent::{AgentResponse, AgentRole, ChatAgent, ModelBackend, OllamaClient};
pub use cli::run_cli;
pub use config::{AgentConfig, BridgeConfig, Config, SessionConfig};
pub use error::{ModelError, RolePlayError};
pub use session::{RolePlaying, RolePlayingOptions, SessionOutcome, SessionStatus, TurnRecord};
pub use tools::{FunctionRegistry, RolePlayingFunction};
pub use types::{Message, Role};
