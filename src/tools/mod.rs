pub mod executor;
pub mod registry;
pub mod role_playing;

pub use executor::{FunctionCallRecord, ToolExecutor};
pub use registry::{Function, FunctionRegistry};
pub use role_playing::{RolePlayingFunction, ROLE_PLAYING_FUNCTION};
