pub mod role_playing;
pub mod state;

pub use role_playing::{RolePlaying, RolePlayingOptions, SessionOutcome, TurnRecord, TurnResult};
pub use state::{SessionState, SessionStatus};
