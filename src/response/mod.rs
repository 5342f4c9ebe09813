pub mod context;
pub mod controller;
pub mod history;
pub mod normalize;
pub mod rate_limit;
pub mod server_limit;
pub mod state;

pub use context::ContextSnapshot;
pub use controller::{ResponseController, SubmitOutcome};
pub use history::{ConversationHistory, HistoryEntry, Role};
pub use rate_limit::RateLimitWindow;
pub use server_limit::{ServerLimit, ServerLimitState};
pub use state::{ResponseSnapshot, ResponseStatus};
