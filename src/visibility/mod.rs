pub mod controller;
pub mod scheduler;
pub mod state;

pub use controller::{TickOutcome, VisibilityController};
pub use scheduler::FrameScheduler;
pub use state::{PopupFlags, PopupInput, PopupPhase};
