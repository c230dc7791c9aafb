// Swap settlement: the orchestrator, the loop that drives it, and the
// status it publishes.
pub mod orchestrator;
pub mod scheduler;
pub mod status;

pub use orchestrator::{simulate_deposit, Orchestrator};
pub use scheduler::{SwapScheduleConfig, SwapScheduler};
pub use status::StatusSnapshot;
