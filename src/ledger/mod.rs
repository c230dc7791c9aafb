pub mod checkpoint;
pub mod models;
pub mod repository;

pub use checkpoint::CheckpointStore;
pub use repository::SwapLedger;
