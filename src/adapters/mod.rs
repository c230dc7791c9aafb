pub mod chains;
pub mod confirmation;
pub mod context;
pub mod paging;
pub mod registry;
pub mod token_registry;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use context::SwapContext;
pub use registry::AdapterRegistry;
pub use token_registry::TokenRegistry;
pub use traits::{CandidateSwap, ChainAdapter, TransferRequest};
