pub mod local;
pub mod neo;

pub use local::{LocalAdapterConfig, LocalChainAdapter};
pub use neo::{NeoAdapter, NeoAdapterConfig};
