// RPC clients for the chains the relayer talks to.
// Wire formats are owned by the nodes; these only shape requests and results.
pub mod jsonrpc;
pub mod local;
pub mod neo;

pub use local::{LocalChainApi, NexusRpcClient, PlatformInfo};
pub use neo::{NeoNodeApi, NeoRpcClient, NeoScanApi, NeoScanClient};
