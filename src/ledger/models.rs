use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain name of the chain the bridge is anchored to, unless configured otherwise
pub const DEFAULT_LOCAL_CHAIN: &str = "phantasma";
pub const NEO_CHAIN: &str = "neo";
pub const ETHEREUM_CHAIN: &str = "ethereum";

/// Chain transaction identifier
///
/// A `0x` prefix and surrounding whitespace are dropped. Hex hashes are
/// case-folded so the same transaction dedups to one key however a chain
/// prints it; anything else (base58 ids, for instance) keeps its case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if stripped.bytes().all(|b| b.is_ascii_hexdigit()) {
            Self(stripped.to_ascii_lowercase())
        } else {
            Self(stripped.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for TxHash {
    fn from(value: String) -> Self {
        TxHash::new(value)
    }
}

impl From<&str> for TxHash {
    fn from(value: &str) -> Self {
        TxHash::new(value)
    }
}

impl From<TxHash> for String {
    fn from(value: TxHash) -> Self {
        value.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Swap lifecycle. `Settled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Sent,
    Received,
    Settled,
    Failed,
}

impl SwapStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapStatus::Settled | SwapStatus::Failed)
    }

    /// Position along the happy path, used to reject regressions
    fn rank(&self) -> u8 {
        match self {
            SwapStatus::Pending => 0,
            SwapStatus::Sent => 1,
            SwapStatus::Received => 2,
            SwapStatus::Settled | SwapStatus::Failed => 3,
        }
    }

    /// Whether a record in `self` may be rewritten as `next`
    pub fn can_transition_to(&self, next: SwapStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == SwapStatus::Failed || next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Sent => "sent",
            SwapStatus::Received => "received",
            SwapStatus::Settled => "settled",
            SwapStatus::Failed => "failed",
        }
    }

    pub fn all() -> [SwapStatus; 5] {
        [
            SwapStatus::Pending,
            SwapStatus::Sent,
            SwapStatus::Received,
            SwapStatus::Settled,
            SwapStatus::Failed,
        ]
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Swap entity - one observed deposit and the legs executed to settle it
///
/// INVARIANT: `source_hash` is unique across all chains; terminal records are
/// never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub source_hash: TxHash,
    pub source_chain: String,
    pub source_address: String,
    pub send_hash: Option<TxHash>,
    pub receive_hash: Option<TxHash>,
    pub destination_chain: String,
    pub destination_address: String,
    pub symbol: String,
    pub amount: Decimal,
    pub status: SwapStatus,
    /// Source-chain height the deposit was observed at
    pub height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Copy of this record moved to `status`, stamped with the current time
    pub fn advanced(&self, status: SwapStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_send_hash(&self, hash: TxHash) -> Self {
        Self {
            send_hash: Some(hash),
            ..self.advanced(SwapStatus::Sent)
        }
    }

    pub fn with_receive_hash(&self, hash: TxHash) -> Self {
        Self {
            receive_hash: Some(hash),
            ..self.advanced(SwapStatus::Received)
        }
    }

    pub fn failed(&self, reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..self.advanced(SwapStatus::Failed)
        }
    }
}

/// Per-chain watermark: every deposit at or below `height` reached a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub chain_name: String,
    pub height: u64,
}
