use super::models::*;
use crate::error::{AppError, AppResult};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Swap ledger - THE source of truth for swap state
///
/// Every state transition is appended to the log as one JSON line. The
/// in-memory index is derived from the log and can always be rebuilt with
/// [`SwapLedger::reload`].
pub struct SwapLedger {
    path: PathBuf,
    log: File,
    index: HashMap<TxHash, SwapRecord>,
}

/// Number of records per status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub counts: HashMap<SwapStatus, usize>,
    pub total: usize,
}

impl SwapLedger {
    /// Open (or create) the log at `path` and replay it
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let log = OpenOptions::new().create(true).append(true).open(&path)?;
        truncate_torn_tail(&path)?;

        let mut ledger = Self {
            path,
            log,
            index: HashMap::new(),
        };
        ledger.reload()?;
        Ok(ledger)
    }

    /// Discard the index and rebuild it from the log
    pub fn reload(&mut self) -> AppResult<()> {
        self.index = Self::replay(&self.path)?;
        Ok(())
    }

    fn replay(path: &Path) -> AppResult<HashMap<TxHash, SwapRecord>> {
        let mut index: HashMap<TxHash, SwapRecord> = HashMap::new();
        let reader = BufReader::new(File::open(path)?);

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: SwapRecord = serde_json::from_str(&line).map_err(|e| {
                AppError::InvariantViolation(format!(
                    "malformed swap log line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                ))
            })?;

            check_transition(index.get(&record.source_hash), &record)?;
            index.insert(record.source_hash.clone(), record);
        }

        Ok(index)
    }

    pub fn contains(&self, source_hash: &TxHash) -> bool {
        self.index.contains_key(source_hash)
    }

    pub fn get(&self, source_hash: &TxHash) -> Option<&SwapRecord> {
        self.index.get(source_hash)
    }

    /// Durably append a new version of a swap record
    ///
    /// The line is written and synced before the index changes, so a record
    /// is only visible once it would survive a crash.
    pub fn append(&mut self, record: SwapRecord) -> AppResult<()> {
        check_transition(self.index.get(&record.source_hash), &record)?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.log.write_all(line.as_bytes())?;
        self.log.flush()?;
        self.log.sync_data()?;

        debug!(
            source_hash = %record.source_hash,
            status = %record.status,
            "swap record appended"
        );

        self.index.insert(record.source_hash.clone(), record);
        Ok(())
    }

    /// All current records, ordered by source chain then height
    pub fn all(&self) -> Vec<SwapRecord> {
        let mut records: Vec<SwapRecord> = self.index.values().cloned().collect();
        records.sort_by(|a, b| {
            (a.source_chain.as_str(), a.height, a.source_hash.as_str())
                .cmp(&(b.source_chain.as_str(), b.height, b.source_hash.as_str()))
        });
        records
    }

    /// Non-terminal records that originated on `source_chain`
    pub fn in_flight(&self, source_chain: &str) -> Vec<SwapRecord> {
        self.all()
            .into_iter()
            .filter(|r| r.source_chain == source_chain && !r.is_terminal())
            .collect()
    }

    pub fn failed(&self) -> Vec<SwapRecord> {
        self.all()
            .into_iter()
            .filter(|r| r.status == SwapStatus::Failed)
            .collect()
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats::default();
        for record in self.index.values() {
            *stats.counts.entry(record.status).or_insert(0) += 1;
            stats.total += 1;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Drop bytes after the last newline.
///
/// Appends always end in `\n`, so anything after it is a write that was cut
/// short by a crash and never became visible.
pub(crate) fn truncate_torn_tail(path: &Path) -> AppResult<()> {
    let bytes = std::fs::read(path)?;
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);

    if keep < bytes.len() {
        warn!(
            "⚠️ Discarding {} bytes of incomplete trailing entry in {}",
            bytes.len() - keep,
            path.display()
        );
        OpenOptions::new().write(true).open(path)?.set_len(keep as u64)?;
    }

    Ok(())
}

fn check_transition(existing: Option<&SwapRecord>, next: &SwapRecord) -> AppResult<()> {
    let Some(current) = existing else {
        return Ok(());
    };

    if current.source_chain != next.source_chain {
        return Err(AppError::InvariantViolation(format!(
            "source hash {} seen on both {} and {}",
            next.source_hash, current.source_chain, next.source_chain
        )));
    }

    if current.is_terminal() {
        return Err(AppError::InvariantViolation(format!(
            "swap {} is already {} and cannot be rewritten as {}",
            next.source_hash, current.status, next.status
        )));
    }

    if !current.status.can_transition_to(next.status) {
        return Err(AppError::InvariantViolation(format!(
            "swap {} cannot move from {} back to {}",
            next.source_hash, current.status, next.status
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn pending(hash: &str, height: u64) -> SwapRecord {
        SwapRecord {
            source_hash: TxHash::new(hash),
            source_chain: "neo".to_string(),
            source_address: "AKsource".to_string(),
            send_hash: None,
            receive_hash: None,
            destination_chain: "phantasma".to_string(),
            destination_address: "Pdestination".to_string(),
            symbol: "SOUL".to_string(),
            amount: dec!(100),
            status: SwapStatus::Pending,
            height,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = SwapLedger::open(dir.path().join("swaps.log")).unwrap();

        let record = pending("h1", 10);
        ledger.append(record.clone()).unwrap();

        assert!(ledger.contains(&TxHash::new("H1")));
        assert_eq!(ledger.get(&TxHash::new("h1")).unwrap().status, SwapStatus::Pending);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_replay_latest_line_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swaps.log");

        {
            let mut ledger = SwapLedger::open(&path).unwrap();
            let record = pending("h1", 10);
            ledger.append(record.clone()).unwrap();
            let sent = record.with_send_hash(TxHash::new("s1"));
            ledger.append(sent.clone()).unwrap();
            ledger.append(sent.with_receive_hash(TxHash::new("r1"))).unwrap();
        }

        let ledger = SwapLedger::open(&path).unwrap();
        let record = ledger.get(&TxHash::new("h1")).unwrap();
        assert_eq!(record.status, SwapStatus::Received);
        assert_eq!(record.send_hash, Some(TxHash::new("s1")));
        assert_eq!(record.receive_hash, Some(TxHash::new("r1")));
    }

    #[test]
    fn test_replay_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = SwapLedger::open(dir.path().join("swaps.log")).unwrap();

        for (i, hash) in ["a1", "b2", "c3"].iter().enumerate() {
            let record = pending(hash, i as u64);
            ledger.append(record.clone()).unwrap();
            ledger.append(record.advanced(SwapStatus::Settled)).unwrap();
        }

        ledger.reload().unwrap();
        let first = ledger.all();
        ledger.reload().unwrap();
        let second = ledger.all();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_terminal_record_is_never_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = SwapLedger::open(dir.path().join("swaps.log")).unwrap();

        let record = pending("h1", 10);
        ledger.append(record.clone()).unwrap();
        ledger.append(record.advanced(SwapStatus::Settled)).unwrap();

        let err = ledger.append(record.failed("late")).unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
        assert_eq!(ledger.get(&TxHash::new("h1")).unwrap().status, SwapStatus::Settled);
    }

    #[test]
    fn test_status_regression_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = SwapLedger::open(dir.path().join("swaps.log")).unwrap();

        let record = pending("h1", 10);
        ledger.append(record.with_receive_hash(TxHash::new("r1"))).unwrap();

        let err = ledger.append(record.with_send_hash(TxHash::new("s1"))).unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
    }

    #[test]
    fn test_cross_chain_hash_collision_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = SwapLedger::open(dir.path().join("swaps.log")).unwrap();

        let record = pending("h1", 10);
        ledger.append(record.clone()).unwrap();

        let mut other = record.clone();
        other.source_chain = "ethereum".to_string();
        assert!(matches!(
            ledger.append(other).unwrap_err(),
            AppError::InvariantViolation(_)
        ));
    }

    #[test]
    fn test_torn_trailing_line_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swaps.log");

        {
            let mut ledger = SwapLedger::open(&path).unwrap();
            ledger.append(pending("h1", 10)).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"sourceHash\":\"h2\",\"sourceCh").unwrap();
        }

        let mut ledger = SwapLedger::open(&path).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.contains(&TxHash::new("h2")));

        // The next append starts on a clean line
        ledger.append(pending("h3", 11)).unwrap();
        drop(ledger);
        let ledger = SwapLedger::open(&path).unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_malformed_middle_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swaps.log");
        let good = serde_json::to_string(&pending("h1", 10)).unwrap();
        std::fs::write(&path, format!("garbage\n{}\n", good)).unwrap();

        assert!(matches!(
            SwapLedger::open(&path),
            Err(AppError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_in_flight_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = SwapLedger::open(dir.path().join("swaps.log")).unwrap();

        let a = pending("a", 1);
        let b = pending("b", 2);
        ledger.append(a.clone()).unwrap();
        ledger.append(b.clone()).unwrap();
        ledger.append(b.failed("unknown token")).unwrap();

        let in_flight = ledger.in_flight("neo");
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].source_hash, TxHash::new("a"));
        assert!(ledger.in_flight("phantasma").is_empty());

        let stats = ledger.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.counts.get(&SwapStatus::Failed), Some(&1));
        assert_eq!(ledger.failed().len(), 1);
    }
}
