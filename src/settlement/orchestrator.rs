use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{AdapterRegistry, CandidateSwap, ChainAdapter, SwapContext, TransferRequest};
use crate::error::{AppError, AppResult, ErrorClass};
use crate::ledger::models::{SwapRecord, SwapStatus, TxHash};
use crate::ledger::{CheckpointStore, SwapLedger};
use crate::settlement::status::{RejectedDeposit, StatusSnapshot, TickReport};

/// Default for how long a broadcast release may stay unconfirmed
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Whether a swap still holds back its chain's checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Terminal,
    Blocked,
}

/// Unit of work for one chain in one tick
enum Work {
    /// Newly polled deposit
    Observed(CandidateSwap),
    /// In-flight ledger record to resume from its last completed leg
    Resume(SwapRecord),
}

impl Work {
    fn height(&self) -> u64 {
        match self {
            Work::Observed(candidate) => candidate.height,
            Work::Resume(record) => record.height,
        }
    }

    fn hash(&self) -> &TxHash {
        match self {
            Work::Observed(candidate) => &candidate.source_hash,
            Work::Resume(record) => &record.source_hash,
        }
    }
}

/// Swap orchestrator - the reconciliation loop
///
/// Sole writer of the swap ledger and the checkpoint store. Each tick
/// polls every adapter, settles what it can, and moves each chain's
/// checkpoint over the prefix of deposits that reached a terminal state.
///
/// INVARIANTS:
/// - Every completed leg is in the ledger before the next leg starts
/// - A checkpoint never passes a non-terminal swap
/// - A release unconfirmed past `release_timeout` ends Failed, never silently pending
pub struct Orchestrator {
    adapters: Arc<AdapterRegistry>,
    ctx: Arc<SwapContext>,
    ledger: SwapLedger,
    checkpoints: CheckpointStore,
    shutdown: watch::Receiver<bool>,
    status: watch::Sender<StatusSnapshot>,
    release_timeout: Duration,
    /// Deposits dropped for reusing a hash recorded from another chain
    rejected: Vec<RejectedDeposit>,
}

impl Orchestrator {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        ctx: Arc<SwapContext>,
        ledger: SwapLedger,
        checkpoints: CheckpointStore,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let snapshot = StatusSnapshot::capture(adapters.chains(), &ledger, &checkpoints, &[], None);
        let (status, _) = watch::channel(snapshot);

        info!(
            "✅ Orchestrator ready: {} adapters, {} swaps in ledger",
            adapters.len(),
            ledger.len()
        );

        Self {
            adapters,
            ctx,
            ledger,
            checkpoints,
            shutdown,
            status,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
            rejected: Vec::new(),
        }
    }

    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Snapshots published after each tick
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn adapters(&self) -> Arc<AdapterRegistry> {
        self.adapters.clone()
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &SwapLedger {
        &self.ledger
    }

    #[cfg(test)]
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// One reconciliation pass over every registered chain, in name order
    pub async fn tick(&mut self) -> AppResult<TickReport> {
        let mut report = TickReport::default();

        for adapter in self.adapters.adapters() {
            if self.stopping() {
                report.interrupted = true;
                break;
            }
            self.process_chain(adapter.as_ref(), &mut report).await?;
        }

        if !report.interrupted {
            self.resume_unpolled(&mut report).await?;
        }

        self.publish();
        Ok(report)
    }

    /// Drive in-flight swaps whose source chain has no adapter this run
    ///
    /// Nobody polls those chains, so their checkpoints stay where they are.
    async fn resume_unpolled(&mut self, report: &mut TickReport) -> AppResult<()> {
        let orphaned: Vec<SwapRecord> = self
            .ledger
            .all()
            .into_iter()
            .filter(|r| !r.is_terminal() && !self.adapters.supports_chain(&r.source_chain))
            .collect();

        for record in orphaned {
            if self.stopping() {
                report.interrupted = true;
                break;
            }
            debug!("Resuming {} from unpolled chain {}", record.source_hash, record.source_chain);
            if self.resume(record, report).await? == Outcome::Blocked {
                report.pending += 1;
            }
        }
        Ok(())
    }

    async fn process_chain(&mut self, adapter: &dyn ChainAdapter, report: &mut TickReport) -> AppResult<()> {
        let chain = adapter.name().to_string();
        let checkpoint = self.checkpoints.get(&chain);

        let polled = match adapter.poll(checkpoint).await {
            Ok(candidates) => Some(candidates),
            Err(e) if e.class() == ErrorClass::Fatal => return Err(e),
            Err(e) => {
                warn!("⚠️  Poll of {} failed, resuming in-flight swaps only: {}", chain, e);
                report.poll_failures += 1;
                None
            }
        };
        let poll_succeeded = polled.is_some();

        let work = self.collect_work(&chain, checkpoint, polled.unwrap_or_default());
        if !work.is_empty() {
            debug!("{}: {} swaps to process above {}", chain, work.len(), checkpoint);
        }

        // Lowest height still non-terminal, and every height that finished
        let mut blocked_at: Option<u64> = None;
        let mut terminal_heights: Vec<u64> = Vec::new();

        for item in work {
            let height = item.height();

            if self.stopping() {
                report.interrupted = true;
                blocked_at.get_or_insert(height);
                break;
            }

            let outcome = match item {
                Work::Observed(candidate) => self.admit(candidate, report).await?,
                Work::Resume(record) => self.resume(record, report).await?,
            };

            match outcome {
                Outcome::Terminal => terminal_heights.push(height),
                Outcome::Blocked => {
                    report.pending += 1;
                    blocked_at.get_or_insert(height);
                }
            }
        }

        // Without a successful poll the picture of this chain is incomplete
        if !poll_succeeded {
            return Ok(());
        }

        // a swap blocked at height B holds back everything at B, even finished ones
        let watermark = terminal_heights
            .into_iter()
            .filter(|height| blocked_at.map_or(true, |blocked| *height < blocked))
            .max();

        if let Some(height) = watermark {
            if height > checkpoint {
                self.checkpoints.advance(&chain, height)?;
            }
        }

        Ok(())
    }

    /// Merge polled candidates with in-flight ledger records, ascending by height
    fn collect_work(&self, chain: &str, checkpoint: u64, polled: Vec<CandidateSwap>) -> Vec<Work> {
        let mut by_hash: HashMap<TxHash, Work> = HashMap::new();

        for record in self.ledger.in_flight(chain) {
            by_hash.insert(record.source_hash.clone(), Work::Resume(record));
        }

        for candidate in polled {
            if candidate.height <= checkpoint {
                continue;
            }
            // the ledger copy wins, and repeats within one poll collapse
            by_hash
                .entry(candidate.source_hash.clone())
                .or_insert(Work::Observed(candidate));
        }

        let mut work: Vec<Work> = by_hash.into_values().collect();
        work.sort_by(|a, b| (a.height(), a.hash()).cmp(&(b.height(), b.hash())));
        work
    }

    /// First sighting of a deposit: dedup, route, record, then settle
    #[instrument(skip(self, candidate, report), fields(source_hash = %candidate.source_hash, source_chain = %candidate.source_chain))]
    async fn admit(&mut self, candidate: CandidateSwap, report: &mut TickReport) -> AppResult<Outcome> {
        if self.ledger.contains(&candidate.source_hash) {
            return self.revisit(candidate, report).await;
        }

        let Some(destination) = self.adapters.get(&candidate.destination_chain) else {
            let address = candidate.destination_address.clone().unwrap_or_default();
            let record = new_record(candidate, address);
            let reason = format!("no adapter for destination chain {}", record.destination_chain);
            self.fail(record, reason, report)?;
            return Ok(Outcome::Terminal);
        };

        let address = match candidate.destination_address.clone() {
            Some(address) => address,
            None => {
                let resolved = self
                    .ctx
                    .resolve_destination(
                        &candidate.source_address,
                        &candidate.source_chain,
                        &candidate.destination_chain,
                    )
                    .await;
                match resolved {
                    Ok(address) => address,
                    Err(e) => {
                        return match e.class() {
                            // not recorded: the deposit is picked up again next tick
                            ErrorClass::Transient => {
                                warn!("⚠️  Destination address not resolvable yet: {}", e);
                                Ok(Outcome::Blocked)
                            }
                            ErrorClass::Permanent => {
                                self.fail(new_record(candidate, String::new()), e.to_string(), report)?;
                                Ok(Outcome::Terminal)
                            }
                            ErrorClass::Fatal => Err(e),
                        };
                    }
                }
            }
        };

        let record = new_record(candidate, address);
        self.ledger.append(record.clone())?;
        info!(
            "📒 Recorded swap {} {} {} -> {} ({})",
            record.amount, record.symbol, record.source_chain, record.destination_chain, record.destination_address
        );

        self.drive_swap(record, destination.as_ref(), report).await
    }

    /// A deposit whose hash is already recorded: collision, duplicate or resume
    async fn revisit(&mut self, candidate: CandidateSwap, report: &mut TickReport) -> AppResult<Outcome> {
        let existing = self.ledger.get(&candidate.source_hash).cloned().ok_or_else(|| {
            AppError::InvariantViolation(format!("{} missing from the ledger index", candidate.source_hash))
        })?;

        if existing.source_chain != candidate.source_chain {
            let reason = format!(
                "hash {} already recorded from {}",
                candidate.source_hash, existing.source_chain
            );
            raise_alert(&candidate.source_hash, &candidate.source_chain, &candidate.destination_chain, &reason);
            self.rejected.push(RejectedDeposit {
                deposit: candidate,
                reason,
                rejected_at: Utc::now(),
            });
            report.discarded += 1;
            return Ok(Outcome::Terminal);
        }
        if existing.is_terminal() {
            debug!("Already {} in ledger, discarding", existing.status);
            report.discarded += 1;
            return Ok(Outcome::Terminal);
        }
        self.resume(existing, report).await
    }

    /// Pick an in-flight record back up after its last completed leg
    async fn resume(&mut self, record: SwapRecord, report: &mut TickReport) -> AppResult<Outcome> {
        match self.adapters.get(&record.destination_chain) {
            Some(destination) => self.drive_swap(record, destination.as_ref(), report).await,
            None => {
                let reason = format!("no adapter for destination chain {}", record.destination_chain);
                self.fail(record, reason, report)?;
                Ok(Outcome::Terminal)
            }
        }
    }

    /// Run the remaining legs of a swap, persisting each one
    #[instrument(skip(self, record, destination, report), fields(source_hash = %record.source_hash, destination = %record.destination_chain))]
    async fn drive_swap(
        &mut self,
        mut record: SwapRecord,
        destination: &dyn ChainAdapter,
        report: &mut TickReport,
    ) -> AppResult<Outcome> {
        loop {
            if record.is_terminal() {
                return Ok(Outcome::Terminal);
            }

            let next = match next_leg(&record, destination).await {
                Ok(Some(next)) => next,
                Ok(None) if self.release_expired(&record) => {
                    let reason = format!(
                        "release {} unconfirmed after {}s",
                        record.receive_hash.as_ref().map(TxHash::as_str).unwrap_or_default(),
                        self.release_timeout.as_secs()
                    );
                    self.fail(record, reason, report)?;
                    return Ok(Outcome::Terminal);
                }
                Ok(None) => {
                    debug!("Receive {:?} not confirmed yet", record.receive_hash);
                    return Ok(Outcome::Blocked);
                }
                Err(e) => return self.handle_leg_error(record, e, report),
            };

            self.ledger.append(next.clone())?;
            debug!("Swap moved to {}", next.status);

            if next.status == SwapStatus::Settled {
                info!(
                    "✅ Swap {} settled: {} {} to {} on {}",
                    next.source_hash, next.amount, next.symbol, next.destination_address, next.destination_chain
                );
                report.settled += 1;
            }
            record = next;
        }
    }

    fn handle_leg_error(&mut self, record: SwapRecord, error: AppError, report: &mut TickReport) -> AppResult<Outcome> {
        match error.class() {
            ErrorClass::Transient => {
                warn!(
                    "⚠️  Swap {} stays {} after transient failure: {}",
                    record.source_hash, record.status, error
                );
                Ok(Outcome::Blocked)
            }
            ErrorClass::Permanent => {
                self.fail(record, error.to_string(), report)?;
                Ok(Outcome::Terminal)
            }
            ErrorClass::Fatal => Err(error),
        }
    }

    /// Received since longer than the release timeout
    fn release_expired(&self, record: &SwapRecord) -> bool {
        record.status == SwapStatus::Received
            && (Utc::now() - record.updated_at)
                .to_std()
                .map_or(false, |elapsed| elapsed >= self.release_timeout)
    }

    /// Record a swap as failed and raise an operator alert
    fn fail(&mut self, record: SwapRecord, reason: String, report: &mut TickReport) -> AppResult<()> {
        let failed = record.failed(reason.clone());
        self.ledger.append(failed)?;
        report.failed += 1;

        raise_alert(&record.source_hash, &record.source_chain, &record.destination_chain, &reason);
        Ok(())
    }

    fn publish(&self) {
        let snapshot = StatusSnapshot::capture(
            self.adapters.chains(),
            &self.ledger,
            &self.checkpoints,
            &self.rejected,
            Some(Utc::now()),
        );
        self.status.send_replace(snapshot);
    }
}

fn raise_alert(source_hash: &TxHash, source_chain: &str, destination_chain: &str, reason: &str) {
    error!(
        alert = true,
        source_hash = %source_hash,
        source_chain = %source_chain,
        destination_chain = %destination_chain,
        "🚨 Swap needs operator attention: {}",
        reason
    );
}

/// Deposit funds through `source_chain`'s bridge address, for verification harnesses
pub async fn simulate_deposit(
    adapters: &AdapterRegistry,
    source_chain: &str,
    request: &TransferRequest,
) -> AppResult<TxHash> {
    let adapter = adapters
        .get(source_chain)
        .ok_or_else(|| AppError::Configuration(format!("no adapter registered for {}", source_chain)))?;

    let hash = adapter.send_funds(request).await?;
    info!(
        "📒 Simulated deposit {} of {} {} on {} towards {}",
        hash, request.amount, request.symbol, source_chain, request.destination_chain
    );
    Ok(hash)
}

/// Execute the next leg for `record` on its destination chain
///
/// `Ok(None)` means the release is broadcast but not confirmed yet.
async fn next_leg(record: &SwapRecord, destination: &dyn ChainAdapter) -> AppResult<Option<SwapRecord>> {
    match record.status {
        SwapStatus::Pending if destination.requires_notarization() => {
            let hash = destination
                .settle_transaction(&record.source_hash, &record.source_chain)
                .await?;
            Ok(Some(record.with_send_hash(hash)))
        }
        SwapStatus::Pending | SwapStatus::Sent => {
            let hash = destination.receive_funds(record).await?;
            Ok(Some(record.with_receive_hash(hash)))
        }
        SwapStatus::Received => {
            let hash = record.receive_hash.as_ref().ok_or_else(|| {
                AppError::settlement_permanent(
                    &record.destination_chain,
                    "received swap has no receive hash",
                )
            })?;
            let confirmed = destination.confirm_transaction(hash).await?;
            Ok(confirmed.then(|| record.advanced(SwapStatus::Settled)))
        }
        SwapStatus::Settled | SwapStatus::Failed => Ok(None),
    }
}

fn new_record(candidate: CandidateSwap, destination_address: String) -> SwapRecord {
    let now = Utc::now();
    SwapRecord {
        source_hash: candidate.source_hash,
        source_chain: candidate.source_chain,
        source_address: candidate.source_address,
        send_hash: None,
        receive_hash: None,
        destination_chain: candidate.destination_chain,
        destination_address,
        symbol: candidate.symbol,
        amount: candidate.amount,
        status: SwapStatus::Pending,
        height: candidate.height,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockAdapter, MockLocalChain};
    use crate::adapters::TokenRegistry;
    use rust_decimal_macros::dec;
    use std::path::Path;
    use tempfile::TempDir;

    const SOURCE: &str = "neo";
    const LOCAL: &str = "local";

    struct Harness {
        dir: TempDir,
        neo: Arc<MockAdapter>,
        local: Arc<MockAdapter>,
        chain: Arc<MockLocalChain>,
        shutdown: watch::Sender<bool>,
    }

    impl Harness {
        fn new(local: MockAdapter) -> Self {
            let chain = Arc::new(MockLocalChain::new());
            chain.map_address("Auser", LOCAL, "L-user");
            chain.map_address("L-sender", SOURCE, "A-receiver");
            let (shutdown, _) = watch::channel(false);

            Self {
                dir: tempfile::tempdir().unwrap(),
                neo: Arc::new(MockAdapter::new(SOURCE)),
                local: Arc::new(local),
                chain,
                shutdown,
            }
        }

        fn orchestrator(&self) -> Orchestrator {
            self.orchestrator_with_checkpoints(&self.dir.path().join("checkpoints.log"))
        }

        /// Fresh process over the same ledger
        fn orchestrator_with_checkpoints(&self, checkpoints: &Path) -> Orchestrator {
            let mut registry = AdapterRegistry::new();
            registry.register(self.neo.clone());
            registry.register(self.local.clone());

            let ctx = SwapContext::new(LOCAL, Arc::new(TokenRegistry::new()), Vec::new(), self.chain.clone());
            let ledger = SwapLedger::open(self.dir.path().join("swaps.log")).unwrap();
            let genesis = HashMap::from([(SOURCE.to_string(), 50), (LOCAL.to_string(), 0)]);
            let checkpoints = CheckpointStore::open(checkpoints, genesis).unwrap();

            Orchestrator::new(
                Arc::new(registry),
                Arc::new(ctx),
                ledger,
                checkpoints,
                self.shutdown.subscribe(),
            )
        }
    }

    fn deposit(hash: &str, height: u64, destination: &str) -> CandidateSwap {
        CandidateSwap {
            source_hash: TxHash::new(hash),
            source_chain: SOURCE.to_string(),
            source_address: "Auser".to_string(),
            destination_chain: destination.to_string(),
            destination_address: None,
            symbol: "X".to_string(),
            amount: dec!(100),
            height,
        }
    }

    fn status(orchestrator: &Orchestrator, hash: &str) -> Option<SwapStatus> {
        orchestrator.ledger().get(&TxHash::new(hash)).map(|r| r.status)
    }

    #[tokio::test]
    async fn test_deposit_settles() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        let mut orchestrator = h.orchestrator();

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.settled, 1);
        let record = orchestrator.ledger().get(&TxHash::new("H1")).unwrap();
        assert_eq!(record.status, SwapStatus::Settled);
        assert_eq!(record.destination_address, "L-user");
        assert_eq!(record.amount, dec!(100));
        assert!(record.receive_hash.is_some());
        assert_eq!(orchestrator.ledger().len(), 1);
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 100);
        assert_eq!(h.local.receive_count(), 1);
    }

    #[tokio::test]
    async fn test_repeated_candidate_settles_once() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        for _ in 0..3 {
            h.neo.deposit(deposit("H1", 100, LOCAL));
        }
        h.neo.deposit(deposit("0xh1", 100, LOCAL));
        let mut orchestrator = h.orchestrator();

        orchestrator.tick().await.unwrap();
        orchestrator.tick().await.unwrap();

        assert_eq!(orchestrator.ledger().len(), 1);
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Settled));
        assert_eq!(h.local.receive_count(), 1);
    }

    #[tokio::test]
    async fn test_rereported_deposit_leaves_ledger_unchanged() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        {
            let mut orchestrator = h.orchestrator();
            orchestrator.tick().await.unwrap();
        }
        let before = std::fs::read_to_string(h.dir.path().join("swaps.log")).unwrap();

        // lost checkpoints: the deposit is reported again
        let mut orchestrator = h.orchestrator_with_checkpoints(&h.dir.path().join("fresh.log"));
        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.discarded, 1);
        assert_eq!(h.local.receive_count(), 1);
        assert_eq!(std::fs::read_to_string(h.dir.path().join("swaps.log")).unwrap(), before);
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 100);
    }

    #[tokio::test]
    async fn test_unknown_destination_fails_and_advances() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H2", 120, "unknownchain"));
        let mut orchestrator = h.orchestrator();
        let snapshots = orchestrator.subscribe();

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.failed, 1);
        // operator-facing surface
        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.failed.len(), 1);
        assert_eq!(snapshot.failed[0].source_hash, TxHash::new("H2"));
        assert!(snapshot.failed[0].failure_reason.as_deref().unwrap().contains("unknownchain"));

        let record = orchestrator.ledger().get(&TxHash::new("H2")).unwrap();
        assert_eq!(record.status, SwapStatus::Failed);
        assert!(record.failure_reason.as_deref().unwrap().contains("unknownchain"));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 120);
        assert_eq!(h.local.receive_count(), 0);

        // never retried
        orchestrator.tick().await.unwrap();
        assert_eq!(orchestrator.ledger().failed().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_receive_failure_retries() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        h.local.fail_next_receive(false);
        let mut orchestrator = h.orchestrator();

        let report = orchestrator.tick().await.unwrap();
        assert_eq!(report.pending, 1);
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Pending));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 50);

        orchestrator.tick().await.unwrap();
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Settled));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 100);
        assert_eq!(h.local.receive_count(), 1);
    }

    #[tokio::test]
    async fn test_permanent_receive_failure() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        h.local.fail_next_receive(true);
        let mut orchestrator = h.orchestrator();

        orchestrator.tick().await.unwrap();

        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Failed));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 100);
    }

    #[tokio::test]
    async fn test_crash_after_notarization_resumes_at_receive() {
        let h = Harness::new(MockAdapter::new(LOCAL).with_notarization());
        h.neo.deposit(deposit("H1", 100, LOCAL));
        h.local.fail_next_receive(false);
        {
            let mut orchestrator = h.orchestrator();
            orchestrator.tick().await.unwrap();
            let record = orchestrator.ledger().get(&TxHash::new("H1")).unwrap();
            assert_eq!(record.status, SwapStatus::Sent);
            assert!(record.send_hash.is_some());
        }

        // restart
        let mut orchestrator = h.orchestrator();
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Sent));
        orchestrator.tick().await.unwrap();

        let record = orchestrator.ledger().get(&TxHash::new("H1")).unwrap();
        assert_eq!(record.status, SwapStatus::Settled);
        assert_eq!(record.send_hash, Some(TxHash::new("local-settle-1")));
        assert_eq!(h.local.settle_count(), 1);
        assert_eq!(h.local.receive_count(), 1);
        assert_eq!(h.local.settled.lock().unwrap()[0].1, SOURCE);
    }

    #[tokio::test]
    async fn test_unconfirmed_release_is_not_repeated() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        h.local.set_confirmed(false);
        let mut orchestrator = h.orchestrator();

        orchestrator.tick().await.unwrap();
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Received));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 50);

        h.local.set_confirmed(true);
        orchestrator.tick().await.unwrap();
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Settled));
        assert_eq!(h.local.receive_count(), 1);
        assert_eq!(h.local.confirm_count(), 2);
    }

    #[tokio::test]
    async fn test_unconfirmed_release_fails_after_timeout() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        h.local.set_confirmed(false);
        let mut orchestrator = h
            .orchestrator()
            .with_release_timeout(Duration::from_millis(200));
        let snapshots = orchestrator.subscribe();

        orchestrator.tick().await.unwrap();
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Received));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 50);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.failed, 1);
        let record = orchestrator.ledger().get(&TxHash::new("H1")).unwrap();
        assert_eq!(record.status, SwapStatus::Failed);
        assert!(record.failure_reason.as_deref().unwrap().contains("unconfirmed"));
        assert_eq!(h.local.receive_count(), 1);
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 100);
        assert_eq!(snapshots.borrow().failed[0].source_hash, TxHash::new("H1"));

        // terminal now, nothing more is asked of the chain
        let confirms = h.local.confirm_count();
        orchestrator.tick().await.unwrap();
        assert_eq!(h.local.confirm_count(), confirms);
    }

    #[tokio::test]
    async fn test_in_flight_swap_from_unregistered_chain_resumes() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        {
            let mut ledger = SwapLedger::open(h.dir.path().join("swaps.log")).unwrap();
            let mut candidate = deposit("E1", 900, LOCAL);
            candidate.source_chain = "ethereum".to_string();
            ledger.append(new_record(candidate, "L-user".to_string())).unwrap();
        }
        let mut orchestrator = h.orchestrator();

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.settled, 1);
        assert_eq!(status(&orchestrator, "E1"), Some(SwapStatus::Settled));
        assert_eq!(h.local.received.lock().unwrap()[0].source_chain, "ethereum");
        assert_eq!(orchestrator.checkpoints().get("ethereum"), 0);
    }

    #[tokio::test]
    async fn test_unresolved_address_blocks_checkpoint() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        let mut stranger = deposit("H1", 100, LOCAL);
        stranger.source_address = "Astranger".to_string();
        h.neo.deposit(stranger);
        h.neo.deposit(deposit("H2", 110, LOCAL));
        let mut orchestrator = h.orchestrator();

        orchestrator.tick().await.unwrap();

        assert!(!orchestrator.ledger().contains(&TxHash::new("H1")));
        assert_eq!(status(&orchestrator, "H2"), Some(SwapStatus::Settled));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 50);

        h.chain.map_address("Astranger", LOCAL, "L-stranger");
        orchestrator.tick().await.unwrap();

        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Settled));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 110);
        assert_eq!(h.local.receive_count(), 2);
    }

    #[tokio::test]
    async fn test_hash_collision_is_skipped() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.local.deposit(CandidateSwap {
            source_hash: TxHash::new("d0d0"),
            source_chain: LOCAL.to_string(),
            source_address: "L-sender".to_string(),
            destination_chain: SOURCE.to_string(),
            destination_address: None,
            symbol: "X".to_string(),
            amount: dec!(5),
            height: 7,
        });
        h.neo.deposit(deposit("0xD0D0", 100, LOCAL));
        let mut orchestrator = h.orchestrator();
        let snapshots = orchestrator.subscribe();

        let report = orchestrator.tick().await.unwrap();

        assert_eq!(report.discarded, 1);
        let rejected = snapshots.borrow().rejected.clone();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].deposit.source_chain, SOURCE);
        assert_eq!(rejected[0].deposit.amount, dec!(100));
        assert!(rejected[0].reason.contains(LOCAL));
        let record = orchestrator.ledger().get(&TxHash::new("d0d0")).unwrap();
        assert_eq!(record.source_chain, LOCAL);
        assert_eq!(record.destination_address, "A-receiver");
        assert_eq!(h.neo.receive_count(), 1);
        assert_eq!(h.local.receive_count(), 0);
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 100);
        assert_eq!(orchestrator.checkpoints().get(LOCAL), 7);

        // past the checkpoint now, reported once
        orchestrator.tick().await.unwrap();
        assert_eq!(snapshots.borrow().rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_failure_still_drives_in_flight() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        h.local.fail_next_receive(false);
        let mut orchestrator = h.orchestrator();
        orchestrator.tick().await.unwrap();

        h.neo.fail_polls(Some("explorer down"));
        let report = orchestrator.tick().await.unwrap();
        assert_eq!(report.poll_failures, 1);
        assert_eq!(status(&orchestrator, "H1"), Some(SwapStatus::Settled));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 50);

        h.neo.fail_polls(None);
        orchestrator.tick().await.unwrap();
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 100);
        assert_eq!(h.local.receive_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_work() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        let mut orchestrator = h.orchestrator();
        h.shutdown.send_replace(true);

        let report = orchestrator.tick().await.unwrap();

        assert!(report.interrupted);
        assert_eq!(orchestrator.ledger().len(), 0);
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 50);
    }

    #[tokio::test]
    async fn test_simulated_deposit_round_trip() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H0", 60, LOCAL));
        let mut orchestrator = h.orchestrator();
        let request = TransferRequest {
            source_address: "Auser".to_string(),
            destination_chain: LOCAL.to_string(),
            symbol: "X".to_string(),
            amount: dec!(12),
        };

        let hash = simulate_deposit(&orchestrator.adapters(), SOURCE, &request).await.unwrap();
        orchestrator.tick().await.unwrap();

        let record = orchestrator.ledger().get(&hash).unwrap();
        assert_eq!(record.status, SwapStatus::Settled);
        assert_eq!(record.amount, dec!(12));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 61);

        assert!(simulate_deposit(&orchestrator.adapters(), "ethereum", &request).await.is_err());
    }

    #[tokio::test]
    async fn test_blocked_swap_holds_its_own_height() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("A1", 100, LOCAL));
        let mut stranger = deposit("B1", 100, LOCAL);
        stranger.source_address = "Astranger".to_string();
        h.neo.deposit(stranger);
        h.neo.deposit(deposit("A0", 90, LOCAL));
        let mut orchestrator = h.orchestrator();

        orchestrator.tick().await.unwrap();

        assert_eq!(status(&orchestrator, "A1"), Some(SwapStatus::Settled));
        assert_eq!(orchestrator.checkpoints().get(SOURCE), 90);
    }

    #[tokio::test]
    async fn test_status_snapshot_published() {
        let h = Harness::new(MockAdapter::new(LOCAL));
        h.neo.deposit(deposit("H1", 100, LOCAL));
        h.neo.deposit(deposit("H2", 120, "unknownchain"));
        let mut orchestrator = h.orchestrator();
        let status = orchestrator.subscribe();
        assert!(status.borrow().last_tick.is_none());

        orchestrator.tick().await.unwrap();

        let snapshot = status.borrow().clone();
        assert!(snapshot.last_tick.is_some());
        assert_eq!(snapshot.counts["settled"], 1);
        assert_eq!(snapshot.counts["failed"], 1);
        assert_eq!(snapshot.counts["pending"], 0);
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.failed[0].source_hash, TxHash::new("H2"));
        assert_eq!(snapshot.chains, vec![LOCAL.to_string(), SOURCE.to_string()]);
    }
}
