//! # Runner
//!
//! One runner per managed contract. Each tick builds at most one candidate
//! transaction, signs it, merges early signatures and gossips its own
//! signature; incoming signatures are merged as they arrive. Whoever sees
//! the quorum first takes the pending transaction out and submits it.
//!
//! ```text
//!          tick                    own signature            quorum
//!  Idle ─────────► Building ─────────────────► AwaitingQuorum ──────► Submitting
//!   ▲                 │ nothing to do / error        │ superseded         │
//!   └─────────────────┴──────────────────────────────┴────────────────────┘
//! ```
//!
//! Taking the pending transaction out under the lock is the single commit
//! point: after it, neither the tick path nor the signature path can submit
//! the same transaction again.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use oracle_core::time::{align_to, now_ms, MINUTE_MS};
use oracle_core::{ContractId, ContractKind, NodeId, TxHash};
use oracle_crypto::NodeSignature;
use oracle_network::ClusterMessage;

use crate::context::{LocalUpdate, NodeContext};
use crate::error::Result;
use crate::pending::PendingTransaction;
use crate::strategy::{Candidate, ContractStrategy};
use crate::submission::SubmissionPolicy;

/// Observable runner state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Building,
    AwaitingQuorum,
    Submitting,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Idle => "idle",
            RunnerState::Building => "building",
            RunnerState::AwaitingQuorum => "awaiting_quorum",
            RunnerState::Submitting => "submitting",
        };
        f.write_str(name)
    }
}

/// What happened to an incoming signature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// Added to the current pending transaction
    Merged,
    /// Kept until a matching transaction is built
    Buffered,
    /// Signer already counted
    Duplicate,
    /// Failed verification or not a member
    Rejected,
}

#[derive(Default)]
struct RunnerInner {
    pending: Option<PendingTransaction>,
    local_update: Option<LocalUpdate>,
    building: bool,
    submitting: usize,
    last_timestamp: Option<u64>,
}

/// Per-contract consensus state machine
pub struct Runner {
    contract_id: ContractId,
    strategy: Arc<dyn ContractStrategy>,
    ctx: Arc<NodeContext>,
    inner: Mutex<RunnerInner>,
    tick_lock: tokio::sync::Mutex<()>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Resets the building flag even if the tick future is dropped
struct BuildingGuard<'a>(&'a Mutex<RunnerInner>);

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().building = false;
    }
}

/// Tracks an in-flight submission
struct SubmittingGuard<'a>(&'a Mutex<RunnerInner>);

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.submitting = inner.submitting.saturating_sub(1);
    }
}

impl Runner {
    pub fn new(ctx: Arc<NodeContext>, strategy: Arc<dyn ContractStrategy>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            contract_id: strategy.config().id.clone(),
            strategy,
            ctx,
            inner: Mutex::new(RunnerInner::default()),
            tick_lock: tokio::sync::Mutex::new(()),
            stop_tx,
            task: Mutex::new(None),
        }
    }

    pub fn contract_id(&self) -> &ContractId {
        &self.contract_id
    }

    pub fn kind(&self) -> ContractKind {
        self.strategy.kind()
    }

    pub fn strategy(&self) -> &Arc<dyn ContractStrategy> {
        &self.strategy
    }

    pub fn state(&self) -> RunnerState {
        let inner = self.inner.lock();
        if inner.submitting > 0 {
            RunnerState::Submitting
        } else if inner.building {
            RunnerState::Building
        } else if inner.pending.is_some() {
            RunnerState::AwaitingQuorum
        } else {
            RunnerState::Idle
        }
    }

    /// Hash of the outstanding transaction
    pub fn pending_hash(&self) -> Option<TxHash> {
        self.inner.lock().pending.as_ref().map(|p| p.hash())
    }

    pub fn pending_signature_count(&self) -> usize {
        self.inner
            .lock()
            .pending
            .as_ref()
            .map(|p| p.signature_count())
            .unwrap_or(0)
    }

    /// Last processed tick timestamp
    pub fn last_timestamp(&self) -> Option<u64> {
        self.inner.lock().last_timestamp
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the tick loop
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }
        self.stop_tx.send_replace(false);
        let stop_rx = self.stop_tx.subscribe();
        let runner = Arc::clone(self);
        *task = Some(tokio::spawn(async move { runner.run(stop_rx).await }));
        info!(
            "Runner {} ({}) started, timeframe {}ms",
            self.contract_id,
            self.kind(),
            self.strategy.timeframe()
        );
    }

    /// Cancel the tick loop and discard the outstanding transaction
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        // a restart must not revive the old loop
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }

        let mut inner = self.inner.lock();
        if let Some(pending) = inner.pending.take() {
            debug!(
                "Runner {} discarding pending {} transaction {}",
                self.contract_id,
                pending.kind(),
                pending.hash()
            );
        }
        inner.local_update = None;
        info!("Runner {} stopped", self.contract_id);
    }

    async fn run(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let delay_ms = self.ctx.db_sync_delay.as_millis() as u64;
        let mut timestamp = align_to(now_ms(), MINUTE_MS);

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let wait = (timestamp + delay_ms).saturating_sub(now_ms());
            tokio::select! {
                _ = stop_rx.changed() => continue,
                _ = tokio::time::sleep(Duration::from_millis(wait)) => {}
            }

            tokio::select! {
                _ = stop_rx.changed() => continue,
                // errors are logged by process_tick
                _ = self.process_tick(timestamp) => {}
            }

            timestamp = self.next_tick(timestamp);
        }
        debug!("Runner {} loop exited", self.contract_id);
    }

    /// Next tick after `current`, skipping ticks that are already stale
    fn next_tick(&self, current: u64) -> u64 {
        let mut next = self.strategy.next_timestamp(current);
        let now = now_ms();
        let mut skipped = 0;
        while next.saturating_add(self.strategy.timeframe()) <= now {
            next = self.strategy.next_timestamp(next);
            skipped += 1;
        }
        if skipped > 0 {
            warn!("Runner {} skipped {} stale ticks", self.contract_id, skipped);
        }
        next
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run one tick at the logical `timestamp`
    ///
    /// Ticks are serialized. A failing tick is logged and leaves the runner
    /// ready for the next one.
    pub async fn process_tick(&self, timestamp: u64) -> Result<()> {
        let _tick = self.tick_lock.lock().await;
        self.ctx.signatures.cleanup();

        let result = {
            self.inner.lock().building = true;
            let _building = BuildingGuard(&self.inner);
            self.build_and_propose(timestamp).await
        };

        self.inner.lock().last_timestamp = Some(timestamp);
        self.ctx.stats.set_last_processed(&self.contract_id, timestamp);
        self.ctx
            .stats
            .set_pending_signatures(self.ctx.signatures.signature_count());

        if let Err(e) = &result {
            if e.is_recoverable() {
                debug!("Runner {} tick {} skipped: {}", self.contract_id, timestamp, e);
            } else {
                warn!("Runner {} tick {} failed: {}", self.contract_id, timestamp, e);
            }
        }
        result
    }

    async fn build_and_propose(&self, timestamp: u64) -> Result<()> {
        let Candidate { tx, local_update } =
            match self.strategy.build_candidate(&self.ctx, timestamp).await? {
                Some(candidate) => candidate,
                None => {
                    debug!("Runner {} up to date at {}", self.contract_id, timestamp);
                    return Ok(());
                }
            };

        let tx = match tx {
            Some(tx) => tx,
            None => {
                if let Some(update) = local_update {
                    self.ctx.apply_local_update(update)?;
                }
                return Ok(());
            }
        };

        let mut pending = PendingTransaction::new(tx, timestamp, &self.ctx.network_passphrase)?;
        let hash = pending.hash();
        let own = self.ctx.keypair().sign(&hash);
        pending.add_signature(own.clone());

        {
            let mut inner = self.inner.lock();
            for signature in self.ctx.signatures.take(&hash) {
                if self.ctx.is_member(&signature.signer) {
                    pending.add_signature(signature);
                }
            }
            info!(
                "Runner {} built {} transaction {} at {} ({} signatures)",
                self.contract_id,
                pending.kind(),
                hash,
                timestamp,
                pending.signature_count()
            );

            match inner.pending.as_mut() {
                Some(existing) if existing.hash() == hash => {
                    for signature in pending.signatures() {
                        existing.add_signature(signature.clone());
                    }
                }
                _ => {
                    if let Some(stale) = inner.pending.replace(pending) {
                        warn!(
                            "Runner {} replaced unsubmitted {} transaction {} ({} signatures, quorum missed)",
                            self.contract_id,
                            stale.kind(),
                            stale.hash(),
                            stale.signature_count()
                        );
                    }
                }
            }
            inner.local_update = local_update;
        }

        self.broadcast_signature(hash, own).await;
        self.try_submit().await
    }

    async fn broadcast_signature(&self, hash: TxHash, signature: NodeSignature) {
        let message = ClusterMessage::Signature {
            contract_id: self.contract_id.clone(),
            hash,
            signature,
        };
        match self.ctx.messenger.broadcast(message).await {
            Ok(reached) => debug!("Signature for {} sent to {} peers", hash, reached),
            Err(e) => warn!("Failed to broadcast signature for {}: {}", hash, e),
        }
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    /// Merge a signature received from a peer
    pub async fn add_signature(&self, hash: TxHash, signature: NodeSignature) -> SignatureOutcome {
        if !self.ctx.is_member(&signature.signer) {
            debug!(
                "Dropping signature for {} from non-member {}",
                hash, signature.signer
            );
            return SignatureOutcome::Rejected;
        }
        if let Err(e) = signature.verify(&hash) {
            debug!(
                "Dropping signature for {} from {}: {}",
                hash, signature.signer, e
            );
            return SignatureOutcome::Rejected;
        }

        let outcome = {
            let mut inner = self.inner.lock();
            match inner.pending.as_mut() {
                Some(pending) if pending.hash() == hash => {
                    if pending.add_signature(signature) {
                        SignatureOutcome::Merged
                    } else {
                        SignatureOutcome::Duplicate
                    }
                }
                _ => {
                    if self.ctx.signatures.insert(hash, signature) {
                        SignatureOutcome::Buffered
                    } else {
                        SignatureOutcome::Duplicate
                    }
                }
            }
        };

        if outcome == SignatureOutcome::Merged {
            // failures are logged by try_submit
            let _ = self.try_submit().await;
        }
        outcome
    }

    /// Re-send our signature of the outstanding transaction to a peer that
    /// just (re)connected
    pub async fn on_peer_ready(&self, peer: &NodeId) -> bool {
        let own = {
            let inner = self.inner.lock();
            inner.pending.as_ref().and_then(|p| {
                p.signature_of(&self.ctx.node_id())
                    .map(|s| (p.hash(), s.clone()))
            })
        };
        let (hash, signature) = match own {
            Some(own) => own,
            None => return false,
        };

        let message = ClusterMessage::Signature {
            contract_id: self.contract_id.clone(),
            hash,
            signature,
        };
        match self.ctx.messenger.send_to(peer, message).await {
            Ok(()) => {
                debug!("Re-sent signature for {} to {}", hash, peer);
                true
            }
            Err(e) => {
                debug!("Could not re-send signature to {}: {}", peer, e);
                false
            }
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    async fn try_submit(&self) -> Result<()> {
        let total = self.ctx.member_count();
        let (signed, local_update) = {
            let mut inner = self.inner.lock();
            if !inner
                .pending
                .as_ref()
                .map(|p| p.is_ready_to_submit(total))
                .unwrap_or(false)
            {
                return Ok(());
            }
            let pending = match inner.pending.take() {
                Some(pending) => pending,
                None => return Ok(()),
            };
            inner.submitting += 1;
            (pending.into_signed(total), inner.local_update.take())
        };
        let _submitting = SubmittingGuard(&self.inner);
        let kind = signed.kind();

        info!(
            "Runner {} submitting {} transaction {} with {} signatures",
            self.contract_id,
            kind,
            signed.hash,
            signed.signatures.len()
        );

        let policy = SubmissionPolicy::new(self.ctx.chain.clone(), self.ctx.submission.clone());
        let stop_rx = self.stop_tx.subscribe();
        match policy.submit(&signed, &stop_rx).await {
            Ok(outcome) => {
                self.ctx.stats.inc_submitted(&self.contract_id, kind);
                info!(
                    "Runner {} transaction {} finalized ({:?})",
                    self.contract_id, signed.hash, outcome
                );
                if let Some(update) = local_update {
                    self.ctx.apply_local_update(update)?;
                }
                Ok(())
            }
            Err(e) => {
                self.ctx.stats.inc_failed(&self.contract_id, kind);
                if !e.is_tolerated() && kind.is_fatal_on_failure() {
                    error!(
                        "Runner {} {} transaction {} failed: {}",
                        self.contract_id, kind, signed.hash, e
                    );
                    self.ctx.request_shutdown(&format!(
                        "{} transaction for {} failed: {}",
                        kind, self.contract_id, e
                    ));
                } else {
                    warn!(
                        "Runner {} {} transaction {} failed: {}",
                        self.contract_id, kind, signed.hash, e
                    );
                }
                Err(e.into())
            }
        }
    }
}
