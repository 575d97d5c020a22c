//! # Submission Retry Policy
//!
//! Drives a quorum-signed transaction to finalization:
//!
//! ```text
//!  ┌──► get_transaction ── Success ──────────────────────► done
//!  │        │ NotFound
//!  │        ▼
//!  │    send_transaction ── Pending / Duplicate ──► poll ── Success ──► done
//!  │        │                                         │
//!  │        ├─ TryAgainLater / transient ─────────────┤ not final yet
//!  │        ├─ BadSequence / TooLate (first time) ────┤
//!  └────────┴─────────────────────────────────────────┘
//! ```
//!
//! Anything else is a rejection. Retry pauses follow a jittered Fibonacci
//! schedule from `retry_delay` up to `max_retry_delay`. A transaction past
//! its max time is never sent again, and the whole loop stops at
//! `max_attempts`.

use backon::{BackoffBuilder, FibonacciBackoff, FibonacciBuilder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use oracle_core::time::now_ms;
use oracle_core::TxHash;

use crate::rpc::{ChainRpc, RejectReason, RpcError, SendStatus, TransactionStatus};
use crate::transaction::SignedTransaction;

/// Submission failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Transaction not finalized before its max time
    #[error("Transaction {hash} not finalized before {max_time}")]
    Timeout { hash: TxHash, max_time: u64 },

    /// Chain refused or failed the transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Sequence / time-bound race seen twice for the same transaction
    #[error("Repeated race condition: {0}")]
    RaceRepeated(RejectReason),

    /// Non-transient RPC failure
    #[error("RPC failure: {0}")]
    Rpc(RpcError),

    /// Attempt budget spent on transient failures
    #[error("Gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// Runner stopped while submitting
    #[error("Submission cancelled")]
    Cancelled,
}

impl SubmitError {
    /// Failure that does not indicate a divergent cluster state
    ///
    /// Benign races are absorbed by the policy itself; only a stopped
    /// runner ends a submission without a verdict.
    pub fn is_tolerated(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// How a submission ended successfully
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Found finalized before submitting
    AlreadyFinalized,
    /// Submitted and finalized
    Finalized { attempts: u32 },
}

/// Retry settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionConfig {
    /// Upper bound on submit cycles
    pub max_attempts: u32,

    /// Finalization polls per cycle
    pub poll_attempts: u32,

    pub poll_interval: Duration,

    /// First pause before retrying a cycle
    pub retry_delay: Duration,

    /// Cap on the growing retry pause
    pub max_retry_delay: Duration,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            poll_attempts: 10,
            poll_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl SubmissionConfig {
    /// Retry schedule for one submission
    pub fn backoff(&self) -> FibonacciBackoff {
        FibonacciBuilder::default()
            .with_jitter()
            .with_min_delay(self.retry_delay)
            .with_max_delay(self.max_retry_delay.max(self.retry_delay))
            .with_max_times(self.max_attempts as usize)
            .build()
    }
}

enum Step {
    Done(SubmitOutcome),
    Retry,
}

/// Retry policy bound to a chain endpoint
pub struct SubmissionPolicy {
    chain: Arc<dyn ChainRpc>,
    config: SubmissionConfig,
}

impl SubmissionPolicy {
    pub fn new(chain: Arc<dyn ChainRpc>, config: SubmissionConfig) -> Self {
        Self { chain, config }
    }

    /// Submit `tx` until it is finalized or a final error occurs
    ///
    /// `cancel` flipping to `true` aborts between steps.
    pub async fn submit(
        &self,
        tx: &SignedTransaction,
        cancel: &watch::Receiver<bool>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let mut race_seen = false;
        let mut submitted = false;
        let mut backoff = self.config.backoff();

        for attempt in 1..=self.config.max_attempts {
            if *cancel.borrow() {
                return Err(SubmitError::Cancelled);
            }

            match self.chain.get_transaction(&tx.hash).await {
                Ok(TransactionStatus::Success) => {
                    if submitted {
                        return Ok(SubmitOutcome::Finalized { attempts: attempt });
                    }
                    info!("Transaction {} already finalized", tx.hash);
                    return Ok(SubmitOutcome::AlreadyFinalized);
                }
                Ok(TransactionStatus::Failed(reason)) => return Err(SubmitError::Rejected(reason)),
                Ok(TransactionStatus::Pending) => {
                    match self.poll(tx, attempt, cancel).await? {
                        Step::Done(outcome) => return Ok(outcome),
                        Step::Retry => continue,
                    }
                }
                Ok(TransactionStatus::NotFound) => {}
                Err(e) if e.is_transient() => {
                    debug!("Lookup of {} failed: {}", tx.hash, e);
                    self.retry(&mut backoff, cancel).await?;
                    continue;
                }
                Err(e) => return Err(SubmitError::Rpc(e)),
            }

            // never re-send past the time bound
            if attempt > 1 {
                check_expiry(tx)?;
            }

            match self.chain.send_transaction(tx).await {
                Ok(SendStatus::Pending) | Ok(SendStatus::Duplicate) => {
                    submitted = true;
                }
                Ok(SendStatus::TryAgainLater) => {
                    debug!("Submit of {} deferred by endpoint", tx.hash);
                    self.retry(&mut backoff, cancel).await?;
                    continue;
                }
                Ok(SendStatus::Rejected(reason)) if reason.is_race() => {
                    if race_seen {
                        return Err(SubmitError::RaceRepeated(reason));
                    }
                    race_seen = true;
                    warn!("Transaction {} hit {}, retrying once", tx.hash, reason);
                    self.retry(&mut backoff, cancel).await?;
                    continue;
                }
                Ok(SendStatus::Rejected(reason)) => {
                    return Err(SubmitError::Rejected(reason.to_string()))
                }
                Err(e) if e.is_transient() => {
                    debug!("Submit of {} failed: {}", tx.hash, e);
                    self.retry(&mut backoff, cancel).await?;
                    continue;
                }
                Err(e) => return Err(SubmitError::Rpc(e)),
            }

            match self.poll(tx, attempt, cancel).await? {
                Step::Done(outcome) => return Ok(outcome),
                Step::Retry => continue,
            }
        }

        Err(SubmitError::Exhausted {
            attempts: self.config.max_attempts,
        })
    }

    async fn poll(
        &self,
        tx: &SignedTransaction,
        attempt: u32,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Step, SubmitError> {
        for _ in 0..self.config.poll_attempts {
            self.pause(self.config.poll_interval, cancel).await?;

            match self.chain.get_transaction(&tx.hash).await {
                Ok(TransactionStatus::Success) => {
                    return Ok(Step::Done(SubmitOutcome::Finalized { attempts: attempt }))
                }
                Ok(TransactionStatus::Failed(reason)) => return Err(SubmitError::Rejected(reason)),
                Ok(_) => {}
                Err(e) if e.is_transient() => debug!("Poll of {} failed: {}", tx.hash, e),
                Err(e) => return Err(SubmitError::Rpc(e)),
            }

            check_expiry(tx)?;
        }
        Ok(Step::Retry)
    }

    /// Wait for the next slot of the retry schedule
    async fn retry(
        &self,
        backoff: &mut FibonacciBackoff,
        cancel: &watch::Receiver<bool>,
    ) -> Result<(), SubmitError> {
        let delay = backoff.next().ok_or(SubmitError::Exhausted {
            attempts: self.config.max_attempts,
        })?;
        self.pause(delay, cancel).await
    }

    async fn pause(
        &self,
        duration: Duration,
        cancel: &watch::Receiver<bool>,
    ) -> Result<(), SubmitError> {
        let mut cancel = cancel.clone();
        if *cancel.borrow() {
            return Err(SubmitError::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            changed = cancel.changed() => match changed {
                Ok(()) if *cancel.borrow() => Err(SubmitError::Cancelled),
                // sender gone or flipped back: finish the wait
                _ => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            },
        }
    }
}

fn check_expiry(tx: &SignedTransaction) -> Result<(), SubmitError> {
    if now_ms() > tx.tx.max_time {
        return Err(SubmitError::Timeout {
            hash: tx.hash,
            max_time: tx.tx.max_time,
        });
    }
    Ok(())
}
