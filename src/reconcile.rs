//! Reconciliation gateway
//!
//! Applies a txHash keyed status report from the chain watcher to the ledger.
//! The report may arrive before the ledger row exists; that is reported as
//! `NotFound` and the watcher is expected to retry with backoff.
use crate::config::ReconcilePolicy;
use crate::context::EngineContext;
use crate::error::{Conflict, WorkflowError, WorkflowResult};
use crate::store::{CasOutcome, Record, RecordStore, RecordStoreExt};
use crate::transaction::{Transaction, TxStatus};
use crate::types::TxHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

impl ReconcileOutcome {
    const MODIFIED: Self = Self {
        matched_count: 1,
        modified_count: 1,
    };
    const UNCHANGED: Self = Self {
        matched_count: 1,
        modified_count: 0,
    };
}

impl ReconcilePolicy {
    pub fn permits(&self, from: TxStatus, to: TxStatus) -> bool {
        match self {
            ReconcilePolicy::Forward => !from.is_terminal() || from == to,
            ReconcilePolicy::Permissive => true,
        }
    }
}

pub struct ReconciliationGateway<S: RecordStore> {
    ctx: EngineContext<S>,
}

impl<S: RecordStore> ReconciliationGateway<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    pub fn reconcile(
        &self,
        tx_hash: &str,
        new_status: TxStatus,
        block_number: Option<u64>,
    ) -> WorkflowResult<ReconcileOutcome> {
        let tx_hash = TxHash::parse(tx_hash)?;
        let policy = self.ctx.config.reconcile_policy;
        let now = self.ctx.clock.now();

        let unchanged = |tx: &Transaction| {
            tx.status == new_status && block_number.is_none_or(|b| tx.block_number == Some(b))
        };

        let outcome = self.ctx.store.conditional_update::<Transaction>(
            tx_hash.as_str(),
            |tx| !unchanged(tx) && policy.permits(tx.status, new_status),
            |tx| {
                tx.status = new_status;
                if block_number.is_some() {
                    tx.block_number = block_number;
                }
                tx.updated_at = now.clone();
            },
        )?;

        match outcome {
            CasOutcome::Applied(tx) => {
                tracing::info!(
                    tx_hash = %tx.tx_hash,
                    status = %tx.status,
                    block_number = ?tx.block_number,
                    "transaction reconciled"
                );
                Ok(ReconcileOutcome::MODIFIED)
            }
            CasOutcome::Unmatched(tx) if unchanged(&tx) => {
                tracing::debug!(tx_hash = %tx.tx_hash, status = %tx.status, "reconcile is a no-op");
                Ok(ReconcileOutcome::UNCHANGED)
            }
            CasOutcome::Unmatched(tx) => {
                tracing::warn!(
                    tx_hash = %tx.tx_hash,
                    from = %tx.status,
                    to = %new_status,
                    "refusing backward reconcile"
                );
                Err(WorkflowError::Conflict(Conflict::IllegalTransition {
                    from: tx.status.as_str(),
                    to: new_status.as_str(),
                }))
            }
            CasOutcome::Missing => {
                tracing::debug!(tx_hash = %tx_hash, "nothing to reconcile yet");
                Err(WorkflowError::not_found(Transaction::KIND, tx_hash.as_str()))
            }
        }
    }
}
