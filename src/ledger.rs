//! Transaction ledger: one `pending` row per on-chain action attempt
use crate::context::EngineContext;
use crate::error::{Conflict, WorkflowError, WorkflowResult};
use crate::store::{Record, RecordStore, RecordStoreExt};
use crate::transaction::{Metadata, Transaction, TxStatus, TxType};
use crate::types::TxHash;

/// Everything needed to record an action, as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
    pub tx_hash: String,
    pub from_address: String,
    pub contract_address: String,
    pub tx_type: String,
    pub metadata: Metadata,
}

/// Filter for [`TransactionLedger::query`]. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub from_address: Option<String>,
    pub tx_type: Option<TxType>,
    pub status: Option<TxStatus>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_from_address(mut self, address: impl Into<String>) -> Self {
        self.from_address = Some(address.into());
        self
    }
    pub fn set_type(mut self, tx_type: TxType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }
    pub fn set_status(mut self, status: TxStatus) -> Self {
        self.status = Some(status);
        self
    }
}

pub struct TransactionLedger<S: RecordStore> {
    ctx: EngineContext<S>,
}

impl<S: RecordStore> TransactionLedger<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Insert a new `pending` transaction. A txHash that was already recorded
    /// is a conflict and leaves the existing row untouched.
    pub fn record(&self, new: NewTransaction) -> WorkflowResult<Transaction> {
        let tx_hash = TxHash::parse(&new.tx_hash)?;
        let from_address = self.ctx.address(&new.from_address)?;
        let contract_address = self.ctx.address(&new.contract_address)?;
        let tx_type: TxType = new.tx_type.parse()?;

        let transaction = Transaction::new(
            tx_hash,
            from_address,
            contract_address,
            tx_type,
            new.metadata,
            self.ctx.clock.now(),
        );

        if !self.ctx.store.insert(&transaction)? {
            tracing::debug!(tx_hash = %transaction.tx_hash, "transaction already recorded");
            return Err(WorkflowError::Conflict(Conflict::DuplicateTransaction {
                tx_hash: transaction.tx_hash.to_string(),
            }));
        }

        tracing::info!(
            tx_hash = %transaction.tx_hash,
            from = %transaction.from_address,
            tx_type = %transaction.tx_type,
            "transaction recorded"
        );
        Ok(transaction)
    }

    /// Transactions matching `filter`, newest first, at most `limit` of them
    /// (configured default when `None`). Every call re-reads current state.
    pub fn query(
        &self,
        filter: &TransactionFilter,
        limit: Option<usize>,
    ) -> WorkflowResult<Vec<Transaction>> {
        let from = filter
            .from_address
            .as_deref()
            .map(|a| self.ctx.address(a))
            .transpose()?;

        let transactions = self.ctx.store.find(
            |tx: &Transaction| {
                from.as_ref().is_none_or(|f| tx.from_address == *f)
                    && filter.tx_type.as_ref().is_none_or(|t| tx.tx_type == *t)
                    && filter.status.is_none_or(|s| tx.status == s)
            },
            |a: &Transaction, b: &Transaction| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.tx_hash.cmp(&a.tx_hash))
            },
            self.ctx.config.query_limit(limit),
        )?;
        Ok(transactions)
    }

    pub fn find(&self, tx_hash: &str) -> WorkflowResult<Transaction> {
        let tx_hash = TxHash::parse(tx_hash)?;
        self.ctx
            .store
            .find_by_id::<Transaction>(tx_hash.as_str())?
            .ok_or_else(|| WorkflowError::not_found(Transaction::KIND, tx_hash.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::store::SledStore;

    const FROM: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x3333333333333333333333333333333333333333";
    const REGISTRY: &str = "0x9999999999999999999999999999999999999999";

    fn ledger() -> TransactionLedger<SledStore> {
        let store = Arc::new(SledStore::temporary().unwrap());
        let ctx = EngineContext::new(store, EngineConfig::new().set_default_query_limit(2))
            .with_clock(Arc::new(ManualClock::starting_at(0, 1_000)));
        TransactionLedger::new(ctx)
    }

    fn new_tx(hash: &str, from: &str, ty: &str) -> NewTransaction {
        NewTransaction {
            tx_hash: hash.into(),
            from_address: from.into(),
            contract_address: REGISTRY.into(),
            tx_type: ty.into(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn record_normalises_hash_and_addresses() {
        let ledger = ledger();
        let tx = ledger
            .record(new_tx("0xABCD", &FROM.to_uppercase().replace("0X", "0x"), "identity-registration"))
            .unwrap();

        assert_eq!(tx.tx_hash.as_str(), "0xabcd");
        assert_eq!(tx.from_address.as_str(), FROM);
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.created_at, tx.updated_at);
        assert_eq!(ledger.find("0xAbCd").unwrap(), tx);
    }

    #[test]
    fn record_rejects_missing_fields() {
        let ledger = ledger();
        assert_eq!(
            ledger.record(new_tx("", FROM, "token-purchase")).unwrap_err().code(),
            "invalid_argument"
        );
        assert_eq!(
            ledger.record(new_tx("0x01", "", "token-purchase")).unwrap_err().code(),
            "invalid_argument"
        );
        assert_eq!(
            ledger.record(new_tx("0x01", FROM, "")).unwrap_err().code(),
            "invalid_argument"
        );
    }

    #[test]
    fn query_filters_newest_first_with_default_limit() {
        let ledger = ledger();
        ledger.record(new_tx("0x01", FROM, "identity-registration")).unwrap();
        ledger.record(new_tx("0x02", OTHER, "token-purchase")).unwrap();
        ledger.record(new_tx("0x03", FROM, "token-purchase")).unwrap();
        ledger.record(new_tx("0x04", FROM, "token-purchase")).unwrap();

        let hashes = |txs: Vec<Transaction>| -> Vec<String> {
            txs.into_iter().map(|t| t.tx_hash.to_string()).collect()
        };

        let from = TransactionFilter::new().set_from_address(FROM);
        assert_eq!(hashes(ledger.query(&from, None).unwrap()), vec!["0x04", "0x03"]);
        assert_eq!(
            hashes(ledger.query(&from, Some(10)).unwrap()),
            vec!["0x04", "0x03", "0x01"]
        );

        let purchases = TransactionFilter::new()
            .set_type(TxType::TokenPurchase)
            .set_status(TxStatus::Pending);
        assert_eq!(
            hashes(ledger.query(&purchases, Some(10)).unwrap()),
            vec!["0x04", "0x03", "0x02"]
        );
    }

    #[test]
    fn zero_limit_returns_nothing() {
        let ledger = ledger();
        ledger.record(new_tx("0x01", FROM, "token-purchase")).unwrap();
        ledger.record(new_tx("0x02", FROM, "token-purchase")).unwrap();

        assert!(ledger.query(&TransactionFilter::new(), Some(0)).unwrap().is_empty());
        assert_eq!(ledger.query(&TransactionFilter::new(), None).unwrap().len(), 2);
    }
}
