//! Record store: durable keyed storage for requests and transactions
//!
//! [`RecordStore`] is the byte level seam over the backing database. The typed
//! query contracts the engine relies on (`find_by_id`, `find_one`, `find`,
//! `insert`, `conditional_update`) live in [`RecordStoreExt`] and are shared by
//! every backend.
//!
//! Single-decision and txHash uniqueness are both expressed as compare-and-swap
//! on one key, so no operation ever writes more than one record. Lost races are
//! retried at most [`MAX_CAS_ATTEMPTS`] times before giving up with
//! [`StoreError::Contention`].
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use sled::{Db, Tree};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    ClaimRequest,
    TrustedIssuerRequest,
    Transaction,
    /// (subject, issuer, topic) -> id of the last claim request submitted for it
    PendingClaimIndex,
    /// requester -> id of the last trusted issuer request it submitted
    PendingIssuerIndex,
}

pub const MAX_CAS_ATTEMPTS: usize = 64;

impl RecordKind {
    pub fn tree_name(&self) -> &'static str {
        match self {
            RecordKind::ClaimRequest => "claim_requests",
            RecordKind::TrustedIssuerRequest => "trusted_issuer_requests",
            RecordKind::Transaction => "transactions",
            RecordKind::PendingClaimIndex => "pending_claim_requests",
            RecordKind::PendingIssuerIndex => "pending_trusted_issuer_requests",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::ClaimRequest => "claim request",
            RecordKind::TrustedIssuerRequest => "trusted issuer request",
            RecordKind::Transaction => "transaction",
            RecordKind::PendingClaimIndex => "pending claim request index",
            RecordKind::PendingIssuerIndex => "pending trusted issuer request index",
        })
    }
}

/// An entity persisted under a unique key in the tree for its kind.
pub trait Record: Sized + minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    const KIND: RecordKind;

    fn key(&self) -> &str;

    fn encode_record(&self) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(self).map_err(|e| StoreError::Encode {
            kind: Self::KIND,
            message: e.to_string(),
        })
    }

    fn decode_record(bytes: &[u8]) -> Result<Self, StoreError> {
        minicbor::decode(bytes).map_err(|source| StoreError::Decode {
            kind: Self::KIND,
            source,
        })
    }
}

pub trait RecordStore: Send + Sync {
    fn get(&self, kind: RecordKind, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert only if `key` is absent. Returns `false` when it already exists.
    fn insert_new(&self, kind: RecordKind, key: &str, value: Vec<u8>) -> Result<bool, StoreError>;

    /// Replace the value at `key` only if it still equals `current` byte for byte.
    fn compare_and_swap(
        &self,
        kind: RecordKind,
        key: &str,
        current: &[u8],
        new: Vec<u8>,
    ) -> Result<bool, StoreError>;

    fn scan(&self, kind: RecordKind) -> Result<Vec<Vec<u8>>, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn get(&self, kind: RecordKind, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(kind, key)
    }
    fn insert_new(&self, kind: RecordKind, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        (**self).insert_new(kind, key, value)
    }
    fn compare_and_swap(
        &self,
        kind: RecordKind,
        key: &str,
        current: &[u8],
        new: Vec<u8>,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(kind, key, current, new)
    }
    fn scan(&self, kind: RecordKind) -> Result<Vec<Vec<u8>>, StoreError> {
        (**self).scan(kind)
    }
}

/// Result of [`RecordStoreExt::conditional_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<R> {
    /// The expectation held and the new state was written.
    Applied(R),
    /// The stored record did not meet the expectation; carries what is stored.
    Unmatched(R),
    Missing,
}

pub trait RecordStoreExt: RecordStore {
    fn find_by_id<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        self.get(R::KIND, id)?
            .map(|bytes| R::decode_record(&bytes))
            .transpose()
    }

    fn find_one<R: Record>(&self, filter: impl Fn(&R) -> bool) -> Result<Option<R>, StoreError> {
        for bytes in self.scan(R::KIND)? {
            let record = R::decode_record(&bytes)?;
            if filter(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// All records matching `filter`, ordered by `sort`, at most `limit` long.
    fn find<R: Record>(
        &self,
        filter: impl Fn(&R) -> bool,
        sort: impl Fn(&R, &R) -> Ordering,
        limit: usize,
    ) -> Result<Vec<R>, StoreError> {
        let mut matches = vec![];
        for bytes in self.scan(R::KIND)? {
            let record = R::decode_record(&bytes)?;
            if filter(&record) {
                matches.push(record);
            }
        }
        matches.sort_by(|a, b| sort(a, b));
        matches.truncate(limit);
        Ok(matches)
    }

    /// Returns `false` if a record with the same key already exists.
    fn insert<R: Record>(&self, record: &R) -> Result<bool, StoreError> {
        self.insert_new(R::KIND, record.key(), record.encode_record()?)
    }

    /// Apply `apply` to the record at `id` only while `expected` holds for the
    /// stored value at write time.
    fn conditional_update<R: Record>(
        &self,
        id: &str,
        expected: impl Fn(&R) -> bool,
        apply: impl Fn(&mut R),
    ) -> Result<CasOutcome<R>, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(current_bytes) = self.get(R::KIND, id)? else {
                return Ok(CasOutcome::Missing);
            };
            let mut record = R::decode_record(&current_bytes)?;
            if !expected(&record) {
                return Ok(CasOutcome::Unmatched(record));
            }
            apply(&mut record);
            let new_bytes = record.encode_record()?;
            if self.compare_and_swap(R::KIND, id, &current_bytes, new_bytes)? {
                return Ok(CasOutcome::Applied(record));
            }
            // lost the race; re-read and re-test the expectation
            tracing::debug!(kind = %R::KIND, id, "conditional update retrying after concurrent write");
        }
        tracing::warn!(kind = %R::KIND, id, "conditional update gave up under contention");
        Err(StoreError::Contention {
            kind: R::KIND,
            key: id.to_owned(),
        })
    }

    /// Point `slot` in the `index` tree at `owner` unless it already names a
    /// holder for which `is_live` is true. Returns that live holder, or `None`
    /// once `owner` holds the slot.
    fn claim_slot(
        &self,
        index: RecordKind,
        slot: &str,
        owner: &str,
        is_live: impl Fn(&str) -> Result<bool, StoreError>,
    ) -> Result<Option<String>, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            if self.insert_new(index, slot, owner.as_bytes().to_vec())? {
                return Ok(None);
            }
            let Some(current) = self.get(index, slot)? else {
                continue;
            };
            let holder = String::from_utf8_lossy(&current).into_owned();
            if is_live(&holder)? {
                return Ok(Some(holder));
            }
            if self.compare_and_swap(index, slot, &current, owner.as_bytes().to_vec())? {
                return Ok(None);
            }
        }
        Err(StoreError::Contention {
            kind: index,
            key: slot.to_owned(),
        })
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

/// [`RecordStore`] over sled, one tree per [`RecordKind`].
pub struct SledStore {
    claim_requests: Tree,
    issuer_requests: Tree,
    transactions: Tree,
    pending_claims: Tree,
    pending_issuers: Tree,
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> Result<Self, StoreError> {
        Ok(Self {
            claim_requests: instance.open_tree(RecordKind::ClaimRequest.tree_name())?,
            issuer_requests: instance.open_tree(RecordKind::TrustedIssuerRequest.tree_name())?,
            transactions: instance.open_tree(RecordKind::Transaction.tree_name())?,
            pending_claims: instance.open_tree(RecordKind::PendingClaimIndex.tree_name())?,
            pending_issuers: instance.open_tree(RecordKind::PendingIssuerIndex.tree_name())?,
        })
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::new(Arc::new(db))
    }

    fn tree(&self, kind: RecordKind) -> &Tree {
        match kind {
            RecordKind::ClaimRequest => &self.claim_requests,
            RecordKind::TrustedIssuerRequest => &self.issuer_requests,
            RecordKind::Transaction => &self.transactions,
            RecordKind::PendingClaimIndex => &self.pending_claims,
            RecordKind::PendingIssuerIndex => &self.pending_issuers,
        }
    }
}

impl RecordStore for SledStore {
    fn get(&self, kind: RecordKind, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree(kind).get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn insert_new(&self, kind: RecordKind, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        let swapped = self
            .tree(kind)
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(value))?;
        Ok(swapped.is_ok())
    }

    fn compare_and_swap(
        &self,
        kind: RecordKind,
        key: &str,
        current: &[u8],
        new: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let swapped = self
            .tree(kind)
            .compare_and_swap(key.as_bytes(), Some(current), Some(new))?;
        Ok(swapped.is_ok())
    }

    fn scan(&self, kind: RecordKind) -> Result<Vec<Vec<u8>>, StoreError> {
        self.tree(kind)
            .iter()
            .values()
            .map(|value| value.map(|v| v.to_vec()).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
    struct Counter {
        #[n(0)]
        id: String,
        #[n(1)]
        value: u64,
    }

    impl Record for Counter {
        const KIND: RecordKind = RecordKind::Transaction;
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn counter(id: &str, value: u64) -> Counter {
        Counter {
            id: id.into(),
            value,
        }
    }

    #[test]
    fn insert_is_unique_per_key() {
        let store = SledStore::temporary().unwrap();
        assert!(store.insert(&counter("a", 1)).unwrap());
        assert!(!store.insert(&counter("a", 2)).unwrap());

        let stored: Counter = store.find_by_id("a").unwrap().unwrap();
        assert_eq!(stored.value, 1);
    }

    #[test]
    fn conditional_update_only_applies_when_expected() {
        let store = SledStore::temporary().unwrap();
        store.insert(&counter("a", 1)).unwrap();

        let applied = store
            .conditional_update::<Counter>("a", |c| c.value == 1, |c| c.value = 2)
            .unwrap();
        assert_eq!(applied, CasOutcome::Applied(counter("a", 2)));

        let unmatched = store
            .conditional_update::<Counter>("a", |c| c.value == 1, |c| c.value = 3)
            .unwrap();
        assert_eq!(unmatched, CasOutcome::Unmatched(counter("a", 2)));

        let missing = store
            .conditional_update::<Counter>("b", |_| true, |c| c.value = 3)
            .unwrap();
        assert_eq!(missing, CasOutcome::Missing);
    }

    #[test]
    fn find_filters_sorts_and_limits() {
        let store = SledStore::temporary().unwrap();
        for (id, value) in [("a", 5), ("b", 1), ("c", 9), ("d", 4)] {
            store.insert(&counter(id, value)).unwrap();
        }

        let found: Vec<Counter> = store
            .find(|c: &Counter| c.value > 1, |a: &Counter, b: &Counter| b.value.cmp(&a.value), 2)
            .unwrap();
        let values: Vec<u64> = found.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![9, 5]);

        let one: Option<Counter> = store.find_one(|c: &Counter| c.value == 4).unwrap();
        assert_eq!(one.map(|c| c.id), Some("d".to_string()));
    }

    // every swap loses, as if another writer always got there first
    struct Contended(SledStore);

    impl RecordStore for Contended {
        fn get(&self, kind: RecordKind, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.0.get(kind, key)
        }
        fn insert_new(&self, kind: RecordKind, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
            self.0.insert_new(kind, key, value)
        }
        fn compare_and_swap(
            &self,
            _: RecordKind,
            _: &str,
            _: &[u8],
            _: Vec<u8>,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn scan(&self, kind: RecordKind) -> Result<Vec<Vec<u8>>, StoreError> {
            self.0.scan(kind)
        }
    }

    #[test]
    fn conditional_update_gives_up_under_contention() {
        let store = Contended(SledStore::temporary().unwrap());
        store.insert(&counter("a", 1)).unwrap();

        let err = store
            .conditional_update::<Counter>("a", |_| true, |c| c.value += 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::Contention { kind: RecordKind::Transaction, ref key } if key == "a"));

        let stored: Counter = store.find_by_id("a").unwrap().unwrap();
        assert_eq!(stored.value, 1);
    }

    #[test]
    fn claim_slot_respects_live_holders() {
        let store = SledStore::temporary().unwrap();
        let index = RecordKind::PendingClaimIndex;

        assert_eq!(store.claim_slot(index, "k", "first", |_| Ok(true)).unwrap(), None);
        assert_eq!(
            store.claim_slot(index, "k", "second", |_| Ok(true)).unwrap(),
            Some("first".to_string())
        );

        // a settled holder gives the slot up
        assert_eq!(
            store.claim_slot(index, "k", "second", |holder| Ok(holder != "first")).unwrap(),
            None
        );
        assert_eq!(store.get(index, "k").unwrap(), Some(b"second".to_vec()));
    }
}
