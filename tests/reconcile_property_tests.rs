//! Property-based tests for the transaction ledger and reconciliation gateway

use std::sync::Arc;

use compliance_workflow::{
    Conflict,
    clock::ManualClock,
    config::{EngineConfig, ReconcilePolicy},
    context::EngineContext,
    ledger::{NewTransaction, TransactionFilter, TransactionLedger},
    reconcile::ReconciliationGateway,
    store::SledStore,
    transaction::{Metadata, TxStatus},
};
use proptest::prelude::*;

const FROM: &str = "0x1111111111111111111111111111111111111111";
const CONTRACT: &str = "0x9999999999999999999999999999999999999999";

fn setup(policy: ReconcilePolicy) -> (TransactionLedger<SledStore>, ReconciliationGateway<SledStore>) {
    let store = Arc::new(SledStore::temporary().expect("temporary sled store"));
    let ctx = EngineContext::new(store, EngineConfig::new().set_reconcile_policy(policy))
        .with_clock(Arc::new(ManualClock::starting_at(1_700_000_000_000_000_000, 1_000)));
    (TransactionLedger::new(ctx.clone()), ReconciliationGateway::new(ctx))
}

fn hash_strategy() -> impl Strategy<Value = String> {
    "0x[0-9a-fA-F]{1,64}"
}

fn status_strategy() -> impl Strategy<Value = TxStatus> {
    prop_oneof![
        Just(TxStatus::Pending),
        Just(TxStatus::Confirmed),
        Just(TxStatus::Failed),
    ]
}

fn new_tx(hash: &str, metadata: Metadata) -> NewTransaction {
    NewTransaction {
        tx_hash: hash.to_owned(),
        from_address: FROM.into(),
        contract_address: CONTRACT.into(),
        tx_type: "token-purchase".into(),
        metadata,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: a repeated identical reconcile matches but changes nothing
    #[test]
    fn prop_reconcile_is_idempotent(
        hash in hash_strategy(),
        status in status_strategy(),
        block in proptest::option::of(any::<u64>()),
    ) {
        let (ledger, gateway) = setup(ReconcilePolicy::Forward);
        ledger.record(new_tx(&hash, Metadata::new())).unwrap();

        gateway.reconcile(&hash, status, block).unwrap();
        let after_first = ledger.find(&hash).unwrap();

        let second = gateway.reconcile(&hash.to_uppercase().replace("0X", "0x"), status, block).unwrap();
        prop_assert_eq!(second.matched_count, 1);
        prop_assert_eq!(second.modified_count, 0);
        prop_assert_eq!(ledger.find(&hash).unwrap(), after_first);
    }

    /// Property: re-recording a hash always conflicts and the original row is untouched
    #[test]
    fn prop_duplicate_record_conflicts(
        hash in hash_strategy(),
        first_note in "[a-z]{1,10}",
        second_note in "[a-z]{1,10}",
    ) {
        let (ledger, _) = setup(ReconcilePolicy::Forward);
        let original = ledger
            .record(new_tx(&hash, Metadata::from([("note".to_owned(), first_note)])))
            .unwrap();

        let err = ledger
            .record(new_tx(&hash.to_lowercase(), Metadata::from([("note".to_owned(), second_note)])))
            .unwrap_err();
        let is_duplicate = matches!(err.conflict(), Some(Conflict::DuplicateTransaction { .. }));
        prop_assert!(is_duplicate, "expected duplicate conflict, got {:?}", err);
        prop_assert_eq!(ledger.find(&hash).unwrap(), original);
    }

    /// Property: under the forward policy a settled transaction never changes status
    #[test]
    fn prop_forward_policy_never_reopens(
        hash in hash_strategy(),
        settled in prop_oneof![Just(TxStatus::Confirmed), Just(TxStatus::Failed)],
        later in prop::collection::vec(status_strategy(), 1..6),
    ) {
        let (ledger, gateway) = setup(ReconcilePolicy::Forward);
        ledger.record(new_tx(&hash, Metadata::new())).unwrap();
        gateway.reconcile(&hash, settled, Some(1)).unwrap();

        for status in later {
            let result = gateway.reconcile(&hash, status, None);
            prop_assert_eq!(result.is_ok(), status == settled);
            prop_assert_eq!(ledger.find(&hash).unwrap().status, settled);
        }
    }

    /// Property: query returns newest first and never more than the limit
    #[test]
    fn prop_query_is_bounded_and_ordered(
        count in 1usize..12,
        limit in 1usize..8,
    ) {
        let (ledger, _) = setup(ReconcilePolicy::Forward);
        for i in 0..count {
            ledger.record(new_tx(&format!("0x{:x}", i + 1), Metadata::new())).unwrap();
        }

        let found = ledger
            .query(&TransactionFilter::new().set_from_address(FROM), Some(limit))
            .unwrap();
        prop_assert_eq!(found.len(), count.min(limit));
        prop_assert!(found.windows(2).all(|w| w[0].created_at > w[1].created_at));

        // every call re-reads the store
        prop_assert_eq!(
            ledger.query(&TransactionFilter::new().set_from_address(FROM), Some(limit)).unwrap(),
            found
        );
    }
}
