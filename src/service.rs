//! Service layer API consumed by the UI / HTTP boundary
//!
//! Accepts loosely typed boundary input (action strings, raw addresses, status
//! names), turns it into the typed engine vocabulary and dispatches to the
//! workflow engine, ledger and reconciliation gateway.
use std::sync::Arc;

use crate::claim::ClaimRequest;
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::decision::{ClaimDecision, DecisionAction, DecisionPayload, IssuerDecision};
use crate::error::{StoreError, WorkflowError, WorkflowResult};
use crate::issuer::{IssuerRequestStatus, NewTrustedIssuerRequest, TrustedIssuerRequest};
use crate::ledger::{NewTransaction, TransactionFilter, TransactionLedger};
use crate::reconcile::{ReconcileOutcome, ReconciliationGateway};
use crate::store::{RecordStore, SledStore};
use crate::transaction::{Metadata, Transaction, TxStatus, TxType};
use crate::types::ClaimTopic;
use crate::workflow::{ClaimRequestFilter, WorkflowEngine};

/// What happened to the companion ledger row of a decision.
#[derive(Debug)]
pub enum LedgerOutcome {
    /// The decision carries no transaction.
    NotRequired,
    Recorded(Transaction),
    /// A row with the same txHash already existed; it was left as is.
    AlreadyRecorded,
    /// The decision is persisted but the ledger write failed. Retry with
    /// [`ComplianceService::record_transaction`].
    Failed(WorkflowError),
}

#[derive(Debug)]
pub struct DecisionReceipt<R> {
    pub request: R,
    pub ledger: LedgerOutcome,
}

pub struct ComplianceService<S: RecordStore = SledStore> {
    ctx: EngineContext<S>,
    workflow: WorkflowEngine<S>,
    ledger: TransactionLedger<S>,
    gateway: ReconciliationGateway<S>,
}

impl ComplianceService<SledStore> {
    pub fn open(instance: Arc<sled::Db>, config: EngineConfig) -> Result<Self, StoreError> {
        let store = Arc::new(SledStore::new(instance)?);
        Ok(Self::new(EngineContext::new(store, config)))
    }
}

impl<S: RecordStore> ComplianceService<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self {
            workflow: WorkflowEngine::new(ctx.clone()),
            ledger: TransactionLedger::new(ctx.clone()),
            gateway: ReconciliationGateway::new(ctx.clone()),
            ctx,
        }
    }

    pub fn submit_claim_request(
        &self,
        subject_address: &str,
        issuer_address: &str,
        claim_topic: ClaimTopic,
    ) -> WorkflowResult<ClaimRequest> {
        self.workflow
            .submit_claim_request(subject_address, issuer_address, claim_topic)
    }

    /// `action` is `"approve"` or `"reject"`; only the issuer recorded on the
    /// request may decide it.
    pub fn decide_claim_request(
        &self,
        request_id: &str,
        action: &str,
        issuer_address: &str,
        payload: DecisionPayload,
    ) -> WorkflowResult<ClaimRequest> {
        let action: DecisionAction = action.parse()?;
        let decision = ClaimDecision::from_parts(action, &payload);
        self.workflow
            .decide_claim_request(request_id, decision, issuer_address)
    }

    pub fn complete_claim_request(&self, request_id: &str) -> WorkflowResult<ClaimRequest> {
        self.workflow.complete_claim_request(request_id)
    }

    pub fn get_claim_request(&self, request_id: &str) -> WorkflowResult<ClaimRequest> {
        self.workflow.get_claim_request(request_id)
    }

    pub fn list_claim_requests(
        &self,
        filter: &ClaimRequestFilter,
        limit: Option<usize>,
    ) -> WorkflowResult<Vec<ClaimRequest>> {
        self.workflow.list_claim_requests(filter, limit)
    }

    pub fn submit_trusted_issuer_request(
        &self,
        data: NewTrustedIssuerRequest,
    ) -> WorkflowResult<TrustedIssuerRequest> {
        self.workflow.submit_trusted_issuer_request(data)
    }

    /// Decide, then record the approval transaction as a second, separate
    /// step. A decision error aborts; a ledger error is reported in the
    /// receipt next to the persisted decision.
    pub fn decide_trusted_issuer_request(
        &self,
        request_id: &str,
        action: &str,
        reviewer_address: &str,
        payload: DecisionPayload,
    ) -> WorkflowResult<DecisionReceipt<TrustedIssuerRequest>> {
        let action: DecisionAction = action.parse()?;
        let decision = IssuerDecision::from_parts(action, &payload, self.ctx.validator.as_ref())?;
        let request =
            self.workflow
                .decide_trusted_issuer_request(request_id, decision, reviewer_address)?;

        let ledger = match self.approval_transaction(&request) {
            None => LedgerOutcome::NotRequired,
            Some(new) => match self.ledger.record(new) {
                Ok(tx) => LedgerOutcome::Recorded(tx),
                Err(WorkflowError::Conflict(_)) => LedgerOutcome::AlreadyRecorded,
                Err(err) => {
                    tracing::warn!(id = %request.id, error = %err, "approval persisted but ledger write failed");
                    LedgerOutcome::Failed(err)
                }
            },
        };

        Ok(DecisionReceipt { request, ledger })
    }

    pub fn get_trusted_issuer_request(&self, request_id: &str) -> WorkflowResult<TrustedIssuerRequest> {
        self.workflow.get_trusted_issuer_request(request_id)
    }

    pub fn list_trusted_issuer_requests(
        &self,
        status: Option<IssuerRequestStatus>,
        limit: Option<usize>,
    ) -> WorkflowResult<Vec<TrustedIssuerRequest>> {
        self.workflow.list_trusted_issuer_requests(status, limit)
    }

    pub fn record_transaction(
        &self,
        tx_hash: &str,
        from_address: &str,
        contract_address: &str,
        tx_type: &str,
        metadata: Metadata,
    ) -> WorkflowResult<Transaction> {
        self.ledger.record(NewTransaction {
            tx_hash: tx_hash.to_owned(),
            from_address: from_address.to_owned(),
            contract_address: contract_address.to_owned(),
            tx_type: tx_type.to_owned(),
            metadata,
        })
    }

    pub fn list_transactions(
        &self,
        filter: &TransactionFilter,
        limit: Option<usize>,
    ) -> WorkflowResult<Vec<Transaction>> {
        self.ledger.query(filter, limit)
    }

    pub fn find_transaction(&self, tx_hash: &str) -> WorkflowResult<Transaction> {
        self.ledger.find(tx_hash)
    }

    pub fn reconcile_transaction(
        &self,
        tx_hash: &str,
        status: &str,
        block_number: Option<u64>,
    ) -> WorkflowResult<ReconcileOutcome> {
        let status: TxStatus = status.parse()?;
        self.gateway.reconcile(tx_hash, status, block_number)
    }

    // companion ledger row for an approved issuer request
    fn approval_transaction(&self, request: &TrustedIssuerRequest) -> Option<NewTransaction> {
        let tx_hash = request.approval_tx_hash.as_ref()?;
        let issuer_contract = request.issuer_contract_address.as_ref()?;
        let reviewer = request.reviewed_by.as_ref()?;
        let contract = self
            .ctx
            .config
            .trusted_issuers_registry
            .as_ref()
            .unwrap_or(issuer_contract);

        let topics: Vec<String> = request.claim_topics.iter().map(|t| t.to_string()).collect();
        let metadata = Metadata::from([
            ("requestId".to_owned(), request.id.clone()),
            ("organizationName".to_owned(), request.organization_name.clone()),
            ("issuerContractAddress".to_owned(), issuer_contract.to_string()),
            ("claimTopics".to_owned(), topics.join(",")),
        ]);

        Some(NewTransaction {
            tx_hash: tx_hash.to_string(),
            from_address: reviewer.to_string(),
            contract_address: contract.to_string(),
            tx_type: TxType::TrustedIssuerApproval.to_string(),
            metadata,
        })
    }
}
