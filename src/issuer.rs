//! Trusted issuer onboarding requests
use std::collections::BTreeSet;
use std::fmt;

use chrono::Utc;

use crate::address::{Address, AddressValidator};
use crate::auth::{self, Role};
use crate::config::EngineConfig;
use crate::decision::IssuerDecision;
use crate::error::{WorkflowError, WorkflowResult};
use crate::store::{Record, RecordKind};
use crate::types::{ClaimTopic, TimeStamp, TxHash};
use crate::utils::required_text;
use crate::workflow::Reviewable;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssuerRequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

impl IssuerRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerRequestStatus::Pending => "pending",
            IssuerRequestStatus::Approved => "approved",
            IssuerRequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for IssuerRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission as received from the requester, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewTrustedIssuerRequest {
    pub requester_address: String,
    pub organization_name: String,
    pub contact_info: String,
    pub claim_topics: Vec<ClaimTopic>,
}

/// Validated submission fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerApplication {
    pub requester_address: Address,
    pub organization_name: String,
    pub contact_info: String,
    pub claim_topics: BTreeSet<ClaimTopic>,
}

impl NewTrustedIssuerRequest {
    pub fn validate(&self, validator: &dyn AddressValidator) -> WorkflowResult<IssuerApplication> {
        let requester_address = Address::parse(&self.requester_address, validator)?;
        let organization_name = required_text("organization name", &self.organization_name)?;
        let contact_info = required_text("contact info", &self.contact_info)?;
        let claim_topics: BTreeSet<ClaimTopic> = self.claim_topics.iter().copied().collect();
        if claim_topics.is_empty() {
            return Err(WorkflowError::invalid("at least one claim topic is required"));
        }
        Ok(IssuerApplication {
            requester_address,
            organization_name,
            contact_info,
            claim_topics,
        })
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TrustedIssuerRequest {
    #[n(0)]
    pub id: String, // bech32m encoded uuid7, hrp "issuer_"
    #[n(1)]
    pub requester_address: Address,
    #[n(2)]
    pub organization_name: String,
    #[n(3)]
    pub contact_info: String,
    #[n(4)]
    pub claim_topics: BTreeSet<ClaimTopic>,
    #[n(5)]
    pub status: IssuerRequestStatus,
    #[n(6)]
    pub issuer_contract_address: Option<Address>,
    #[n(7)]
    pub approval_tx_hash: Option<TxHash>,
    #[n(8)]
    pub rejection_reason: Option<String>,
    #[n(9)]
    pub reviewed_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub reviewed_by: Option<Address>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
}

impl TrustedIssuerRequest {
    pub fn new(id: String, application: IssuerApplication, created_at: TimeStamp<Utc>) -> Self {
        Self {
            id,
            requester_address: application.requester_address,
            organization_name: application.organization_name,
            contact_info: application.contact_info,
            claim_topics: application.claim_topics,
            status: IssuerRequestStatus::Pending,
            issuer_contract_address: None,
            approval_tx_hash: None,
            rejection_reason: None,
            reviewed_at: None,
            reviewed_by: None,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == IssuerRequestStatus::Pending
    }
}

impl Record for TrustedIssuerRequest {
    const KIND: RecordKind = RecordKind::TrustedIssuerRequest;

    fn key(&self) -> &str {
        &self.id
    }
}

impl Reviewable for TrustedIssuerRequest {
    type Decision = IssuerDecision;
    const PENDING_INDEX: RecordKind = RecordKind::PendingIssuerIndex;

    fn pending_slot(&self) -> String {
        self.requester_address.to_string()
    }

    fn is_pending(&self) -> bool {
        TrustedIssuerRequest::is_pending(self)
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }

    fn authorize(&self, acting: &Address, config: &EngineConfig) -> WorkflowResult<()> {
        auth::authorize_any(&config.reviewers, acting, Role::TrustedIssuerReviewer)
    }

    fn apply_decision(&mut self, decision: &IssuerDecision, reviewer: &Address, at: &TimeStamp<Utc>) {
        match decision {
            IssuerDecision::Approve {
                tx_hash,
                issuer_contract_address,
            } => {
                self.status = IssuerRequestStatus::Approved;
                self.issuer_contract_address = Some(issuer_contract_address.clone());
                self.approval_tx_hash = Some(tx_hash.clone());
                self.rejection_reason = None;
            }
            IssuerDecision::Reject { reason } => {
                self.status = IssuerRequestStatus::Rejected;
                self.rejection_reason = reason.clone();
            }
        }
        self.reviewed_at = Some(at.clone());
        self.reviewed_by = Some(reviewer.clone());
    }
}
