//! Claim requests: a subject asks a named trusted issuer to attest a topic
use std::fmt;

use chrono::Utc;

use crate::address::Address;
use crate::auth::{self, Role};
use crate::config::EngineConfig;
use crate::decision::ClaimDecision;
use crate::error::WorkflowResult;
use crate::store::{Record, RecordKind};
use crate::types::{ClaimTopic, TimeStamp};
use crate::workflow::Reviewable;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    /// Set once the on-chain claim-add transaction confirmed.
    #[n(3)]
    Completed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    #[n(0)]
    pub id: String, // bech32m encoded uuid7, hrp "claim_"
    #[n(1)]
    pub subject_address: Address,
    #[n(2)]
    pub issuer_address: Address,
    #[n(3)]
    pub claim_topic: ClaimTopic,
    #[n(4)]
    pub status: ClaimStatus,
    #[n(5)]
    pub rejection_reason: Option<String>,
    #[n(6)]
    pub reviewed_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub reviewed_by: Option<Address>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

impl ClaimRequest {
    pub fn new(
        id: String,
        subject_address: Address,
        issuer_address: Address,
        claim_topic: ClaimTopic,
        created_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id,
            subject_address,
            issuer_address,
            claim_topic,
            status: ClaimStatus::Pending,
            rejection_reason: None,
            reviewed_at: None,
            reviewed_by: None,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ClaimStatus::Pending
    }
}

impl Record for ClaimRequest {
    const KIND: RecordKind = RecordKind::ClaimRequest;

    fn key(&self) -> &str {
        &self.id
    }
}

impl Reviewable for ClaimRequest {
    type Decision = ClaimDecision;
    const PENDING_INDEX: RecordKind = RecordKind::PendingClaimIndex;

    // one pending request per subject asking the same issuer for the same topic
    fn pending_slot(&self) -> String {
        format!("{}/{}/{}", self.subject_address, self.issuer_address, self.claim_topic)
    }

    fn is_pending(&self) -> bool {
        ClaimRequest::is_pending(self)
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }

    fn authorize(&self, acting: &Address, _config: &EngineConfig) -> WorkflowResult<()> {
        auth::authorize(&self.issuer_address, acting, Role::ClaimIssuer)
    }

    fn apply_decision(&mut self, decision: &ClaimDecision, reviewer: &Address, at: &TimeStamp<Utc>) {
        match decision {
            ClaimDecision::Approve => {
                self.status = ClaimStatus::Approved;
                self.rejection_reason = None;
            }
            ClaimDecision::Reject { reason } => {
                self.status = ClaimStatus::Rejected;
                self.rejection_reason = reason.clone();
            }
        }
        self.reviewed_at = Some(at.clone());
        self.reviewed_by = Some(reviewer.clone());
    }
}
