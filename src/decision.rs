//! Typed decision payloads
//!
//! The boundary hands over an action string and a loose payload; both are
//! turned into a closed per-entity decision here, before the engine sees them.
use std::fmt;
use std::str::FromStr;

use crate::address::{Address, AddressValidator};
use crate::error::{WorkflowError, WorkflowResult};
use crate::types::TxHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl FromStr for DecisionAction {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(DecisionAction::Approve),
            "reject" => Ok(DecisionAction::Reject),
            other => Err(WorkflowError::invalid(format!(
                "unknown decision '{other}', expected approve or reject"
            ))),
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecisionAction::Approve => "approve",
            DecisionAction::Reject => "reject",
        })
    }
}

/// Optional fields a caller may attach to a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionPayload {
    pub rejection_reason: Option<String>,
    pub tx_hash: Option<String>,
    pub issuer_contract_address: Option<String>,
}

impl DecisionPayload {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_rejection_reason(mut self, reason: impl Into<String>) -> Self {
        self.rejection_reason = Some(reason.into());
        self
    }
    pub fn set_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }
    pub fn set_issuer_contract_address(mut self, address: impl Into<String>) -> Self {
        self.issuer_contract_address = Some(address.into());
        self
    }

    fn reason(&self) -> Option<String> {
        self.rejection_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_owned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    Approve,
    Reject { reason: Option<String> },
}

impl ClaimDecision {
    pub fn from_parts(action: DecisionAction, payload: &DecisionPayload) -> Self {
        match action {
            DecisionAction::Approve => ClaimDecision::Approve,
            DecisionAction::Reject => ClaimDecision::Reject {
                reason: payload.reason(),
            },
        }
    }

    pub fn action(&self) -> DecisionAction {
        match self {
            ClaimDecision::Approve => DecisionAction::Approve,
            ClaimDecision::Reject { .. } => DecisionAction::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerDecision {
    /// Approval always carries the deployed issuer contract and the
    /// transaction that registered it.
    Approve {
        tx_hash: TxHash,
        issuer_contract_address: Address,
    },
    Reject {
        reason: Option<String>,
    },
}

impl IssuerDecision {
    pub fn from_parts(
        action: DecisionAction,
        payload: &DecisionPayload,
        validator: &dyn AddressValidator,
    ) -> WorkflowResult<Self> {
        match action {
            DecisionAction::Approve => {
                let tx_hash = payload
                    .tx_hash
                    .as_deref()
                    .ok_or_else(|| WorkflowError::invalid("approval requires a transaction hash"))?;
                let contract = payload.issuer_contract_address.as_deref().ok_or_else(|| {
                    WorkflowError::invalid("approval requires the issuer contract address")
                })?;
                Ok(IssuerDecision::Approve {
                    tx_hash: TxHash::parse(tx_hash)?,
                    issuer_contract_address: Address::parse(contract, validator)?,
                })
            }
            DecisionAction::Reject => Ok(IssuerDecision::Reject {
                reason: payload.reason(),
            }),
        }
    }

    pub fn action(&self) -> DecisionAction {
        match self {
            IssuerDecision::Approve { .. } => DecisionAction::Approve,
            IssuerDecision::Reject { .. } => DecisionAction::Reject,
        }
    }
}
