//! Audit record of one on-chain action
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::address::Address;
use crate::error::WorkflowError;
use crate::store::{Record, RecordKind};
use crate::types::{TimeStamp, TxHash};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl FromStr for TxStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TxStatus::Pending),
            "confirmed" => Ok(TxStatus::Confirmed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(WorkflowError::invalid(format!(
                "unknown transaction status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of on-chain action a transaction performs.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub enum TxType {
    #[n(0)]
    IdentityRegistration,
    #[n(1)]
    IdentityClaimAdd,
    #[n(2)]
    IdentityClaimRemove,
    #[n(3)]
    TrustedIssuerApproval,
    #[n(4)]
    TokenPurchase,
    #[n(5)]
    TokenTransfer,
    #[n(6)]
    Other(#[n(0)] String),
}

impl TxType {
    pub fn as_str(&self) -> &str {
        match self {
            TxType::IdentityRegistration => "identity-registration",
            TxType::IdentityClaimAdd => "identity-claim-add",
            TxType::IdentityClaimRemove => "identity-claim-remove",
            TxType::TrustedIssuerApproval => "trusted-issuer-approval",
            TxType::TokenPurchase => "token-purchase",
            TxType::TokenTransfer => "token-transfer",
            TxType::Other(name) => name,
        }
    }
}

impl FromStr for TxType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Ok(match name.as_str() {
            "" => return Err(WorkflowError::invalid("transaction type is required")),
            "identity-registration" => TxType::IdentityRegistration,
            "identity-claim-add" => TxType::IdentityClaimAdd,
            "identity-claim-remove" => TxType::IdentityClaimRemove,
            "trusted-issuer-approval" => TxType::TrustedIssuerApproval,
            "token-purchase" => TxType::TokenPurchase,
            "token-transfer" => TxType::TokenTransfer,
            _ => TxType::Other(name),
        })
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action-specific payload. Opaque to the engine.
pub type Metadata = BTreeMap<String, String>;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    #[n(0)]
    pub tx_hash: TxHash,
    #[n(1)]
    pub from_address: Address,
    #[n(2)]
    pub contract_address: Address,
    #[n(3)]
    pub tx_type: TxType,
    #[n(4)]
    pub status: TxStatus,
    #[n(5)]
    pub metadata: Metadata,
    #[n(6)]
    pub block_number: Option<u64>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub updated_at: TimeStamp<Utc>,
}

impl Transaction {
    pub fn new(
        tx_hash: TxHash,
        from_address: Address,
        contract_address: Address,
        tx_type: TxType,
        metadata: Metadata,
        created_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            tx_hash,
            from_address,
            contract_address,
            tx_type,
            status: TxStatus::Pending,
            metadata,
            block_number: None,
            updated_at: created_at.clone(),
            created_at,
        }
    }
}

impl Record for Transaction {
    const KIND: RecordKind = RecordKind::Transaction;

    fn key(&self) -> &str {
        self.tx_hash.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_type_names_round_trip_through_strings() {
        for ty in [
            TxType::IdentityRegistration,
            TxType::IdentityClaimRemove,
            TxType::TrustedIssuerApproval,
            TxType::TokenPurchase,
        ] {
            assert_eq!(ty.as_str().parse::<TxType>().unwrap(), ty);
        }
        assert_eq!(
            "Vault-Deposit".parse::<TxType>().unwrap(),
            TxType::Other("vault-deposit".into())
        );
        assert!("  ".parse::<TxType>().is_err());
    }

    #[test]
    fn status_parsing() {
        assert_eq!("Confirmed".parse::<TxStatus>().unwrap(), TxStatus::Confirmed);
        assert!("mined".parse::<TxStatus>().is_err());
        assert!(TxStatus::Failed.is_terminal());
        assert!(!TxStatus::Pending.is_terminal());
    }
}
