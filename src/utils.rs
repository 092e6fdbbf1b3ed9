//! Identifier and text helpers

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::{WorkflowError, WorkflowResult};

pub const CLAIM_REQUEST_HRP: &str = "claim_";
pub const ISSUER_REQUEST_HRP: &str = "issuer_";

// construct a unique, time ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> WorkflowResult<String> {
    let hrp = bech32::Hrp::parse(hrp)
        .map_err(|e| WorkflowError::invalid(format!("bad id prefix '{hrp}': {e}")))?;
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| WorkflowError::invalid(format!("failed to encode id: {e}")))
}

/// Trim `value` and reject it when nothing is left.
pub fn required_text(field: &str, value: &str) -> WorkflowResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}
