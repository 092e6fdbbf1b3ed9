//! Authorization guard for request decisions
use std::fmt;

use crate::address::Address;
use crate::error::{WorkflowError, WorkflowResult};

/// The capacity in which an address is allowed to decide a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The issuer named on a claim request.
    ClaimIssuer,
    /// A configured reviewer of trusted issuer onboarding.
    TrustedIssuerReviewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::ClaimIssuer => "issuer assigned to the claim request",
            Role::TrustedIssuerReviewer => "trusted issuer reviewer",
        })
    }
}

/// Pure, case-insensitive comparison of the expected decider with the caller.
pub fn authorize(expected: &Address, acting: &Address, role: Role) -> WorkflowResult<()> {
    if expected.matches(acting.as_str()) {
        return Ok(());
    }
    tracing::warn!(%role, expected = %expected, acting = %acting, "authorization denied");
    Err(WorkflowError::Forbidden { role })
}

/// Same as [`authorize`] against a set of equally entitled addresses.
pub fn authorize_any(expected: &[Address], acting: &Address, role: Role) -> WorkflowResult<()> {
    if expected.iter().any(|candidate| candidate.matches(acting.as_str())) {
        return Ok(());
    }
    tracing::warn!(%role, acting = %acting, "authorization denied");
    Err(WorkflowError::Forbidden { role })
}
