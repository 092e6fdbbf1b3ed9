//! Account and contract addresses
//!
//! Every address that crosses the engine boundary is lower-cased before it is
//! stored or compared, so callers may pass checksummed or mixed case input.
use std::fmt;

use crate::error::{WorkflowError, WorkflowResult};

/// Syntactic address check, normally delegated to the chain library.
pub trait AddressValidator: Send + Sync {
    fn is_valid_address(&self, raw: &str) -> bool;
}

/// Accepts `0x` followed by 20 hex encoded bytes, in any case.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexAddressValidator;

impl AddressValidator for HexAddressValidator {
    fn is_valid_address(&self, raw: &str) -> bool {
        let Some(body) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) else {
            return false;
        };
        body.len() == 40 && hex::decode(body).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    /// Validate `raw` and normalise it to lower case.
    pub fn parse(raw: &str, validator: &dyn AddressValidator) -> WorkflowResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::invalid("address is required"));
        }
        if !validator.is_valid_address(trimmed) {
            return Err(WorkflowError::invalid(format!("'{raw}' is not a valid address")));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a raw address string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for Address {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Address {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        // stored values were normalised on the way in
        Ok(Address(d.str()?.to_owned()))
    }
}
