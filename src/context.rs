//! Collaborators shared by the workflow engine, ledger and gateway
use std::sync::Arc;

use crate::address::{Address, AddressValidator, HexAddressValidator};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::WorkflowResult;
use crate::store::RecordStore;

pub struct EngineContext<S: RecordStore> {
    pub store: Arc<S>,
    pub config: Arc<EngineConfig>,
    pub clock: Arc<dyn Clock>,
    pub validator: Arc<dyn AddressValidator>,
}

// manual impl: derive would require `S: Clone`
impl<S: RecordStore> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            clock: Arc::clone(&self.clock),
            validator: Arc::clone(&self.validator),
        }
    }
}

impl<S: RecordStore> EngineContext<S> {
    /// System clock and hex address validation.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            validator: Arc::new(HexAddressValidator),
        }
    }
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
    pub fn with_validator(mut self, validator: Arc<dyn AddressValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn address(&self, raw: &str) -> WorkflowResult<Address> {
        Address::parse(raw, self.validator.as_ref())
    }
}
