//! Off-chain review workflow for compliance actions and reconciliation of the
//! on-chain transactions that execute them.
//!
//! - [`workflow`] owns the claim and trusted issuer request state machines.
//! - [`ledger`] records every on-chain action attempt as a `pending` transaction.
//! - [`reconcile`] applies the chain watcher's status reports to the ledger.
//! - [`service`] is the facade the API layer talks to.

pub mod address;
pub mod auth;
pub mod claim;
pub mod clock;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod issuer;
pub mod ledger;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod transaction;
pub mod types;
pub mod utils;
pub mod workflow;

pub use error::{Conflict, WorkflowError, WorkflowResult};
pub use service::{ComplianceService, DecisionReceipt, LedgerOutcome};
