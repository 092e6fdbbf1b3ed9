//! Workflow engine: submission and the single reviewer decision
//!
//! Both request kinds share one state machine shape, `pending` to
//! `approved | rejected`, captured by [`Reviewable`]. The decision is written
//! through [`RecordStoreExt::conditional_update`] with "still pending" as the
//! expectation, so of any number of concurrent deciders exactly one wins and
//! the rest observe the status it reached.
//!
//! Submissions claim a slot in a pending index tree before the request is
//! written, so a duplicate pending request is found by key instead of a scan.
use std::cmp::Ordering;

use chrono::Utc;

use crate::address::Address;
use crate::claim::{ClaimRequest, ClaimStatus};
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::decision::{ClaimDecision, IssuerDecision};
use crate::error::{Conflict, WorkflowError, WorkflowResult};
use crate::issuer::{IssuerRequestStatus, NewTrustedIssuerRequest, TrustedIssuerRequest};
use crate::store::{CasOutcome, Record, RecordKind, RecordStore, RecordStoreExt};
use crate::types::{ClaimTopic, TimeStamp};
use crate::utils::{self, CLAIM_REQUEST_HRP, ISSUER_REQUEST_HRP};

/// A request that is decided once by an authorized reviewer.
pub trait Reviewable: Record {
    type Decision;
    /// Index tree keeping at most one pending request per [`Reviewable::pending_slot`].
    const PENDING_INDEX: RecordKind;

    fn pending_slot(&self) -> String;
    fn is_pending(&self) -> bool;
    fn status_label(&self) -> &'static str;
    fn created_at(&self) -> &TimeStamp<Utc>;
    fn authorize(&self, acting: &Address, config: &EngineConfig) -> WorkflowResult<()>;
    fn apply_decision(&mut self, decision: &Self::Decision, reviewer: &Address, at: &TimeStamp<Utc>);
}

/// Filter for [`WorkflowEngine::list_claim_requests`]. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct ClaimRequestFilter {
    pub subject_address: Option<String>,
    pub issuer_address: Option<String>,
    pub status: Option<ClaimStatus>,
}

fn newest_first<R: Reviewable>(a: &R, b: &R) -> Ordering {
    b.created_at()
        .cmp(a.created_at())
        .then_with(|| b.key().cmp(a.key()))
}

pub struct WorkflowEngine<S: RecordStore> {
    ctx: EngineContext<S>,
}

impl<S: RecordStore> WorkflowEngine<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Submit a new claim request, `pending` until the named issuer decides it
    pub fn submit_claim_request(
        &self,
        subject_address: &str,
        issuer_address: &str,
        claim_topic: ClaimTopic,
    ) -> WorkflowResult<ClaimRequest> {
        let subject = self.ctx.address(subject_address)?;
        let issuer = self.ctx.address(issuer_address)?;

        let id = utils::new_uuid_to_bech32(CLAIM_REQUEST_HRP)?;
        let request = ClaimRequest::new(id, subject, issuer, claim_topic, self.ctx.clock.now());
        self.insert_request(&request)?;

        tracing::info!(
            id = %request.id,
            subject = %request.subject_address,
            issuer = %request.issuer_address,
            topic = request.claim_topic,
            "claim request submitted"
        );
        Ok(request)
    }

    pub fn decide_claim_request(
        &self,
        request_id: &str,
        decision: ClaimDecision,
        acting_address: &str,
    ) -> WorkflowResult<ClaimRequest> {
        let action = decision.action();
        let request = self.decide::<ClaimRequest>(request_id, &decision, acting_address)?;
        tracing::info!(id = %request.id, %action, status = %request.status, "claim request decided");
        Ok(request)
    }

    /// Move an approved claim request to `completed` once its claim-add
    /// transaction has confirmed on chain.
    pub fn complete_claim_request(&self, request_id: &str) -> WorkflowResult<ClaimRequest> {
        let outcome = self.ctx.store.conditional_update::<ClaimRequest>(
            request_id,
            |r| r.status == ClaimStatus::Approved,
            |r| r.status = ClaimStatus::Completed,
        )?;

        match outcome {
            CasOutcome::Applied(request) => {
                tracing::info!(id = %request.id, "claim request completed");
                Ok(request)
            }
            CasOutcome::Unmatched(request) if request.status == ClaimStatus::Completed => {
                Err(WorkflowError::Conflict(Conflict::AlreadyDecided {
                    status: request.status.as_str(),
                }))
            }
            CasOutcome::Unmatched(request) => {
                Err(WorkflowError::Conflict(Conflict::IllegalTransition {
                    from: request.status.as_str(),
                    to: ClaimStatus::Completed.as_str(),
                }))
            }
            CasOutcome::Missing => Err(WorkflowError::not_found(ClaimRequest::KIND, request_id)),
        }
    }

    pub fn get_claim_request(&self, request_id: &str) -> WorkflowResult<ClaimRequest> {
        self.load(request_id)
    }

    pub fn list_claim_requests(
        &self,
        filter: &ClaimRequestFilter,
        limit: Option<usize>,
    ) -> WorkflowResult<Vec<ClaimRequest>> {
        let subject = filter
            .subject_address
            .as_deref()
            .map(|a| self.ctx.address(a))
            .transpose()?;
        let issuer = filter
            .issuer_address
            .as_deref()
            .map(|a| self.ctx.address(a))
            .transpose()?;

        let requests = self.ctx.store.find(
            |r: &ClaimRequest| {
                subject.as_ref().is_none_or(|s| r.subject_address == *s)
                    && issuer.as_ref().is_none_or(|i| r.issuer_address == *i)
                    && filter.status.is_none_or(|s| r.status == s)
            },
            newest_first::<ClaimRequest>,
            self.ctx.config.query_limit(limit),
        )?;
        Ok(requests)
    }

    /// Submit an organisation's request to become a trusted issuer
    pub fn submit_trusted_issuer_request(
        &self,
        submission: NewTrustedIssuerRequest,
    ) -> WorkflowResult<TrustedIssuerRequest> {
        let application = submission.validate(self.ctx.validator.as_ref())?;

        let id = utils::new_uuid_to_bech32(ISSUER_REQUEST_HRP)?;
        let request = TrustedIssuerRequest::new(id, application, self.ctx.clock.now());
        self.insert_request(&request)?;

        tracing::info!(
            id = %request.id,
            requester = %request.requester_address,
            organization = %request.organization_name,
            "trusted issuer request submitted"
        );
        Ok(request)
    }

    pub fn decide_trusted_issuer_request(
        &self,
        request_id: &str,
        decision: IssuerDecision,
        acting_address: &str,
    ) -> WorkflowResult<TrustedIssuerRequest> {
        let action = decision.action();
        let request = self.decide::<TrustedIssuerRequest>(request_id, &decision, acting_address)?;
        tracing::info!(id = %request.id, %action, status = %request.status, "trusted issuer request decided");
        Ok(request)
    }

    pub fn get_trusted_issuer_request(&self, request_id: &str) -> WorkflowResult<TrustedIssuerRequest> {
        self.load(request_id)
    }

    pub fn list_trusted_issuer_requests(
        &self,
        status: Option<IssuerRequestStatus>,
        limit: Option<usize>,
    ) -> WorkflowResult<Vec<TrustedIssuerRequest>> {
        let requests = self.ctx.store.find(
            |r: &TrustedIssuerRequest| status.is_none_or(|s| r.status == s),
            newest_first::<TrustedIssuerRequest>,
            self.ctx.config.query_limit(limit),
        )?;
        Ok(requests)
    }

    /// Load, authorize, then write the decision only if the request is still
    /// pending at write time.
    fn decide<R: Reviewable>(
        &self,
        request_id: &str,
        decision: &R::Decision,
        acting_address: &str,
    ) -> WorkflowResult<R> {
        let acting = self.ctx.address(acting_address)?;
        let current: R = self.load(request_id)?;

        current.authorize(&acting, &self.ctx.config)?;

        if !current.is_pending() {
            return Err(already_decided(&current));
        }

        let at = self.ctx.clock.now();
        let outcome = self.ctx.store.conditional_update::<R>(
            request_id,
            |r| r.is_pending(),
            |r| r.apply_decision(decision, &acting, &at),
        )?;

        match outcome {
            CasOutcome::Applied(updated) => Ok(updated),
            CasOutcome::Unmatched(stored) => {
                tracing::debug!(kind = %R::KIND, id = request_id, status = stored.status_label(), "lost decision race");
                Err(already_decided(&stored))
            }
            CasOutcome::Missing => Err(WorkflowError::not_found(R::KIND, request_id)),
        }
    }

    fn load<R: Record>(&self, request_id: &str) -> WorkflowResult<R> {
        self.ctx
            .store
            .find_by_id::<R>(request_id)?
            .ok_or_else(|| WorkflowError::not_found(R::KIND, request_id))
    }

    /// Claim the request's pending slot, then write it. A slot still held by a
    /// pending request is a duplicate submission.
    fn insert_request<R: Reviewable>(&self, request: &R) -> WorkflowResult<()> {
        let store = &self.ctx.store;
        let holder = store.claim_slot(
            R::PENDING_INDEX,
            &request.pending_slot(),
            request.key(),
            |holder| Ok(store.find_by_id::<R>(holder)?.is_some_and(|r| r.is_pending())),
        )?;
        if let Some(id) = holder {
            tracing::debug!(kind = %R::KIND, %id, "pending request already exists");
            return Err(WorkflowError::Conflict(Conflict::DuplicatePendingRequest { id }));
        }

        if !store.insert(request)? {
            // uuid7 ids do not collide in practice
            return Err(WorkflowError::Conflict(Conflict::DuplicatePendingRequest {
                id: request.key().to_owned(),
            }));
        }
        Ok(())
    }
}

fn already_decided<R: Reviewable>(request: &R) -> WorkflowError {
    WorkflowError::Conflict(Conflict::AlreadyDecided {
        status: request.status_label(),
    })
}
