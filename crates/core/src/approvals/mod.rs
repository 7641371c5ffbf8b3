//! Leave-request approver resolution and authorization.
//!
//! [`ApproverResolver`] answers "who should decide this request" for display and
//! routing. [`AuthorizationGate`] answers "may this user decide it" and is the only
//! check that protects a decision. Both derive eligibility from [`rules`].

pub mod decision;
pub mod gate;
pub mod resolver;
pub mod rules;

use std::future::Future;
use std::time::Duration;

pub use decision::{
    DecisionError, DecisionService, InMemoryLeaveRequestStore, LeaveRequestStore, StoreError,
};
pub use gate::{AuthorizationGate, GateDecision};
pub use resolver::{ApproverCandidate, ApproverResolver, Resolution, SUPERADMIN_REQUIRED_REASON};
pub use rules::{Denial, EligibilityFacts};

use crate::config::ApprovalsConfig;
use crate::directory::{AvailabilityOracle, DirectoryError, OrgDirectory};
use crate::domain::org::UserId;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2_000);

pub(crate) async fn bounded<T, F>(deadline: Duration, read: F) -> Result<T, DirectoryError>
where
    F: Future<Output = Result<T, DirectoryError>>,
{
    match tokio::time::timeout(deadline, read).await {
        Ok(result) => result,
        Err(_) => Err(DirectoryError::Timeout(deadline)),
    }
}

/// Resolver and gate wired to the same directory snapshot source.
#[derive(Clone, Debug)]
pub struct ApprovalEngine<D, A> {
    resolver: ApproverResolver<D, A>,
    gate: AuthorizationGate<D>,
}

impl<D, A> ApprovalEngine<D, A>
where
    D: OrgDirectory + Clone,
    A: AvailabilityOracle,
{
    pub fn new(directory: D, availability: A, config: &ApprovalsConfig) -> Self {
        let read_timeout = config.read_timeout();
        Self {
            resolver: ApproverResolver::new(directory.clone(), availability)
                .with_read_timeout(read_timeout),
            gate: AuthorizationGate::new(directory).with_read_timeout(read_timeout),
        }
    }

    pub async fn resolve(&self, requester_id: &UserId) -> Resolution {
        self.resolver.resolve(requester_id).await
    }

    pub async fn can_approve(&self, approver_id: &UserId, requester_id: &UserId) -> bool {
        self.gate.can_approve(approver_id, requester_id).await
    }

    pub async fn evaluate(&self, approver_id: &UserId, requester_id: &UserId) -> GateDecision {
        self.gate.evaluate(approver_id, requester_id).await
    }

    pub fn gate(&self) -> &AuthorizationGate<D> {
        &self.gate
    }
}
