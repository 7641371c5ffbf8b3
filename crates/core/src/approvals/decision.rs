use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::gate::AuthorizationGate;
use super::rules::Denial;
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::directory::OrgDirectory;
use crate::domain::leave::{DecisionAction, LeaveRequest, LeaveRequestId, LeaveStatus};
use crate::domain::org::UserId;
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("leave request store unavailable: {0}")]
    Unavailable(String),
}

/// Write side for leave request decisions.
#[async_trait]
pub trait LeaveRequestStore: Send + Sync {
    async fn find_by_id(&self, id: &LeaveRequestId) -> Result<Option<LeaveRequest>, StoreError>;

    /// Atomically moves the request from `expected` to `next`. Returns `false`
    /// without writing when the stored status is no longer `expected`.
    async fn compare_and_set_status(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decided_by: &UserId,
        decided_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T> LeaveRequestStore for Arc<T>
where
    T: LeaveRequestStore + ?Sized,
{
    async fn find_by_id(&self, id: &LeaveRequestId) -> Result<Option<LeaveRequest>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn compare_and_set_status(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decided_by: &UserId,
        decided_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_set_status(id, expected, next, decided_by, decided_at).await
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("leave request `{0}` not found")]
    NotFound(LeaveRequestId),
    #[error("leave request `{id}` was already {status}")]
    AlreadyDecided { id: LeaveRequestId, status: LeaveStatus },
    #[error("approver `{approver_id}` may not decide this request: {}", .denial.reason())]
    NotAuthorized { approver_id: UserId, denial: Denial },
    #[error("leave request `{0}` changed while the decision was being committed")]
    Conflict(LeaveRequestId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DecisionError> for ApplicationError {
    fn from(value: DecisionError) -> Self {
        match value {
            DecisionError::NotFound(id) => ApplicationError::Domain(DomainError::InvariantViolation(
                format!("leave request `{id}` not found"),
            )),
            DecisionError::AlreadyDecided { id, status } => ApplicationError::Domain(
                DomainError::InvariantViolation(format!("leave request `{id}` was already {status}")),
            ),
            DecisionError::NotAuthorized { denial, .. } => {
                ApplicationError::Forbidden(denial.reason())
            }
            DecisionError::Conflict(id) => ApplicationError::Persistence(format!(
                "leave request `{id}` was modified concurrently"
            )),
            DecisionError::Store(error) => ApplicationError::Persistence(error.to_string()),
        }
    }
}

/// Commits approve/reject decisions behind the authorization gate.
pub struct DecisionService<D, S> {
    gate: AuthorizationGate<D>,
    store: S,
    audit: Arc<dyn AuditSink>,
}

impl<D, S> DecisionService<D, S>
where
    D: OrgDirectory,
    S: LeaveRequestStore,
{
    pub fn new(gate: AuthorizationGate<D>, store: S, audit: Arc<dyn AuditSink>) -> Self {
        Self { gate, store, audit }
    }

    pub async fn decide(
        &self,
        request_id: &LeaveRequestId,
        approver_id: &UserId,
        action: DecisionAction,
        correlation_id: &str,
    ) -> Result<LeaveRequest, DecisionError> {
        let request = self
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| DecisionError::NotFound(request_id.clone()))?;

        let next = request.transition(action).map_err(|_| DecisionError::AlreadyDecided {
            id: request.id.clone(),
            status: request.status,
        })?;

        let decision = self.gate.evaluate(approver_id, &request.requester_id).await;
        if let Some(denial) = decision.denial {
            warn!(
                event_name = "approvals.decision.denied",
                correlation_id,
                leave_request_id = %request.id,
                approver_id = %approver_id,
                reason = %decision.reason,
                "leave decision blocked by authorization gate"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(request.id.clone()),
                    correlation_id,
                    "leave.decision_denied",
                    AuditCategory::Authorization,
                    approver_id.0.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("requester_id", request.requester_id.0.clone())
                .with_metadata("reason", decision.reason),
            );
            return Err(DecisionError::NotAuthorized { approver_id: approver_id.clone(), denial });
        }

        let decided_at = Utc::now();
        let write = self
            .store
            .compare_and_set_status(&request.id, LeaveStatus::Pending, next, approver_id, decided_at)
            .await;
        let failure = match write {
            Ok(true) => None,
            Ok(false) => Some(DecisionError::Conflict(request.id.clone())),
            Err(error) => Some(DecisionError::Store(error)),
        };
        if let Some(error) = failure {
            warn!(
                event_name = "approvals.decision.write_failed",
                correlation_id,
                leave_request_id = %request.id,
                approver_id = %approver_id,
                error = %error,
                "leave decision was not written"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(request.id.clone()),
                    correlation_id,
                    "leave.decision_failed",
                    AuditCategory::Persistence,
                    approver_id.0.clone(),
                    AuditOutcome::Failed,
                )
                .with_metadata("requester_id", request.requester_id.0.clone())
                .with_metadata("to", next.as_str())
                .with_metadata("reason", error.to_string()),
            );
            return Err(error);
        }

        let event_type = match action {
            DecisionAction::Approve => "leave.approved",
            DecisionAction::Reject => "leave.rejected",
        };
        info!(
            event_name = "approvals.decision.committed",
            correlation_id,
            leave_request_id = %request.id,
            approver_id = %approver_id,
            status = %next,
            "leave decision committed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                event_type,
                AuditCategory::Approval,
                approver_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("requester_id", request.requester_id.0.clone())
            .with_metadata("from", LeaveStatus::Pending.as_str())
            .with_metadata("to", next.as_str()),
        );

        Ok(LeaveRequest {
            status: next,
            decided_by: Some(approver_id.clone()),
            updated_at: decided_at,
            ..request
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLeaveRequestStore {
    requests: Mutex<HashMap<LeaveRequestId, LeaveRequest>>,
}

impl InMemoryLeaveRequestStore {
    pub fn with_requests(requests: Vec<LeaveRequest>) -> Self {
        Self {
            requests: Mutex::new(
                requests.into_iter().map(|request| (request.id.clone(), request)).collect(),
            ),
        }
    }

    pub fn get(&self, id: &LeaveRequestId) -> Option<LeaveRequest> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<LeaveRequestId, LeaveRequest>> {
        match self.requests.lock() {
            Ok(requests) => requests,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl LeaveRequestStore for InMemoryLeaveRequestStore {
    async fn find_by_id(&self, id: &LeaveRequestId) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.get(id))
    }

    async fn compare_and_set_status(
        &self,
        id: &LeaveRequestId,
        expected: LeaveStatus,
        next: LeaveStatus,
        decided_by: &UserId,
        decided_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut requests = self.lock();
        match requests.get_mut(id) {
            Some(request) if request.status == expected => {
                request.status = next;
                request.decided_by = Some(decided_by.clone());
                request.updated_at = decided_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
