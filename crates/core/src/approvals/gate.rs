use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rules::{self, Denial};
use super::{bounded, DEFAULT_READ_TIMEOUT};
use crate::directory::{DirectoryError, OrgDirectory};
use crate::domain::org::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
    pub denial: Option<Denial>,
}

impl GateDecision {
    fn allow(approver_id: &UserId, requester_id: &UserId) -> Self {
        Self {
            allowed: true,
            reason: format!("approver `{approver_id}` may decide requests from `{requester_id}`"),
            denial: None,
        }
    }

    fn deny(denial: Denial) -> Self {
        Self { allowed: false, reason: denial.reason(), denial: Some(denial) }
    }
}

/// Enforcement check run right before an approve/reject decision is committed.
///
/// Every call re-reads the directory. Read failures and timeouts deny.
#[derive(Clone, Debug)]
pub struct AuthorizationGate<D> {
    directory: D,
    read_timeout: Duration,
}

impl<D> AuthorizationGate<D>
where
    D: OrgDirectory,
{
    pub fn new(directory: D) -> Self {
        Self { directory, read_timeout: DEFAULT_READ_TIMEOUT }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub async fn can_approve(&self, approver_id: &UserId, requester_id: &UserId) -> bool {
        self.evaluate(approver_id, requester_id).await.allowed
    }

    pub async fn evaluate(&self, approver_id: &UserId, requester_id: &UserId) -> GateDecision {
        match self.check(approver_id, requester_id).await {
            Ok(Ok(())) => {
                debug!(
                    event_name = "approvals.gate.allowed",
                    approver_id = %approver_id,
                    requester_id = %requester_id,
                    "approval gate passed"
                );
                GateDecision::allow(approver_id, requester_id)
            }
            Ok(Err(denial)) => {
                debug!(
                    event_name = "approvals.gate.denied",
                    approver_id = %approver_id,
                    requester_id = %requester_id,
                    reason = %denial.reason(),
                    "approval gate denied"
                );
                GateDecision::deny(denial)
            }
            Err(error) => {
                warn!(
                    event_name = "approvals.gate.read_failed",
                    approver_id = %approver_id,
                    requester_id = %requester_id,
                    error = %error,
                    "approval gate could not read directory, denying"
                );
                GateDecision::deny(Denial::DirectoryUnavailable { detail: error.to_string() })
            }
        }
    }

    async fn check(
        &self,
        approver_id: &UserId,
        requester_id: &UserId,
    ) -> Result<Result<(), Denial>, DirectoryError> {
        let (approver, requester) = tokio::try_join!(
            bounded(self.read_timeout, self.directory.get_user(approver_id)),
            bounded(self.read_timeout, self.directory.get_user(requester_id)),
        )?;

        if let Err(denial) = rules::check_roles(requester.global_role, approver.global_role) {
            return Ok(Err(denial));
        }

        let team_ids =
            bounded(self.read_timeout, self.directory.team_ids_for_user(requester_id)).await?;
        if team_ids.is_empty() {
            return Ok(rules::check_team_scope(false, false));
        }

        // Keyed on the approver with no requester exclusion; self-requests follow the same rules.
        let led_team_ids =
            bounded(self.read_timeout, self.directory.teamlead_team_ids(approver_id)).await?;
        let leads_shared_team = team_ids.iter().any(|team_id| led_team_ids.contains(team_id));

        Ok(rules::evaluate(&rules::EligibilityFacts {
            requester_role: requester.global_role,
            approver_role: approver.global_role,
            requester_has_team: true,
            approver_leads_shared_team: leads_shared_team,
        }))
    }
}
