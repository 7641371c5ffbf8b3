//! Read-side collaborators of the approval engine.
//!
//! [`OrgDirectory`] exposes users, team memberships and role rosters;
//! [`AvailabilityOracle`] answers whether someone is on approved leave today.
//! Both are consumed read-only and re-queried on every engine call.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::leave::LeaveRequest;
use crate::domain::org::{
    GlobalRole, PriorityTag, TeamId, TeamMembership, TeamRole, TeamleadMembership, User, UserId,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user `{0}` not found")]
    UserNotFound(UserId),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    #[error("directory read timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait OrgDirectory: Send + Sync {
    async fn get_user(&self, user_id: &UserId) -> Result<User, DirectoryError>;

    async fn team_ids_for_user(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError>;

    /// Teamlead memberships of the given teams, ordered by team then user, without
    /// any membership belonging to `exclude_user_id`.
    async fn teamlead_memberships(
        &self,
        team_ids: &[TeamId],
        exclude_user_id: &UserId,
    ) -> Result<Vec<TeamleadMembership>, DirectoryError>;

    /// Teams in which `user_id` holds a teamlead membership, ordered by team id.
    async fn teamlead_team_ids(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError>;

    /// Users holding `role`, ordered by user id.
    async fn users_by_role(&self, role: GlobalRole) -> Result<Vec<User>, DirectoryError>;
}

#[async_trait]
pub trait AvailabilityOracle: Send + Sync {
    async fn is_absent_today(&self, user_id: &UserId) -> Result<bool, DirectoryError>;

    async fn absent_today(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, bool>, DirectoryError> {
        let mut absences = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            let absent = self.is_absent_today(user_id).await?;
            absences.insert(user_id.clone(), absent);
        }
        Ok(absences)
    }
}

#[async_trait]
impl<T> OrgDirectory for Arc<T>
where
    T: OrgDirectory + ?Sized,
{
    async fn get_user(&self, user_id: &UserId) -> Result<User, DirectoryError> {
        (**self).get_user(user_id).await
    }

    async fn team_ids_for_user(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError> {
        (**self).team_ids_for_user(user_id).await
    }

    async fn teamlead_memberships(
        &self,
        team_ids: &[TeamId],
        exclude_user_id: &UserId,
    ) -> Result<Vec<TeamleadMembership>, DirectoryError> {
        (**self).teamlead_memberships(team_ids, exclude_user_id).await
    }

    async fn teamlead_team_ids(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError> {
        (**self).teamlead_team_ids(user_id).await
    }

    async fn users_by_role(&self, role: GlobalRole) -> Result<Vec<User>, DirectoryError> {
        (**self).users_by_role(role).await
    }
}

#[async_trait]
impl<T> AvailabilityOracle for Arc<T>
where
    T: AvailabilityOracle + ?Sized,
{
    async fn is_absent_today(&self, user_id: &UserId) -> Result<bool, DirectoryError> {
        (**self).is_absent_today(user_id).await
    }

    async fn absent_today(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, bool>, DirectoryError> {
        (**self).absent_today(user_ids).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectoryRead {
    User,
    TeamIds,
    TeamleadMemberships,
    UsersByRole,
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: BTreeMap<UserId, User>,
    memberships: Vec<TeamMembership>,
    failing_reads: HashSet<DirectoryRead>,
}

/// Mutable in-process directory, used by tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryOrgDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryOrgDirectory {
    pub fn with_user(self, user_id: &str, global_role: GlobalRole) -> Self {
        self.upsert_user(User {
            id: UserId(user_id.to_owned()),
            display_name: user_id.to_owned(),
            global_role,
        });
        self
    }

    pub fn with_member(self, team_id: &str, user_id: &str) -> Self {
        self.upsert_membership(TeamMembership {
            team_id: TeamId(team_id.to_owned()),
            user_id: UserId(user_id.to_owned()),
            team_role: TeamRole::Member,
            priority_tag: PriorityTag::None,
        });
        self
    }

    pub fn with_teamlead(self, team_id: &str, user_id: &str, priority_tag: PriorityTag) -> Self {
        self.upsert_membership(TeamMembership {
            team_id: TeamId(team_id.to_owned()),
            user_id: UserId(user_id.to_owned()),
            team_role: TeamRole::Teamlead,
            priority_tag,
        });
        self
    }

    /// Every subsequent `read` fails with [`DirectoryError::Unavailable`].
    pub fn failing_on(self, read: DirectoryRead) -> Self {
        self.write().failing_reads.insert(read);
        self
    }

    pub fn upsert_user(&self, user: User) {
        self.write().users.insert(user.id.clone(), user);
    }

    pub fn upsert_membership(&self, membership: TeamMembership) {
        let mut state = self.write();
        state.memberships.retain(|existing| {
            existing.team_id != membership.team_id || existing.user_id != membership.user_id
        });
        state.memberships.push(membership);
    }

    pub fn remove_membership(&self, team_id: &TeamId, user_id: &UserId) {
        self.write()
            .memberships
            .retain(|existing| &existing.team_id != team_id || &existing.user_id != user_id);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DirectoryState> {
        match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DirectoryState> {
        match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check(state: &DirectoryState, read: DirectoryRead) -> Result<(), DirectoryError> {
        if state.failing_reads.contains(&read) {
            return Err(DirectoryError::Unavailable(format!("injected failure on {read:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl OrgDirectory for InMemoryOrgDirectory {
    async fn get_user(&self, user_id: &UserId) -> Result<User, DirectoryError> {
        let state = self.read();
        Self::check(&state, DirectoryRead::User)?;
        state.users.get(user_id).cloned().ok_or_else(|| DirectoryError::UserNotFound(user_id.clone()))
    }

    async fn team_ids_for_user(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError> {
        let state = self.read();
        Self::check(&state, DirectoryRead::TeamIds)?;
        let team_ids: BTreeSet<TeamId> = state
            .memberships
            .iter()
            .filter(|membership| &membership.user_id == user_id)
            .map(|membership| membership.team_id.clone())
            .collect();
        Ok(team_ids.into_iter().collect())
    }

    async fn teamlead_memberships(
        &self,
        team_ids: &[TeamId],
        exclude_user_id: &UserId,
    ) -> Result<Vec<TeamleadMembership>, DirectoryError> {
        let state = self.read();
        Self::check(&state, DirectoryRead::TeamleadMemberships)?;

        let mut leads = Vec::new();
        for membership in &state.memberships {
            if membership.team_role != TeamRole::Teamlead
                || &membership.user_id == exclude_user_id
                || !team_ids.contains(&membership.team_id)
            {
                continue;
            }
            let Some(user) = state.users.get(&membership.user_id) else {
                continue;
            };
            leads.push(TeamleadMembership {
                user_id: membership.user_id.clone(),
                team_id: membership.team_id.clone(),
                team_role: membership.team_role,
                priority_tag: membership.priority_tag,
                global_role: user.global_role,
            });
        }
        leads.sort_by(|left, right| {
            left.team_id.cmp(&right.team_id).then_with(|| left.user_id.cmp(&right.user_id))
        });
        Ok(leads)
    }

    async fn teamlead_team_ids(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError> {
        let state = self.read();
        Self::check(&state, DirectoryRead::TeamleadMemberships)?;
        let team_ids: BTreeSet<TeamId> = state
            .memberships
            .iter()
            .filter(|membership| {
                &membership.user_id == user_id && membership.team_role == TeamRole::Teamlead
            })
            .map(|membership| membership.team_id.clone())
            .collect();
        Ok(team_ids.into_iter().collect())
    }

    async fn users_by_role(&self, role: GlobalRole) -> Result<Vec<User>, DirectoryError> {
        let state = self.read();
        Self::check(&state, DirectoryRead::UsersByRole)?;
        Ok(state.users.values().filter(|user| user.global_role == role).cloned().collect())
    }
}

/// Availability backed by a fixed set of absent users.
#[derive(Debug, Default)]
pub struct InMemoryAvailabilityOracle {
    absent_user_ids: HashSet<UserId>,
    failing: bool,
    reads: AtomicUsize,
}

impl InMemoryAvailabilityOracle {
    pub fn with_absent_users(absent_user_ids: &[&str]) -> Self {
        Self {
            absent_user_ids: absent_user_ids.iter().map(|id| UserId((*id).to_owned())).collect(),
            ..Self::default()
        }
    }

    pub fn from_leave_requests(requests: &[LeaveRequest], today: NaiveDate) -> Self {
        Self {
            absent_user_ids: requests
                .iter()
                .filter(|request| request.marks_absent_on(today))
                .map(|request| request.requester_id.clone())
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    /// Number of per-user lookups served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AvailabilityOracle for InMemoryAvailabilityOracle {
    async fn is_absent_today(&self, user_id: &UserId) -> Result<bool, DirectoryError> {
        if self.failing {
            return Err(DirectoryError::Unavailable("availability backend offline".to_owned()));
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.absent_user_ids.contains(user_id))
    }
}
