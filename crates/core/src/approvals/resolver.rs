use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rules::{self, EligibilityFacts};
use super::{bounded, DEFAULT_READ_TIMEOUT};
use crate::directory::{AvailabilityOracle, DirectoryError, OrgDirectory};
use crate::domain::org::{
    GlobalRole, PriorityTag, TeamId, TeamRole, TeamleadMembership, User, UserId,
};

pub const SUPERADMIN_REQUIRED_REASON: &str = "Superadmin (Required for HR/SUPERADMIN)";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverCandidate {
    pub user_id: UserId,
    pub global_role: GlobalRole,
    pub team_role: TeamRole,
    pub priority_tag: PriorityTag,
    /// Team through which the candidate leads the requester, if any.
    pub team_id: Option<TeamId>,
    pub available: bool,
    pub reason: String,
    /// Whether the authorization gate would currently let this candidate decide.
    pub can_act: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub primary: Option<ApproverCandidate>,
    pub coverage: Option<ApproverCandidate>,
    pub all: Vec<ApproverCandidate>,
}

impl Resolution {
    pub fn empty() -> Self {
        Self::default()
    }

    /// No one is responsible yet; the UI shows the request as awaiting assignment.
    pub fn is_awaiting_assignment(&self) -> bool {
        self.primary.is_none()
    }
}

/// Computes who is responsible for a requester's leave requests. Display only:
/// decisions must go through [`super::AuthorizationGate`].
#[derive(Clone, Debug)]
pub struct ApproverResolver<D, A> {
    directory: D,
    availability: A,
    read_timeout: Duration,
}

impl<D, A> ApproverResolver<D, A>
where
    D: OrgDirectory,
    A: AvailabilityOracle,
{
    pub fn new(directory: D, availability: A) -> Self {
        Self { directory, availability, read_timeout: DEFAULT_READ_TIMEOUT }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub async fn resolve(&self, requester_id: &UserId) -> Resolution {
        match self.try_resolve(requester_id).await {
            Ok(resolution) => {
                debug!(
                    event_name = "approvals.resolve.completed",
                    requester_id = %requester_id,
                    candidates = resolution.all.len(),
                    primary = ?resolution.primary.as_ref().map(|candidate| candidate.user_id.0.as_str()),
                    coverage = ?resolution.coverage.as_ref().map(|candidate| candidate.user_id.0.as_str()),
                    "approver resolution completed"
                );
                resolution
            }
            Err(error) => {
                warn!(
                    event_name = "approvals.resolve.degraded",
                    requester_id = %requester_id,
                    error = %error,
                    "approver resolution failed, returning empty result"
                );
                Resolution::empty()
            }
        }
    }

    async fn try_resolve(&self, requester_id: &UserId) -> Result<Resolution, DirectoryError> {
        let (requester, team_ids) = tokio::try_join!(
            bounded(self.read_timeout, self.directory.get_user(requester_id)),
            bounded(self.read_timeout, self.directory.team_ids_for_user(requester_id)),
        )?;
        if team_ids.is_empty() {
            return Ok(Resolution::empty());
        }

        if requester.global_role.is_privileged() {
            self.resolve_privileged(&requester, &team_ids).await
        } else {
            let teamleads = bounded(
                self.read_timeout,
                self.directory.teamlead_memberships(&team_ids, requester_id),
            )
            .await?;
            self.resolve_by_team(&requester, &team_ids, teamleads).await
        }
    }

    /// HR and superadmin requesters can only be decided by superadmins.
    ///
    /// Candidates keep directory order. Coverage is the second candidate in that
    /// order and is not re-ranked by availability.
    async fn resolve_privileged(
        &self,
        requester: &User,
        team_ids: &[TeamId],
    ) -> Result<Resolution, DirectoryError> {
        let superadmins: Vec<User> =
            bounded(self.read_timeout, self.directory.users_by_role(GlobalRole::Superadmin))
                .await?
                .into_iter()
                .filter(|user| user.id != requester.id)
                .collect();
        let absences = self.absences(superadmins.iter().map(|user| user.id.clone())).await?;

        // Only feeds the `can_act` projection; without it every candidate reads as unable to act.
        let teamleads = match bounded(
            self.read_timeout,
            self.directory.teamlead_memberships(team_ids, &requester.id),
        )
        .await
        {
            Ok(teamleads) => teamleads,
            Err(error) => {
                warn!(
                    event_name = "approvals.resolve.teamleads_unavailable",
                    requester_id = %requester.id,
                    error = %error,
                    "teamlead read failed, superadmin candidates listed without authority"
                );
                Vec::new()
            }
        };

        let all: Vec<ApproverCandidate> = superadmins
            .into_iter()
            .map(|user| {
                let lead = best_lead_for(&user.id, &teamleads);
                let leads_shared_team = rules::leads_shared_team(&user.id, team_ids, &teamleads);
                ApproverCandidate {
                    available: !is_absent(&absences, &user.id),
                    can_act: rules::evaluate(&EligibilityFacts {
                        requester_role: requester.global_role,
                        approver_role: user.global_role,
                        requester_has_team: true,
                        approver_leads_shared_team: leads_shared_team,
                    })
                    .is_ok(),
                    team_role: lead.map(|lead| lead.team_role).unwrap_or(TeamRole::Member),
                    priority_tag: lead.map(|lead| lead.priority_tag).unwrap_or_default(),
                    team_id: lead.map(|lead| lead.team_id.clone()),
                    reason: SUPERADMIN_REQUIRED_REASON.to_owned(),
                    global_role: user.global_role,
                    user_id: user.id,
                }
            })
            .collect();

        let primary =
            all.iter().find(|candidate| candidate.available).or_else(|| all.first()).cloned();
        let coverage = all.get(1).cloned();

        Ok(Resolution { primary, coverage, all })
    }

    async fn resolve_by_team(
        &self,
        requester: &User,
        team_ids: &[TeamId],
        teamleads: Vec<TeamleadMembership>,
    ) -> Result<Resolution, DirectoryError> {
        let leads = dedupe_leads(teamleads);
        let absences = self.absences(leads.iter().map(|lead| lead.user_id.clone())).await?;

        let mut all: Vec<ApproverCandidate> = leads
            .into_iter()
            .map(|lead| ApproverCandidate {
                available: !is_absent(&absences, &lead.user_id),
                can_act: rules::evaluate(&EligibilityFacts {
                    requester_role: requester.global_role,
                    approver_role: lead.global_role,
                    requester_has_team: true,
                    approver_leads_shared_team: team_ids.contains(&lead.team_id),
                })
                .is_ok(),
                reason: teamlead_reason(lead.priority_tag, lead.global_role).to_owned(),
                team_id: Some(lead.team_id),
                team_role: lead.team_role,
                priority_tag: lead.priority_tag,
                global_role: lead.global_role,
                user_id: lead.user_id,
            })
            .collect();
        all.sort_by(candidate_order);

        let available: Vec<&ApproverCandidate> =
            all.iter().filter(|candidate| candidate.available).collect();
        let pool: Vec<&ApproverCandidate> =
            if available.is_empty() { all.iter().collect() } else { available };

        let primary = pool.first().map(|candidate| (*candidate).clone());
        let coverage = primary.as_ref().and_then(|primary| {
            pool.iter()
                .find(|candidate| rules::covers_for(primary.global_role, candidate.global_role))
                .map(|candidate| (*candidate).clone())
        });

        Ok(Resolution { primary, coverage, all })
    }

    async fn absences(
        &self,
        user_ids: impl Iterator<Item = UserId>,
    ) -> Result<HashMap<UserId, bool>, DirectoryError> {
        let user_ids: Vec<UserId> = user_ids.collect();
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        bounded(self.read_timeout, self.availability.absent_today(&user_ids)).await
    }
}

/// Unknown availability counts as absent.
fn is_absent(absences: &HashMap<UserId, bool>, user_id: &UserId) -> bool {
    absences.get(user_id).copied().unwrap_or(true)
}

fn teamlead_reason(priority_tag: PriorityTag, global_role: GlobalRole) -> &'static str {
    match priority_tag {
        PriorityTag::Primary => "Primary Teamlead",
        PriorityTag::Backup => "Backup Teamlead",
        PriorityTag::BackupBackup => "Backup (Escalation)",
        PriorityTag::None => match global_role {
            GlobalRole::Hr => "HR (Teamlead)",
            GlobalRole::Superadmin => "Superadmin (Teamlead)",
            GlobalRole::Admin => "Admin (Teamlead)",
            GlobalRole::User | GlobalRole::Extern => "Primary Teamlead",
        },
    }
}

fn candidate_order(left: &ApproverCandidate, right: &ApproverCandidate) -> Ordering {
    left.priority_tag
        .rank()
        .cmp(&right.priority_tag.rank())
        .then_with(|| right.available.cmp(&left.available))
        .then_with(|| left.global_role.candidate_rank().cmp(&right.global_role.candidate_rank()))
        .then_with(|| left.user_id.cmp(&right.user_id))
}

/// One candidate per user: a lead of several requester teams keeps the
/// membership with the strongest tag.
fn dedupe_leads(teamleads: Vec<TeamleadMembership>) -> Vec<TeamleadMembership> {
    let mut by_user: BTreeMap<UserId, TeamleadMembership> = BTreeMap::new();
    for lead in teamleads {
        match by_user.get(&lead.user_id) {
            Some(existing) if !outranks(&lead, existing) => {}
            _ => {
                by_user.insert(lead.user_id.clone(), lead);
            }
        }
    }
    by_user.into_values().collect()
}

fn outranks(candidate: &TeamleadMembership, existing: &TeamleadMembership) -> bool {
    (candidate.priority_tag.rank(), &candidate.team_id)
        < (existing.priority_tag.rank(), &existing.team_id)
}

fn best_lead_for<'a>(
    user_id: &UserId,
    teamleads: &'a [TeamleadMembership],
) -> Option<&'a TeamleadMembership> {
    teamleads
        .iter()
        .filter(|lead| &lead.user_id == user_id)
        .min_by(|left, right| {
            left.priority_tag
                .rank()
                .cmp(&right.priority_tag.rank())
                .then_with(|| left.team_id.cmp(&right.team_id))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ApproverResolver, Resolution, SUPERADMIN_REQUIRED_REASON};
    use crate::directory::{DirectoryRead, InMemoryAvailabilityOracle, InMemoryOrgDirectory};
    use crate::domain::org::{GlobalRole, PriorityTag, TeamRole, UserId};

    fn id(raw: &str) -> UserId {
        UserId::from(raw)
    }

    fn resolver(
        directory: InMemoryOrgDirectory,
        absent: &[&str],
    ) -> ApproverResolver<InMemoryOrgDirectory, InMemoryAvailabilityOracle> {
        ApproverResolver::new(directory, InMemoryAvailabilityOracle::with_absent_users(absent))
    }

    fn primary_id(resolution: &Resolution) -> Option<&str> {
        resolution.primary.as_ref().map(|candidate| candidate.user_id.0.as_str())
    }

    fn coverage_id(resolution: &Resolution) -> Option<&str> {
        resolution.coverage.as_ref().map(|candidate| candidate.user_id.0.as_str())
    }

    fn ordered_ids(resolution: &Resolution) -> Vec<&str> {
        resolution.all.iter().map(|candidate| candidate.user_id.0.as_str()).collect()
    }

    #[tokio::test]
    async fn requester_without_team_resolves_to_nothing() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-hr", GlobalRole::Hr)
            .with_user("u-super", GlobalRole::Superadmin);

        let resolution = resolver(directory, &[]).resolve(&id("u-hr")).await;

        assert_eq!(resolution, Resolution::empty());
        assert!(resolution.is_awaiting_assignment());
    }

    #[tokio::test]
    async fn available_backup_beats_absent_primary() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-a", GlobalRole::Admin)
            .with_user("u-b", GlobalRole::Admin)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-a", PriorityTag::Primary)
            .with_teamlead("team-1", "u-b", PriorityTag::Backup);

        let resolution = resolver(directory, &["u-a"]).resolve(&id("u-req")).await;

        assert_eq!(primary_id(&resolution), Some("u-b"));
        assert_eq!(ordered_ids(&resolution), vec!["u-a", "u-b"]);
        assert!(!resolution.all[0].available);
        assert_eq!(resolution.all[0].reason, "Primary Teamlead");
        assert_eq!(resolution.all[1].reason, "Backup Teamlead");
    }

    #[tokio::test]
    async fn everyone_absent_still_names_the_top_ranked_primary() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-a", GlobalRole::Admin)
            .with_user("u-s", GlobalRole::Superadmin)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-a", PriorityTag::Primary)
            .with_teamlead("team-1", "u-s", PriorityTag::BackupBackup);

        let resolution = resolver(directory, &["u-a", "u-s"]).resolve(&id("u-req")).await;

        assert_eq!(primary_id(&resolution), Some("u-a"));
        assert_eq!(coverage_id(&resolution), Some("u-s"));
        assert_eq!(resolution.all[1].reason, "Backup (Escalation)");
    }

    #[tokio::test]
    async fn sort_uses_availability_then_role_rank_then_id_within_a_tag() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-super", GlobalRole::Superadmin)
            .with_user("u-hr", GlobalRole::Hr)
            .with_user("u-admin-2", GlobalRole::Admin)
            .with_user("u-admin-1", GlobalRole::Admin)
            .with_user("u-away", GlobalRole::Admin)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-super", PriorityTag::None)
            .with_teamlead("team-1", "u-hr", PriorityTag::None)
            .with_teamlead("team-1", "u-admin-2", PriorityTag::None)
            .with_teamlead("team-1", "u-admin-1", PriorityTag::None)
            .with_teamlead("team-1", "u-away", PriorityTag::None);

        let resolution = resolver(directory, &["u-away"]).resolve(&id("u-req")).await;

        assert_eq!(
            ordered_ids(&resolution),
            vec!["u-admin-1", "u-admin-2", "u-hr", "u-super", "u-away"]
        );
        let reasons: Vec<&str> =
            resolution.all.iter().map(|candidate| candidate.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "Admin (Teamlead)",
                "Admin (Teamlead)",
                "HR (Teamlead)",
                "Superadmin (Teamlead)",
                "Admin (Teamlead)"
            ]
        );
        assert_eq!(primary_id(&resolution), Some("u-admin-1"));
        assert_eq!(coverage_id(&resolution), Some("u-hr"));
    }

    #[tokio::test]
    async fn admin_primary_without_senior_candidate_has_no_coverage() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-a", GlobalRole::Admin)
            .with_user("u-b", GlobalRole::Admin)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-a", PriorityTag::Primary)
            .with_teamlead("team-1", "u-b", PriorityTag::Backup);

        let resolution = resolver(directory, &[]).resolve(&id("u-req")).await;

        assert_eq!(primary_id(&resolution), Some("u-a"));
        assert_eq!(resolution.coverage, None);
    }

    #[tokio::test]
    async fn coverage_ignores_absent_seniors_while_someone_is_available() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-a", GlobalRole::Admin)
            .with_user("u-hr", GlobalRole::Hr)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-a", PriorityTag::Primary)
            .with_teamlead("team-1", "u-hr", PriorityTag::Backup);

        let resolution = resolver(directory, &["u-hr"]).resolve(&id("u-req")).await;

        assert_eq!(primary_id(&resolution), Some("u-a"));
        assert_eq!(resolution.coverage, None);
    }

    #[tokio::test]
    async fn superadmin_primary_never_has_coverage() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-s", GlobalRole::Superadmin)
            .with_user("u-s2", GlobalRole::Superadmin)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-s", PriorityTag::Primary)
            .with_teamlead("team-1", "u-s2", PriorityTag::Backup);

        let resolution = resolver(directory, &[]).resolve(&id("u-req")).await;

        assert_eq!(primary_id(&resolution), Some("u-s"));
        assert_eq!(resolution.coverage, None);
    }

    #[tokio::test]
    async fn privileged_requester_is_routed_to_superadmins_in_directory_order() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-hr", GlobalRole::Hr)
            .with_user("u-admin", GlobalRole::Admin)
            .with_user("s-1", GlobalRole::Superadmin)
            .with_user("s-2", GlobalRole::Superadmin)
            .with_user("s-3", GlobalRole::Superadmin)
            .with_member("team-hr", "u-hr")
            .with_teamlead("team-hr", "u-admin", PriorityTag::Primary)
            .with_teamlead("team-hr", "s-3", PriorityTag::Backup);

        let resolution = resolver(directory, &["s-1"]).resolve(&id("u-hr")).await;

        assert_eq!(ordered_ids(&resolution), vec!["s-1", "s-2", "s-3"]);
        assert!(resolution.all.iter().all(|candidate| candidate.reason == SUPERADMIN_REQUIRED_REASON));
        assert_eq!(primary_id(&resolution), Some("s-2"));
        // coverage is positional and may repeat the primary
        assert_eq!(coverage_id(&resolution), Some("s-2"));

        let leading = &resolution.all[2];
        assert!(leading.can_act);
        assert_eq!(leading.team_role, TeamRole::Teamlead);
        assert_eq!(leading.priority_tag, PriorityTag::Backup);
        assert!(!resolution.all[0].can_act);
    }

    #[tokio::test]
    async fn superadmin_requester_is_not_its_own_candidate() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("s-1", GlobalRole::Superadmin)
            .with_user("s-2", GlobalRole::Superadmin)
            .with_member("team-board", "s-1");

        let resolution = resolver(directory, &[]).resolve(&id("s-1")).await;

        assert_eq!(ordered_ids(&resolution), vec!["s-2"]);
        assert_eq!(primary_id(&resolution), Some("s-2"));
        assert_eq!(resolution.coverage, None);
    }

    #[tokio::test]
    async fn lead_of_several_teams_appears_once_with_strongest_tag() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-a", GlobalRole::Admin)
            .with_member("team-1", "u-req")
            .with_member("team-2", "u-req")
            .with_teamlead("team-1", "u-a", PriorityTag::Backup)
            .with_teamlead("team-2", "u-a", PriorityTag::Primary);

        let resolution = resolver(directory, &[]).resolve(&id("u-req")).await;

        assert_eq!(resolution.all.len(), 1);
        assert_eq!(resolution.all[0].priority_tag, PriorityTag::Primary);
        assert_eq!(resolution.all[0].team_id.as_ref().map(|team| team.0.as_str()), Some("team-2"));
    }

    #[tokio::test]
    async fn user_role_teamlead_is_listed_but_cannot_act() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-lead", GlobalRole::User)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-lead", PriorityTag::None);

        let resolution = resolver(directory, &[]).resolve(&id("u-req")).await;

        assert_eq!(primary_id(&resolution), Some("u-lead"));
        assert_eq!(resolution.all[0].reason, "Primary Teamlead");
        assert!(!resolution.all[0].can_act);
    }

    #[tokio::test]
    async fn read_failures_degrade_to_empty_resolution() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-a", GlobalRole::Admin)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-a", PriorityTag::Primary);
        let failing_directory = ApproverResolver::new(
            directory.failing_on(DirectoryRead::TeamleadMemberships),
            InMemoryAvailabilityOracle::default(),
        );
        assert_eq!(failing_directory.resolve(&id("u-req")).await, Resolution::empty());

        let directory = InMemoryOrgDirectory::default()
            .with_user("u-req", GlobalRole::User)
            .with_user("u-a", GlobalRole::Admin)
            .with_member("team-1", "u-req")
            .with_teamlead("team-1", "u-a", PriorityTag::Primary);
        let failing_oracle =
            ApproverResolver::new(directory, InMemoryAvailabilityOracle::failing());
        assert_eq!(failing_oracle.resolve(&id("u-req")).await, Resolution::empty());
    }

    #[tokio::test]
    async fn hr_routing_survives_a_failed_teamlead_read() {
        let directory = InMemoryOrgDirectory::default()
            .with_user("u-hr", GlobalRole::Hr)
            .with_user("u-s", GlobalRole::Superadmin)
            .with_member("team-1", "u-hr")
            .with_teamlead("team-1", "u-s", PriorityTag::Primary)
            .failing_on(DirectoryRead::TeamleadMemberships);

        let resolution = resolver(directory, &[]).resolve(&id("u-hr")).await;

        assert_eq!(primary_id(&resolution), Some("u-s"));
        assert_eq!(resolution.all.len(), 1);
        assert_eq!(resolution.all[0].reason, SUPERADMIN_REQUIRED_REASON);
        assert!(!resolution.all[0].can_act);
        assert_eq!(resolution.all[0].team_id, None);
    }

    #[tokio::test]
    async fn repeated_resolution_is_identical() {
        let directory = Arc::new(
            InMemoryOrgDirectory::default()
                .with_user("u-req", GlobalRole::User)
                .with_user("u-c", GlobalRole::Admin)
                .with_user("u-b", GlobalRole::Admin)
                .with_user("u-a", GlobalRole::Admin)
                .with_member("team-1", "u-req")
                .with_teamlead("team-1", "u-c", PriorityTag::None)
                .with_teamlead("team-1", "u-b", PriorityTag::None)
                .with_teamlead("team-1", "u-a", PriorityTag::None),
        );
        let resolver = ApproverResolver::new(
            Arc::clone(&directory),
            Arc::new(InMemoryAvailabilityOracle::with_absent_users(&["u-a"])),
        );

        let first = resolver.resolve(&id("u-req")).await;
        let second = resolver.resolve(&id("u-req")).await;

        assert_eq!(first, second);
        assert_eq!(ordered_ids(&first), vec!["u-b", "u-c", "u-a"]);
    }
}
