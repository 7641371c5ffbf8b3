//! Eligibility rules shared by the authorization gate and the approver resolver.
//!
//! Rules are evaluated in a fixed order and the first failure wins:
//!
//! 1. requests from HR or superadmin users need a superadmin approver
//! 2. the approver's global role must not be `user`
//! 3. the requester must belong to at least one team
//! 4. the approver must lead one of the requester's teams

use serde::{Deserialize, Serialize};

use crate::domain::org::{GlobalRole, TeamId, TeamRole, TeamleadMembership, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    DirectoryUnavailable { detail: String },
    SuperadminRequired { requester_role: GlobalRole, approver_role: GlobalRole },
    InsufficientGlobalRole { approver_role: GlobalRole },
    RequesterWithoutTeam,
    NotTeamleadOfRequester,
}

impl Denial {
    pub fn reason(&self) -> String {
        match self {
            Self::DirectoryUnavailable { detail } => {
                format!("approval data could not be read ({detail})")
            }
            Self::SuperadminRequired { requester_role, approver_role } => {
                format!(
                    "requests from `{requester_role}` users need a superadmin approver, got `{approver_role}`"
                )
            }
            Self::InsufficientGlobalRole { approver_role } => {
                format!("approver role `{approver_role}` cannot approve leave requests")
            }
            Self::RequesterWithoutTeam => {
                "requester is not a member of any team and has no approver".to_owned()
            }
            Self::NotTeamleadOfRequester => {
                "approver is not a teamlead of any of the requester's teams".to_owned()
            }
        }
    }
}

/// Everything the rules need to know about one approver/requester pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EligibilityFacts {
    pub requester_role: GlobalRole,
    pub approver_role: GlobalRole,
    pub requester_has_team: bool,
    pub approver_leads_shared_team: bool,
}

pub fn check_roles(requester_role: GlobalRole, approver_role: GlobalRole) -> Result<(), Denial> {
    if requester_role.is_privileged() && approver_role != GlobalRole::Superadmin {
        return Err(Denial::SuperadminRequired { requester_role, approver_role });
    }

    if approver_role == GlobalRole::User {
        return Err(Denial::InsufficientGlobalRole { approver_role });
    }

    Ok(())
}

pub fn check_team_scope(
    requester_has_team: bool,
    approver_leads_shared_team: bool,
) -> Result<(), Denial> {
    if !requester_has_team {
        return Err(Denial::RequesterWithoutTeam);
    }

    if !approver_leads_shared_team {
        return Err(Denial::NotTeamleadOfRequester);
    }

    Ok(())
}

pub fn evaluate(facts: &EligibilityFacts) -> Result<(), Denial> {
    check_roles(facts.requester_role, facts.approver_role)?;
    check_team_scope(facts.requester_has_team, facts.approver_leads_shared_team)
}

pub fn leads_shared_team(
    approver_id: &UserId,
    requester_team_ids: &[TeamId],
    teamleads: &[TeamleadMembership],
) -> bool {
    teamleads.iter().any(|lead| {
        &lead.user_id == approver_id
            && lead.team_role == TeamRole::Teamlead
            && requester_team_ids.contains(&lead.team_id)
    })
}

/// Which roles may cover for a primary approver of the given role.
pub fn covers_for(primary_role: GlobalRole, candidate_role: GlobalRole) -> bool {
    match primary_role {
        GlobalRole::Admin => matches!(candidate_role, GlobalRole::Hr | GlobalRole::Superadmin),
        GlobalRole::Hr => candidate_role == GlobalRole::Superadmin,
        GlobalRole::Superadmin | GlobalRole::User | GlobalRole::Extern => false,
    }
}
