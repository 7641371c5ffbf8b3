use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_TEAMS: &[&str] = &["team-platform", "team-people"];

const DEMO_USERS: &[(&str, &str)] = &[
    ("u-rita", "user"),
    ("u-adam", "admin"),
    ("u-hana", "hr"),
    ("u-sam", "superadmin"),
    ("u-omar", "user"),
    ("u-eve", "extern"),
    ("u-nina", "user"),
];

const DEMO_TEAMLEADS: &[(&str, &str, &str)] = &[
    ("team-platform", "u-adam", "primary"),
    ("team-platform", "u-hana", "backup"),
    ("team-platform", "u-omar", "backup_backup"),
    ("team-people", "u-sam", "primary"),
];

/// Leave requests and whether each one makes its requester absent today.
const DEMO_LEAVE_REQUESTS: &[DemoLeaveContract] = &[
    DemoLeaveContract {
        id: "lr-demo-001",
        requester_id: "u-rita",
        status: "pending",
        absent_today: false,
        description: "Upcoming vacation awaiting a platform teamlead",
    },
    DemoLeaveContract {
        id: "lr-demo-002",
        requester_id: "u-adam",
        status: "approved",
        absent_today: true,
        description: "Primary platform teamlead is away this week",
    },
    DemoLeaveContract {
        id: "lr-demo-003",
        requester_id: "u-hana",
        status: "pending",
        absent_today: false,
        description: "HR request routed to superadmins",
    },
    DemoLeaveContract {
        id: "lr-demo-004",
        requester_id: "u-eve",
        status: "rejected",
        absent_today: false,
        description: "Already decided request",
    },
];

/// Deterministic demo organization covering every approval path: team routing
/// with an absent primary, HR routing to superadmins, a USER-role teamlead, and a
/// requester without a team.
pub struct DemoOrgDataset;

impl DemoOrgDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_org.sql");

    /// Loads the demo organization. Existing rows are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            teams_seeded: DEMO_TEAMS.len(),
            users_seeded: DEMO_USERS.len(),
            leave_requests_seeded: DEMO_LEAVE_REQUESTS
                .iter()
                .map(|request| LeaveSeedInfo {
                    leave_request_id: request.id,
                    requester_id: request.requester_id,
                    description: request.description,
                })
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for team_id in DEMO_TEAMS {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM teams WHERE id = ?1)")
                .bind(team_id)
                .fetch_one(pool)
                .await?;
            checks.push((*team_id, exists == 1));
        }

        for (user_id, global_role) in DEMO_USERS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1 AND global_role = ?2)",
            )
            .bind(user_id)
            .bind(global_role)
            .fetch_one(pool)
            .await?;
            checks.push((*user_id, exists == 1));
        }

        for (team_id, user_id, priority_tag) in DEMO_TEAMLEADS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM team_memberships
                 WHERE team_id = ?1 AND user_id = ?2 AND team_role = 'teamlead' AND priority_tag = ?3)",
            )
            .bind(team_id)
            .bind(user_id)
            .bind(priority_tag)
            .fetch_one(pool)
            .await?;
            checks.push(("teamlead-membership", exists == 1));
        }

        let unassigned_teams: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM team_memberships WHERE user_id = 'u-nina'")
                .fetch_one(pool)
                .await?;
        checks.push(("u-nina-without-team", unassigned_teams == 0));

        for request in DEMO_LEAVE_REQUESTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM leave_requests
                 WHERE id = ?1 AND requester_id = ?2 AND status = ?3)",
            )
            .bind(request.id)
            .bind(request.requester_id)
            .bind(request.status)
            .fetch_one(pool)
            .await?;
            checks.push((request.id, exists == 1));

            let covers_today: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM leave_requests
                 WHERE id = ?1 AND status = 'approved'
                   AND start_date <= date('now') AND end_date >= date('now'))",
            )
            .bind(request.id)
            .fetch_one(pool)
            .await?;
            checks.push((request.absence_label(), (covers_today == 1) == request.absent_today));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo rows. Memberships and leave requests cascade with users.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let user_ids = DEMO_USERS.iter().map(|(id, _)| *id).collect::<Vec<_>>();
        let quoted_users = sql_array_from_ids(&user_ids);
        let quoted_teams = sql_array_from_ids(DEMO_TEAMS);

        sqlx::query(&format!("DELETE FROM users WHERE id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM teams WHERE id IN {quoted_teams}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct DemoLeaveContract {
    id: &'static str,
    requester_id: &'static str,
    status: &'static str,
    absent_today: bool,
    description: &'static str,
}

impl DemoLeaveContract {
    fn absence_label(&self) -> &'static str {
        match self.id {
            "lr-demo-001" => "lr-demo-001-availability",
            "lr-demo-002" => "lr-demo-002-availability",
            "lr-demo-003" => "lr-demo-003-availability",
            _ => "lr-demo-004-availability",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub teams_seeded: usize,
    pub users_seeded: usize,
    pub leave_requests_seeded: Vec<LeaveSeedInfo>,
}

#[derive(Debug)]
pub struct LeaveSeedInfo {
    pub leave_request_id: &'static str,
    pub requester_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
