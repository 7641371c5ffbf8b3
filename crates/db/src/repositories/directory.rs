use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

use staffdesk_core::directory::{DirectoryError, OrgDirectory};
use staffdesk_core::domain::org::{
    GlobalRole, PriorityTag, TeamId, TeamMembership, TeamRole, TeamleadMembership, User, UserId,
};

use super::{decode, RepositoryError};
use crate::DbPool;

/// Organization directory read straight from SQLite on every call.
#[derive(Clone)]
pub struct SqlOrgDirectory {
    pool: DbPool,
}

impl SqlOrgDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_user(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, display_name, global_role) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 global_role = excluded.global_role",
        )
        .bind(&user.id.0)
        .bind(&user.display_name)
        .bind(user.global_role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_team(&self, team_id: &TeamId, name: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO teams (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&team_id.0)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or replaces the single membership row for `(team_id, user_id)`.
    pub async fn save_membership(&self, membership: &TeamMembership) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO team_memberships (team_id, user_id, team_role, priority_tag)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(team_id, user_id) DO UPDATE SET
                 team_role = excluded.team_role,
                 priority_tag = excluded.priority_tag",
        )
        .bind(&membership.team_id.0)
        .bind(&membership.user_id.0)
        .bind(membership.team_role.as_str())
        .bind(membership.priority_tag.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_membership(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM team_memberships WHERE team_id = ? AND user_id = ?")
            .bind(&team_id.0)
            .bind(&user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_user(&self, user_id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, display_name, global_role FROM users WHERE id = ?")
            .bind(&user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn fetch_team_ids(&self, user_id: &UserId) -> Result<Vec<TeamId>, RepositoryError> {
        let team_ids: Vec<String> = sqlx::query_scalar(
            "SELECT team_id FROM team_memberships WHERE user_id = ? ORDER BY team_id",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(team_ids.into_iter().map(TeamId).collect())
    }

    async fn fetch_teamleads(
        &self,
        team_ids: &[TeamId],
        exclude_user_id: &UserId,
    ) -> Result<Vec<TeamleadMembership>, RepositoryError> {
        if team_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT m.user_id, m.team_id, m.team_role, m.priority_tag, u.global_role
             FROM team_memberships m
             JOIN users u ON u.id = m.user_id
             WHERE m.team_role = 'teamlead' AND m.user_id <> ",
        );
        query_builder.push_bind(&exclude_user_id.0);
        query_builder.push(" AND m.team_id IN (");
        let mut separated = query_builder.separated(", ");
        for team_id in team_ids {
            separated.push_bind(&team_id.0);
        }
        separated.push_unseparated(") ORDER BY m.team_id, m.user_id");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_teamlead).collect()
    }

    async fn fetch_led_team_ids(&self, user_id: &UserId) -> Result<Vec<TeamId>, RepositoryError> {
        let team_ids: Vec<String> = sqlx::query_scalar(
            "SELECT team_id FROM team_memberships
             WHERE user_id = ? AND team_role = 'teamlead'
             ORDER BY team_id",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(team_ids.into_iter().map(TeamId).collect())
    }

    async fn fetch_users_by_role(&self, role: GlobalRole) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, display_name, global_role FROM users WHERE global_role = ? ORDER BY id",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_user).collect()
    }
}

fn parse<T>(raw: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = decode(row, "id")?;
    let display_name: String = decode(row, "display_name")?;
    let global_role: String = decode(row, "global_role")?;

    Ok(User { id: UserId(id), display_name, global_role: parse::<GlobalRole>(&global_role)? })
}

fn row_to_teamlead(row: &sqlx::sqlite::SqliteRow) -> Result<TeamleadMembership, RepositoryError> {
    let user_id: String = decode(row, "user_id")?;
    let team_id: String = decode(row, "team_id")?;
    let team_role: String = decode(row, "team_role")?;
    let priority_tag: String = decode(row, "priority_tag")?;
    let global_role: String = decode(row, "global_role")?;

    Ok(TeamleadMembership {
        user_id: UserId(user_id),
        team_id: TeamId(team_id),
        team_role: parse::<TeamRole>(&team_role)?,
        priority_tag: parse::<PriorityTag>(&priority_tag)?,
        global_role: parse::<GlobalRole>(&global_role)?,
    })
}

#[async_trait]
impl OrgDirectory for SqlOrgDirectory {
    async fn get_user(&self, user_id: &UserId) -> Result<User, DirectoryError> {
        self.fetch_user(user_id).await?.ok_or_else(|| DirectoryError::UserNotFound(user_id.clone()))
    }

    async fn team_ids_for_user(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError> {
        Ok(self.fetch_team_ids(user_id).await?)
    }

    async fn teamlead_memberships(
        &self,
        team_ids: &[TeamId],
        exclude_user_id: &UserId,
    ) -> Result<Vec<TeamleadMembership>, DirectoryError> {
        Ok(self.fetch_teamleads(team_ids, exclude_user_id).await?)
    }

    async fn teamlead_team_ids(&self, user_id: &UserId) -> Result<Vec<TeamId>, DirectoryError> {
        Ok(self.fetch_led_team_ids(user_id).await?)
    }

    async fn users_by_role(&self, role: GlobalRole) -> Result<Vec<User>, DirectoryError> {
        Ok(self.fetch_users_by_role(role).await?)
    }
}

#[cfg(test)]
mod tests {
    use staffdesk_core::directory::{DirectoryError, OrgDirectory};
    use staffdesk_core::domain::org::{
        GlobalRole, PriorityTag, TeamId, TeamMembership, TeamRole, User, UserId,
    };

    use super::SqlOrgDirectory;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlOrgDirectory {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlOrgDirectory::new(pool)
    }

    async fn user(directory: &SqlOrgDirectory, id: &str, role: GlobalRole) {
        directory
            .save_user(&User { id: UserId::from(id), display_name: id.to_uppercase(), global_role: role })
            .await
            .expect("save user");
    }

    async fn membership(
        directory: &SqlOrgDirectory,
        team: &str,
        user: &str,
        team_role: TeamRole,
        priority_tag: PriorityTag,
    ) {
        directory
            .save_membership(&TeamMembership {
                team_id: TeamId::from(team),
                user_id: UserId::from(user),
                team_role,
                priority_tag,
            })
            .await
            .expect("save membership");
    }

    async fn seeded() -> SqlOrgDirectory {
        let directory = setup().await;
        for team in ["team-a", "team-b"] {
            directory.save_team(&TeamId::from(team), team).await.expect("save team");
        }
        user(&directory, "u-req", GlobalRole::User).await;
        user(&directory, "u-lead-b", GlobalRole::Hr).await;
        user(&directory, "u-lead-a", GlobalRole::Admin).await;
        user(&directory, "u-super", GlobalRole::Superadmin).await;
        membership(&directory, "team-a", "u-req", TeamRole::Member, PriorityTag::None).await;
        membership(&directory, "team-b", "u-req", TeamRole::Teamlead, PriorityTag::Primary).await;
        membership(&directory, "team-a", "u-lead-a", TeamRole::Teamlead, PriorityTag::Primary)
            .await;
        membership(&directory, "team-b", "u-lead-b", TeamRole::Teamlead, PriorityTag::Backup).await;
        membership(&directory, "team-a", "u-lead-b", TeamRole::Teamlead, PriorityTag::Backup).await;
        directory
    }

    #[tokio::test]
    async fn get_user_decodes_role_and_reports_missing_users() {
        let directory = seeded().await;

        let lead = directory.get_user(&UserId::from("u-lead-b")).await.expect("user");
        assert_eq!(lead.global_role, GlobalRole::Hr);
        assert_eq!(lead.display_name, "U-LEAD-B");

        let missing = directory.get_user(&UserId::from("nobody")).await;
        assert_eq!(missing, Err(DirectoryError::UserNotFound(UserId::from("nobody"))));
    }

    #[tokio::test]
    async fn teamleads_are_ordered_and_exclude_the_requester() {
        let directory = seeded().await;
        let requester = UserId::from("u-req");

        let team_ids = directory.team_ids_for_user(&requester).await.expect("team ids");
        assert_eq!(team_ids, vec![TeamId::from("team-a"), TeamId::from("team-b")]);

        let leads = directory.teamlead_memberships(&team_ids, &requester).await.expect("leads");
        let pairs: Vec<(&str, &str)> =
            leads.iter().map(|lead| (lead.team_id.0.as_str(), lead.user_id.0.as_str())).collect();
        assert_eq!(
            pairs,
            vec![("team-a", "u-lead-a"), ("team-a", "u-lead-b"), ("team-b", "u-lead-b")]
        );
        assert_eq!(leads[0].global_role, GlobalRole::Admin);
        assert_eq!(leads[2].priority_tag, PriorityTag::Backup);
    }

    #[tokio::test]
    async fn led_team_ids_include_only_teamlead_rows() {
        let directory = seeded().await;

        let requester_led =
            directory.teamlead_team_ids(&UserId::from("u-req")).await.expect("led teams");
        assert_eq!(requester_led, vec![TeamId::from("team-b")]);

        let hr_led = directory.teamlead_team_ids(&UserId::from("u-lead-b")).await.expect("led teams");
        assert_eq!(hr_led, vec![TeamId::from("team-a"), TeamId::from("team-b")]);

        let none = directory.teamlead_team_ids(&UserId::from("u-super")).await.expect("led teams");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn empty_team_list_yields_no_teamleads() {
        let directory = seeded().await;
        let leads = directory
            .teamlead_memberships(&[], &UserId::from("u-req"))
            .await
            .expect("leads");
        assert!(leads.is_empty());
    }

    #[tokio::test]
    async fn membership_upsert_keeps_one_row_per_pair() {
        let directory = seeded().await;
        membership(&directory, "team-a", "u-lead-a", TeamRole::Member, PriorityTag::None).await;

        let leads = directory
            .teamlead_memberships(&[TeamId::from("team-a")], &UserId::from("u-req"))
            .await
            .expect("leads");
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].user_id, UserId::from("u-lead-b"));

        let removed = directory
            .remove_membership(&TeamId::from("team-a"), &UserId::from("u-lead-b"))
            .await
            .expect("remove");
        assert!(removed);
    }

    #[tokio::test]
    async fn users_by_role_is_ordered_by_id() {
        let directory = seeded().await;
        user(&directory, "a-super", GlobalRole::Superadmin).await;

        let supers = directory.users_by_role(GlobalRole::Superadmin).await.expect("supers");
        let ids: Vec<&str> = supers.iter().map(|user| user.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a-super", "u-super"]);
    }

    #[tokio::test]
    async fn closed_pool_surfaces_as_unavailable() {
        let directory = seeded().await;
        directory.pool.close().await;

        let result = directory.get_user(&UserId::from("u-req")).await;
        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
    }
}
