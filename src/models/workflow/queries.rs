use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::BTreeSet;

use crate::errors::AppError;
use crate::models::reference::{IssueStatus, Role, Tracker};
use super::permission::{PermissionEdits, PermissionRow, PermissionRule};
use super::store::RuleStore;
use super::types::*;

/// Postgres-backed rule store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn create_tracker(&self, name: &str, position: i64) -> Result<TrackerId, AppError> {
        let id: (i64,) = sqlx::query_as("INSERT INTO trackers (name, position) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(position)
            .fetch_one(&self.pool)
            .await?;
        Ok(id.0)
    }

    pub async fn create_role(&self, name: &str, position: i64, consider_workflow: bool) -> Result<RoleId, AppError> {
        let id: (i64,) = sqlx::query_as(
            "INSERT INTO roles (name, position, consider_workflow) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(position)
        .bind(consider_workflow)
        .fetch_one(&self.pool)
        .await?;
        Ok(id.0)
    }

    pub async fn create_status(&self, name: &str, position: i64, is_closed: bool) -> Result<StatusId, AppError> {
        let id: (i64,) = sqlx::query_as(
            "INSERT INTO issue_statuses (name, position, is_closed) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(position)
        .bind(is_closed)
        .fetch_one(&self.pool)
        .await?;
        Ok(id.0)
    }
}

#[derive(sqlx::FromRow)]
struct TransitionRow {
    tracker_id: i64,
    role_id: i64,
    old_status_id: i64,
    new_status_id: i64,
    condition: String,
}

#[derive(sqlx::FromRow)]
struct PermissionDbRow {
    tracker_id: i64,
    role_id: i64,
    status_id: i64,
    field_name: String,
    rule: String,
}

#[async_trait]
impl RuleStore for PgStore {
    async fn trackers(&self) -> Result<Vec<Tracker>, AppError> {
        let trackers = sqlx::query_as::<_, Tracker>(
            "SELECT id, name, position FROM trackers ORDER BY position, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(trackers)
    }

    async fn roles(&self) -> Result<Vec<Role>, AppError> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT id, name, position, consider_workflow FROM roles ORDER BY position, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn statuses(&self) -> Result<Vec<IssueStatus>, AppError> {
        let statuses = sqlx::query_as::<_, IssueStatus>(
            "SELECT id, name, position, is_closed FROM issue_statuses ORDER BY position, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(statuses)
    }

    async fn transitions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<TransitionRule>, AppError> {
        let rows = sqlx::query_as::<_, TransitionRow>(
            "SELECT tracker_id, role_id, old_status_id, new_status_id, condition \
             FROM workflow_transitions \
             WHERE tracker_id = ANY($1) AND role_id = ANY($2) \
             ORDER BY old_status_id, new_status_id, condition",
        )
        .bind(trackers.to_vec())
        .bind(roles.to_vec())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<TransitionRule, AppError> {
                Ok(TransitionRule {
                    tracker_id: row.tracker_id,
                    role_id: row.role_id,
                    old_status_id: row.old_status_id,
                    new_status_id: row.new_status_id,
                    condition: row.condition.parse::<Condition>().map_err(AppError::Storage)?,
                })
            })
            .collect()
    }

    async fn used_status_ids(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<StatusId>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT DISTINCT status_id FROM ( \
                 SELECT old_status_id AS status_id FROM workflow_transitions \
                 WHERE tracker_id = ANY($1) AND role_id = ANY($2) AND old_status_id <> new_status_id \
                 UNION \
                 SELECT new_status_id AS status_id FROM workflow_transitions \
                 WHERE tracker_id = ANY($1) AND role_id = ANY($2) AND old_status_id <> new_status_id \
             ) used \
             ORDER BY status_id",
        )
        .bind(trackers.to_vec())
        .bind(roles.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn replace_transitions(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
        matrix: &RuleMatrix,
    ) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        // old_status_id carries no foreign key because 0 means "new issue".
        let old_ids: Vec<StatusId> = matrix
            .iter()
            .filter(|(key, enabled)| **enabled && key.old_status_id != NEW_ISSUE_STATUS)
            .map(|(key, _)| key.old_status_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !old_ids.is_empty() {
            let found: (i64,) = sqlx::query_as("SELECT COUNT(*)::BIGINT FROM issue_statuses WHERE id = ANY($1)")
                .bind(old_ids.clone())
                .fetch_one(&mut *tx)
                .await?;
            if found.0 != old_ids.len() as i64 {
                return Err(AppError::Storage(format!("unknown old status among {old_ids:?}")));
            }
        }

        let mut written = 0u64;
        for (key, enabled) in matrix.iter() {
            let result = if *enabled {
                sqlx::query(
                    "INSERT INTO workflow_transitions \
                         (tracker_id, role_id, old_status_id, new_status_id, condition) \
                     SELECT t.id, r.id, $3, $4, $5 \
                     FROM UNNEST($1::BIGINT[]) AS t(id) CROSS JOIN UNNEST($2::BIGINT[]) AS r(id) \
                     ON CONFLICT (tracker_id, role_id, old_status_id, new_status_id, condition) DO NOTHING",
                )
            } else {
                sqlx::query(
                    "DELETE FROM workflow_transitions \
                     WHERE tracker_id = ANY($1) AND role_id = ANY($2) \
                       AND old_status_id = $3 AND new_status_id = $4 AND condition = $5",
                )
            }
            .bind(trackers.to_vec())
            .bind(roles.to_vec())
            .bind(key.old_status_id)
            .bind(key.new_status_id)
            .bind(key.condition.as_str())
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn workflow_counts(&self) -> Result<Vec<WorkflowCount>, AppError> {
        let counts = sqlx::query_as::<_, WorkflowCount>(
            "SELECT tracker_id, role_id, COUNT(*)::BIGINT AS count \
             FROM workflow_transitions \
             GROUP BY tracker_id, role_id \
             ORDER BY tracker_id, role_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn permissions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<PermissionRow>, AppError> {
        let rows = sqlx::query_as::<_, PermissionDbRow>(
            "SELECT tracker_id, role_id, status_id, field_name, rule \
             FROM workflow_permissions \
             WHERE tracker_id = ANY($1) AND role_id = ANY($2) \
             ORDER BY status_id, field_name",
        )
        .bind(trackers.to_vec())
        .bind(roles.to_vec())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<PermissionRow, AppError> {
                Ok(PermissionRow {
                    tracker_id: row.tracker_id,
                    role_id: row.role_id,
                    status_id: row.status_id,
                    field_name: row.field_name,
                    rule: row.rule.parse::<PermissionRule>().map_err(AppError::Storage)?,
                })
            })
            .collect()
    }

    async fn replace_permissions(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
        edits: &PermissionEdits,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for ((field_name, status_id), rule) in edits {
            sqlx::query(
                "DELETE FROM workflow_permissions \
                 WHERE tracker_id = ANY($1) AND role_id = ANY($2) AND status_id = $3 AND field_name = $4",
            )
            .bind(trackers.to_vec())
            .bind(roles.to_vec())
            .bind(*status_id)
            .bind(field_name.as_str())
            .execute(&mut *tx)
            .await?;

            if let Some(rule) = rule {
                sqlx::query(
                    "INSERT INTO workflow_permissions (tracker_id, role_id, status_id, field_name, rule) \
                     SELECT t.id, r.id, $3, $4, $5 \
                     FROM UNNEST($1::BIGINT[]) AS t(id) CROSS JOIN UNNEST($2::BIGINT[]) AS r(id)",
                )
                .bind(trackers.to_vec())
                .bind(roles.to_vec())
                .bind(*status_id)
                .bind(field_name.as_str())
                .bind(rule.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn copy_rules(
        &self,
        pairs: &[((TrackerId, RoleId), (TrackerId, RoleId))],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for ((source_tracker, source_role), (target_tracker, target_role)) in pairs {
            for table in ["workflow_transitions", "workflow_permissions"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE tracker_id = $1 AND role_id = $2"))
                    .bind(*target_tracker)
                    .bind(*target_role)
                    .execute(&mut *tx)
                    .await?;
            }

            sqlx::query(
                "INSERT INTO workflow_transitions (tracker_id, role_id, old_status_id, new_status_id, condition) \
                 SELECT $3, $4, old_status_id, new_status_id, condition \
                 FROM workflow_transitions WHERE tracker_id = $1 AND role_id = $2",
            )
            .bind(*source_tracker)
            .bind(*source_role)
            .bind(*target_tracker)
            .bind(*target_role)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO workflow_permissions (tracker_id, role_id, status_id, field_name, rule) \
                 SELECT $3, $4, status_id, field_name, rule \
                 FROM workflow_permissions WHERE tracker_id = $1 AND role_id = $2",
            )
            .bind(*source_tracker)
            .bind(*source_role)
            .bind(*target_tracker)
            .bind(*target_role)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
