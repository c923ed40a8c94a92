use serde::{Deserialize, Serialize};

/// A category of work item that owns its own set of workflow transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tracker {
    pub id: i64,
    pub name: String,
    pub position: i64,
}

/// A permission group. Only roles with `consider_workflow` appear in workflow editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub position: i64,
    pub consider_workflow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IssueStatus {
    pub id: i64,
    pub name: String,
    pub position: i64,
    pub is_closed: bool,
}
