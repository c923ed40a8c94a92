//! Shared test infrastructure.
//!
//! - `setup_test_store()` seeds an in-memory store with two trackers, three
//!   roles (one outside workflows) and three statuses.
//! - `init_app!` builds the full service around any `RuleStore`.
//! - `login!` signs in through a test-only route and returns the session cookie.
//! - `setup_pg_store()` gives a migrated Postgres store when `DATABASE_URL` is set.

#![allow(dead_code, unused_macros)]

use std::sync::Arc;

use actix_session::Session;
use actix_web::{HttpResponse, web};
use async_trait::async_trait;
use serde::Deserialize;

use wfedit::errors::AppError;
use wfedit::models::reference::{IssueStatus, Role, Tracker};
use wfedit::models::workflow::permission::{PermissionEdits, PermissionRow};
use wfedit::models::workflow::*;

pub const MANAGER_PERMISSIONS: &str = "workflow.manage";

pub struct Seeded {
    pub store: Arc<MemoryStore>,
    pub bug: TrackerId,
    pub feature: TrackerId,
    pub manager: RoleId,
    pub developer: RoleId,
    pub anonymous: RoleId,
    pub new: StatusId,
    pub assigned: StatusId,
    pub resolved: StatusId,
}

impl Seeded {
    pub fn dyn_store(&self) -> Arc<dyn RuleStore> {
        self.store.clone()
    }

    pub fn rule(&self, tracker_id: TrackerId, role_id: RoleId, old: StatusId, new: StatusId, condition: Condition) -> TransitionRule {
        TransitionRule {
            tracker_id,
            role_id,
            old_status_id: old,
            new_status_id: new,
            condition,
        }
    }

    /// Transitions of one (tracker, role) as `(old, new, condition)` tuples.
    pub async fn keys_for(&self, tracker_id: TrackerId, role_id: RoleId) -> Vec<(StatusId, StatusId, Condition)> {
        self.store
            .all_transitions()
            .await
            .into_iter()
            .filter(|r| r.tracker_id == tracker_id && r.role_id == role_id)
            .map(|r| (r.old_status_id, r.new_status_id, r.condition))
            .collect()
    }
}

pub async fn setup_test_store() -> Seeded {
    let store = Arc::new(MemoryStore::new());
    let bug = store.add_tracker("Bug").await;
    let feature = store.add_tracker("Feature").await;
    let manager = store.add_role("Manager", true).await;
    let developer = store.add_role("Developer", true).await;
    let anonymous = store.add_role("Anonymous", false).await;
    let new = store.add_status("New").await;
    let assigned = store.add_status("Assigned").await;
    let resolved = store.add_status("Resolved").await;

    Seeded {
        store,
        bug,
        feature,
        manager,
        developer,
        anonymous,
        new,
        assigned,
        resolved,
    }
}

/// Seeded store with a small Bug/Manager workflow:
/// creation -> New, New -> Assigned (always), Assigned -> Resolved (author).
pub async fn setup_test_store_with_rules() -> Seeded {
    let seeded = setup_test_store().await;
    for rule in [
        seeded.rule(seeded.bug, seeded.manager, NEW_ISSUE_STATUS, seeded.new, Condition::Always),
        seeded.rule(seeded.bug, seeded.manager, seeded.new, seeded.assigned, Condition::Always),
        seeded.rule(seeded.bug, seeded.manager, seeded.assigned, seeded.resolved, Condition::Author),
    ] {
        seeded.store.insert_transition(rule).await;
    }
    seeded
}

#[derive(Deserialize)]
pub struct LoginQuery {
    pub user_id: i64,
    #[serde(default)]
    pub permissions: String,
}

/// Test-only sign-in: stores the user id and permission codes in the session.
pub async fn test_login(session: Session, query: web::Query<LoginQuery>) -> HttpResponse {
    let stored = session
        .insert("user_id", query.user_id)
        .and_then(|_| session.insert("permissions", query.permissions.clone()));
    match stored {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

/// Build and initialise the app around an `Arc<dyn RuleStore>`.
macro_rules! init_app {
    ($store:expr) => {{
        let store: std::sync::Arc<dyn wfedit::models::workflow::RuleStore> = $store;
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(
                    actix_session::SessionMiddleware::builder(
                        actix_session::storage::CookieSessionStore::default(),
                        actix_web::cookie::Key::from(&[7u8; 64][..]),
                    )
                    .cookie_secure(false)
                    .build(),
                )
                .app_data(actix_web::web::Data::from(store))
                .route("/test/login", actix_web::web::post().to(common::test_login))
                .service(
                    actix_web::web::scope("")
                        .wrap(actix_web::middleware::from_fn(wfedit::auth::middleware::require_auth))
                        .configure(wfedit::handlers::workflow_handlers::configure),
                )
                .default_service(actix_web::web::to(wfedit::handlers::workflow_handlers::not_found)),
        )
        .await
    }};
}

/// Sign in with the given comma separated permission codes; returns the session cookie.
macro_rules! login {
    ($app:expr, $permissions:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri(&format!("/test/login?user_id=1&permissions={}", $permissions))
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert!(resp.status().is_success(), "test login failed");
        resp.response()
            .cookies()
            .next()
            .expect("session cookie")
            .into_owned()
    }};
}

/// Delegates to a `MemoryStore` but fails every write.
pub struct FailingStore {
    pub inner: Arc<MemoryStore>,
}

impl FailingStore {
    fn refuse(&self) -> AppError {
        AppError::Storage("simulated write failure".to_string())
    }
}

#[async_trait]
impl RuleStore for FailingStore {
    async fn trackers(&self) -> Result<Vec<Tracker>, AppError> {
        self.inner.trackers().await
    }

    async fn roles(&self) -> Result<Vec<Role>, AppError> {
        self.inner.roles().await
    }

    async fn statuses(&self) -> Result<Vec<IssueStatus>, AppError> {
        self.inner.statuses().await
    }

    async fn transitions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<TransitionRule>, AppError> {
        self.inner.transitions_in_scope(trackers, roles).await
    }

    async fn used_status_ids(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<StatusId>, AppError> {
        self.inner.used_status_ids(trackers, roles).await
    }

    async fn replace_transitions(
        &self,
        _trackers: &[TrackerId],
        _roles: &[RoleId],
        _matrix: &RuleMatrix,
    ) -> Result<u64, AppError> {
        Err(self.refuse())
    }

    async fn workflow_counts(&self) -> Result<Vec<WorkflowCount>, AppError> {
        self.inner.workflow_counts().await
    }

    async fn permissions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<PermissionRow>, AppError> {
        self.inner.permissions_in_scope(trackers, roles).await
    }

    async fn replace_permissions(
        &self,
        _trackers: &[TrackerId],
        _roles: &[RoleId],
        _edits: &PermissionEdits,
    ) -> Result<(), AppError> {
        Err(self.refuse())
    }

    async fn copy_rules(&self, _pairs: &[((TrackerId, RoleId), (TrackerId, RoleId))]) -> Result<(), AppError> {
        Err(self.refuse())
    }
}

/// Postgres store on a freshly migrated and emptied schema, or `None` when
/// `DATABASE_URL` is not set.
pub async fn setup_pg_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to DATABASE_URL");
    wfedit::db::run_migrations(&pool).await.expect("Failed to run migrations");
    sqlx::raw_sql(
        "TRUNCATE workflow_permissions, workflow_transitions, issue_statuses, roles, trackers RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to reset tables");
    Some(PgStore::new(pool))
}
