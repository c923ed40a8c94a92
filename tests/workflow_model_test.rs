//! Workflow model tests: update flows, scope resolution, permissions and copy,
//! all against the in-memory store.

#[macro_use]
mod common;

use std::sync::Arc;

use serde_json::json;

use wfedit::auth::session::{Permissions, RequestContext};
use wfedit::errors::AppError;
use wfedit::models::workflow::copy::{MISSING_SOURCE, MISSING_TARGET, copy_workflows};
use wfedit::models::workflow::params::{CopyParams, CopySource, IdSelection, PermissionParams, ScopeParams, TransitionParams};
use wfedit::models::workflow::permission::{PermissionRow, PermissionRule, rules_by_status};
use wfedit::models::workflow::scope::resolve_scope;
use wfedit::models::workflow::update::{INVALID_PARAMETERS, UpdatePhase, update_permissions, update_transitions};
use wfedit::models::workflow::*;
use common::*;

fn ctx() -> RequestContext {
    RequestContext {
        user_id: 1,
        permissions: Permissions::from_csv(MANAGER_PERMISSIONS),
    }
}

fn form(raw: &[(&str, String)]) -> Vec<(String, String)> {
    raw.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn cell(old: StatusId, new: StatusId, condition: &str) -> String {
    format!("transitions[{old}][{new}][{condition}]")
}

#[tokio::test]
async fn test_full_form_applies_submitted_cells() {
    let s = setup_test_store_with_rules().await;
    let params = TransitionParams::from_form(&form(&[
        ("tracker_id[]", s.bug.to_string()),
        ("role_id[]", s.manager.to_string()),
        (cell(s.new, s.resolved, "always").as_str(), "1".into()),
        (cell(s.new, s.assigned, "always").as_str(), "0".into()),
        (cell(s.assigned, s.resolved, "author").as_str(), "no_change".into()),
    ]));

    let outcome = update_transitions(s.store.as_ref(), &ctx(), &params, false)
        .await
        .expect("update should succeed");

    assert_eq!(outcome.phase, UpdatePhase::Done);
    assert_eq!(outcome.cells_applied, 2);
    assert_eq!(outcome.rows_written, 2);

    let keys = s.keys_for(s.bug, s.manager).await;
    assert!(keys.contains(&(s.new, s.resolved, Condition::Always)));
    assert!(!keys.contains(&(s.new, s.assigned, Condition::Always)));
    assert!(keys.contains(&(NEW_ISSUE_STATUS, s.new, Condition::Always)));
    assert!(keys.contains(&(s.assigned, s.resolved, Condition::Author)));
}

#[tokio::test]
async fn test_all_no_change_form_leaves_rules_untouched() {
    let s = setup_test_store_with_rules().await;
    let before = s.store.all_transitions().await;

    let statuses = [s.new, s.assigned, s.resolved];
    let names: Vec<String> = std::iter::once(NEW_ISSUE_STATUS)
        .chain(statuses)
        .flat_map(|old| {
            statuses
                .into_iter()
                .filter(move |&new| new != old)
                .flat_map(move |new| Condition::ALL.map(|c| cell(old, new, c.as_str())))
        })
        .collect();
    let mut raw = vec![
        ("tracker_id[]", s.bug.to_string()),
        ("role_id[]", s.manager.to_string()),
    ];
    for name in &names {
        raw.push((name.as_str(), "no_change".to_string()));
    }
    let params = TransitionParams::from_form(&form(&raw));

    let outcome = update_transitions(s.store.as_ref(), &ctx(), &params, false)
        .await
        .expect("update should succeed");

    assert_eq!(outcome.rows_written, 0);
    assert_eq!(s.store.all_transitions().await, before);
}

#[tokio::test]
async fn test_delta_update_merges_onto_baseline() {
    let s = setup_test_store_with_rules().await;
    let body = json!({
        "delta_update": true,
        "tracker_id": [s.bug],
        "role_id": [s.manager],
        "transitions": { s.new.to_string(): { s.resolved.to_string(): { "always": "1", "author": "no_change" } } }
    });
    let params = TransitionParams::from_json(&body);

    let outcome = update_transitions(s.store.as_ref(), &ctx(), &params, true)
        .await
        .expect("update should succeed");

    assert!(outcome.changed);
    assert_eq!(outcome.rows_written, 1);
    // Statuses New, Assigned, Resolved: 9 valid pairs, 3 conditions each.
    assert_eq!(outcome.cells_applied, 27);

    let keys = s.keys_for(s.bug, s.manager).await;
    assert_eq!(keys.len(), 4);
    assert!(keys.contains(&(s.new, s.resolved, Condition::Always)));
    assert!(!keys.contains(&(s.new, s.resolved, Condition::Author)));
}

#[tokio::test]
async fn test_delta_of_only_no_change_skips_storage() {
    let s = setup_test_store_with_rules().await;
    let failing = FailingStore { inner: s.store.clone() };
    let body = json!({
        "delta_update": true,
        "tracker_id": [s.bug],
        "role_id": [s.manager],
        "transitions": { s.new.to_string(): { s.assigned.to_string(): { "always": "no_change" } } }
    });
    let params = TransitionParams::from_json(&body);

    let outcome = update_transitions(&failing, &ctx(), &params, true)
        .await
        .expect("no storage call expected");

    assert!(!outcome.changed);
    assert_eq!(outcome.phase, UpdatePhase::Done);
    assert_eq!(outcome.rows_written, 0);
}

#[tokio::test]
async fn test_delta_drops_cells_outside_scope_but_full_form_applies_them() {
    let s = setup_test_store_with_rules().await;
    let rejected = s.store.add_status("Rejected").await;
    let before = s.store.all_transitions().await;

    // Rejected is unused, so the default used-statuses scope leaves it out.
    let body = json!({
        "delta_update": true,
        "tracker_id": [s.bug],
        "role_id": [s.manager],
        "transitions": { s.new.to_string(): { rejected.to_string(): { "always": "1" } } }
    });
    let params = TransitionParams::from_json(&body);

    let outcome = update_transitions(s.store.as_ref(), &ctx(), &params, true)
        .await
        .expect("update should succeed");
    assert_eq!(outcome.rows_written, 0);
    assert_eq!(s.store.all_transitions().await, before);

    // The same body without JSON delta handling is a full-form submission.
    let outcome = update_transitions(s.store.as_ref(), &ctx(), &params, false)
        .await
        .expect("update should succeed");
    assert_eq!(outcome.rows_written, 1);
    assert!(s.keys_for(s.bug, s.manager).await.contains(&(s.new, rejected, Condition::Always)));
}

#[tokio::test]
async fn test_missing_scope_or_transitions_is_rejected() {
    let s = setup_test_store_with_rules().await;
    let before = s.store.all_transitions().await;

    let no_roles = TransitionParams::from_form(&form(&[
        ("tracker_id[]", s.bug.to_string()),
        (cell(s.new, s.resolved, "always").as_str(), "1".into()),
    ]));
    let result = update_transitions(s.store.as_ref(), &ctx(), &no_roles, false).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == INVALID_PARAMETERS));

    let unknown_tracker = TransitionParams::from_form(&form(&[
        ("tracker_id[]", "999".into()),
        ("role_id[]", s.manager.to_string()),
        (cell(s.new, s.resolved, "always").as_str(), "1".into()),
    ]));
    let result = update_transitions(s.store.as_ref(), &ctx(), &unknown_tracker, false).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let no_transitions = TransitionParams::from_json(&json!({
        "tracker_id": [s.bug],
        "role_id": [s.manager]
    }));
    let result = update_transitions(s.store.as_ref(), &ctx(), &no_transitions, true).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let empty_transitions = TransitionParams::from_json(&json!({
        "delta_update": true,
        "tracker_id": [s.bug],
        "role_id": [s.manager],
        "transitions": {}
    }));
    let result = update_transitions(s.store.as_ref(), &ctx(), &empty_transitions, true).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == INVALID_PARAMETERS));

    assert_eq!(s.store.all_transitions().await, before);
}

#[tokio::test]
async fn test_storage_failure_leaves_rules_unchanged() {
    let s = setup_test_store_with_rules().await;
    let before = s.store.all_transitions().await;
    let failing = FailingStore { inner: s.store.clone() };
    let body = json!({
        "delta_update": true,
        "tracker_id": [s.bug],
        "role_id": [s.manager],
        "transitions": { s.new.to_string(): { s.resolved.to_string(): { "always": "1" } } }
    });
    let params = TransitionParams::from_json(&body);

    let result = update_transitions(&failing, &ctx(), &params, true).await;

    assert!(matches!(result, Err(AppError::Storage(_))));
    assert_eq!(s.store.all_transitions().await, before);
}

#[tokio::test]
async fn test_integrity_failure_rolls_back_valid_cells() {
    let s = setup_test_store_with_rules().await;
    let before = s.store.all_transitions().await;
    let params = TransitionParams::from_form(&form(&[
        ("tracker_id[]", s.bug.to_string()),
        ("role_id[]", s.manager.to_string()),
        (cell(s.new, s.resolved, "always").as_str(), "1".into()),
        (cell(s.new, 999, "always").as_str(), "1".into()),
    ]));

    let result = update_transitions(s.store.as_ref(), &ctx(), &params, false).await;

    assert!(matches!(result, Err(AppError::Storage(_))));
    assert_eq!(s.store.all_transitions().await, before);
}

#[tokio::test]
async fn test_update_applies_to_every_tracker_role_pair() {
    let s = setup_test_store().await;
    let params = TransitionParams::from_form(&form(&[
        ("tracker_id[]", s.bug.to_string()),
        ("tracker_id[]", s.feature.to_string()),
        ("role_id[]", "all".into()),
        (cell(NEW_ISSUE_STATUS, s.new, "always").as_str(), "1".into()),
    ]));

    let outcome = update_transitions(s.store.as_ref(), &ctx(), &params, false)
        .await
        .expect("update should succeed");

    // 2 trackers x 2 workflow roles; Anonymous does not take part.
    assert_eq!(outcome.rows_written, 4);
    assert!(s.keys_for(s.feature, s.developer).await.contains(&(NEW_ISSUE_STATUS, s.new, Condition::Always)));
    assert!(s.keys_for(s.bug, s.anonymous).await.is_empty());
}

#[tokio::test]
async fn test_all_roles_means_workflow_roles_only() {
    let s = setup_test_store().await;
    let params = ScopeParams {
        trackers: IdSelection::All,
        roles: IdSelection::All,
        used_statuses_only: Some(false),
    };
    let scope = resolve_scope(s.store.as_ref(), &params)
        .await
        .expect("resolve")
        .expect("scope present");
    assert_eq!(scope.tracker_ids(), vec![s.bug, s.feature]);
    assert_eq!(scope.role_ids(), vec![s.manager, s.developer]);

    let explicit = ScopeParams {
        roles: IdSelection::Ids(vec![s.anonymous]),
        ..params
    };
    let scope = resolve_scope(s.store.as_ref(), &explicit)
        .await
        .expect("resolve")
        .expect("scope present");
    assert_eq!(scope.role_ids(), vec![s.anonymous]);
}

#[tokio::test]
async fn test_used_statuses_only_narrows_and_falls_back() {
    let s = setup_test_store_with_rules().await;
    let rejected = s.store.add_status("Rejected").await;

    let used = ScopeParams {
        trackers: IdSelection::Ids(vec![s.bug]),
        roles: IdSelection::Ids(vec![s.manager]),
        used_statuses_only: Some(true),
    };
    let scope = resolve_scope(s.store.as_ref(), &used).await.expect("resolve").expect("scope");
    assert_eq!(scope.status_ids(), vec![s.new, s.assigned, s.resolved]);

    let every = ScopeParams { used_statuses_only: Some(false), ..used.clone() };
    let scope = resolve_scope(s.store.as_ref(), &every).await.expect("resolve").expect("scope");
    assert_eq!(scope.status_ids(), vec![s.new, s.assigned, s.resolved, rejected]);

    // Feature has no rules at all, so "used only" falls back to every status.
    let unused = ScopeParams {
        trackers: IdSelection::Ids(vec![s.feature]),
        ..used
    };
    let scope = resolve_scope(s.store.as_ref(), &unused).await.expect("resolve").expect("scope");
    assert_eq!(scope.statuses.len(), 4);
}

#[tokio::test]
async fn test_permissions_replace_and_clear() {
    let s = setup_test_store().await;
    let scope = form(&[
        ("tracker_id[]", s.bug.to_string()),
        ("role_id[]", s.manager.to_string()),
        ("role_id[]", s.developer.to_string()),
    ]);

    let mut raw = scope.clone();
    raw.push((format!("permissions[due_date][{}]", s.new), "required".into()));
    raw.push((format!("permissions[due_date][{}]", s.assigned), "readonly".into()));
    raw.push((format!("permissions[priority_id][{}]", s.new), "no_change".into()));
    let applied = update_permissions(s.store.as_ref(), &ctx(), &PermissionParams::from_form(&raw))
        .await
        .expect("update should succeed");
    assert_eq!(applied, 2);
    assert_eq!(s.store.all_permissions().await.len(), 4);

    let mut raw = scope;
    raw.push((format!("permissions[due_date][{}]", s.new), "".into()));
    update_permissions(s.store.as_ref(), &ctx(), &PermissionParams::from_form(&raw))
        .await
        .expect("update should succeed");

    let rows = s
        .store
        .permissions_in_scope(&[s.bug], &[s.manager, s.developer])
        .await
        .expect("read");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status_id == s.assigned && r.rule == PermissionRule::Readonly));

    let by_status = rules_by_status(&[s.new, s.assigned, s.resolved], &rows);
    assert!(by_status[&s.new].is_empty());
    assert!(by_status[&s.assigned]["due_date"].contains(&PermissionRule::Readonly));
    assert!(by_status[&s.resolved].is_empty());
}

#[tokio::test]
async fn test_permissions_without_entries_are_rejected() {
    let s = setup_test_store().await;
    let params = PermissionParams::from_form(&form(&[
        ("tracker_id[]", s.bug.to_string()),
        ("role_id[]", s.manager.to_string()),
    ]));
    let result = update_permissions(s.store.as_ref(), &ctx(), &params).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == INVALID_PARAMETERS));
}

#[tokio::test]
async fn test_copy_replaces_target_rules() {
    let s = setup_test_store_with_rules().await;
    s.store
        .insert_permission(PermissionRow {
            tracker_id: s.bug,
            role_id: s.manager,
            status_id: s.new,
            field_name: "due_date".into(),
            rule: PermissionRule::Required,
        })
        .await;
    // Existing target rule that the copy must remove.
    s.store
        .insert_transition(s.rule(s.feature, s.developer, s.resolved, s.new, Condition::Assignee))
        .await;

    let params = CopyParams {
        source_tracker: CopySource::Id(s.bug),
        source_role: CopySource::Id(s.manager),
        target_tracker_ids: vec![s.feature],
        target_role_ids: vec![s.developer],
    };
    let copied = copy_workflows(s.store.as_ref(), &ctx(), &params).await.expect("copy");

    assert_eq!(copied, 1);
    assert_eq!(s.keys_for(s.feature, s.developer).await, s.keys_for(s.bug, s.manager).await);
    let copied_permissions = s
        .store
        .permissions_in_scope(&[s.feature], &[s.developer])
        .await
        .expect("read");
    assert_eq!(copied_permissions.len(), 1);
    assert_eq!(s.keys_for(s.bug, s.manager).await.len(), 3);
}

#[tokio::test]
async fn test_copy_defaults_source_and_skips_self() {
    let s = setup_test_store_with_rules().await;
    let params = CopyParams {
        source_tracker: CopySource::Any,
        source_role: CopySource::Id(s.manager),
        target_tracker_ids: vec![s.bug, s.feature],
        target_role_ids: vec![s.manager, s.developer],
    };

    let copied = copy_workflows(s.store.as_ref(), &ctx(), &params).await.expect("copy");

    // (Bug, Manager) and (Feature, Manager) are their own source and are skipped.
    assert_eq!(copied, 2);
    assert_eq!(s.keys_for(s.bug, s.developer).await.len(), 3);
    assert!(s.keys_for(s.feature, s.developer).await.is_empty());
    assert_eq!(s.keys_for(s.bug, s.manager).await.len(), 3);
}

#[tokio::test]
async fn test_copy_requires_source_and_targets() {
    let s = setup_test_store_with_rules().await;

    let no_source = CopyParams {
        target_tracker_ids: vec![s.feature],
        target_role_ids: vec![s.developer],
        ..CopyParams::default()
    };
    let result = copy_workflows(s.store.as_ref(), &ctx(), &no_source).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == MISSING_SOURCE));

    let only_any = CopyParams {
        source_tracker: CopySource::Any,
        source_role: CopySource::Any,
        target_tracker_ids: vec![s.feature],
        target_role_ids: vec![s.developer],
    };
    let result = copy_workflows(s.store.as_ref(), &ctx(), &only_any).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == MISSING_SOURCE));

    let unknown_targets = CopyParams {
        source_tracker: CopySource::Id(s.bug),
        source_role: CopySource::Any,
        target_tracker_ids: vec![999],
        target_role_ids: vec![s.developer],
        ..CopyParams::default()
    };
    let result = copy_workflows(s.store.as_ref(), &ctx(), &unknown_targets).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == MISSING_TARGET));
}

#[tokio::test]
async fn test_copy_with_blank_source_role_copies_nothing() {
    let s = setup_test_store_with_rules().await;
    let before = s.store.all_transitions().await;

    let params = CopyParams::from_form(&form(&[
        ("source_tracker_id", s.bug.to_string()),
        ("source_role_id", String::new()),
        ("target_tracker_ids[]", s.feature.to_string()),
        ("target_role_ids[]", s.manager.to_string()),
        ("target_role_ids[]", s.developer.to_string()),
    ]));
    let result = copy_workflows(s.store.as_ref(), &ctx(), &params).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == MISSING_SOURCE));

    let params = CopyParams::from_form(&form(&[
        ("source_tracker_id", s.bug.to_string()),
        ("target_tracker_ids[]", s.feature.to_string()),
        ("target_role_ids[]", s.developer.to_string()),
    ]));
    let result = copy_workflows(s.store.as_ref(), &ctx(), &params).await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m == MISSING_SOURCE));

    assert_eq!(s.store.all_transitions().await, before);
}

#[tokio::test]
async fn test_workflow_counts_per_pair() {
    let s = setup_test_store_with_rules().await;
    s.store
        .insert_transition(s.rule(s.feature, s.developer, NEW_ISSUE_STATUS, s.new, Condition::Always))
        .await;

    let counts = s.store.workflow_counts().await.expect("counts");

    assert_eq!(
        counts,
        vec![
            WorkflowCount { tracker_id: s.bug, role_id: s.manager, count: 3 },
            WorkflowCount { tracker_id: s.feature, role_id: s.developer, count: 1 },
        ]
    );
}

#[tokio::test]
async fn test_edit_matrix_reflects_any_pair_in_scope() {
    let s = setup_test_store_with_rules().await;
    let store: Arc<dyn RuleStore> = s.dyn_store();
    let params = ScopeParams {
        trackers: IdSelection::Ids(vec![s.bug]),
        roles: IdSelection::All,
        used_statuses_only: Some(true),
    };
    let scope = resolve_scope(store.as_ref(), &params).await.expect("resolve").expect("scope");

    let matrix = build_from_store(store.as_ref(), &scope).await.expect("build");

    assert_eq!(matrix.len(), 27);
    assert_eq!(matrix.enabled_count(), 3);
    assert_eq!(matrix.get(&TransitionKey::new(s.assigned, s.resolved, Condition::Author)), Some(true));
    assert_eq!(matrix.get(&TransitionKey::new(s.assigned, s.resolved, Condition::Always)), Some(false));
}
