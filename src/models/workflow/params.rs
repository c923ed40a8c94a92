//! Request parameter parsing for the workflow editor.
//!
//! Both form bodies (`transitions[1][2][always]=1`, `tracker_id[]=3`) and JSON
//! bodies are reduced to the same flat shapes here, so everything past this
//! module works on typed values only.

use serde_json::Value;

use super::types::*;

/// A tracker or role selection: explicit ids, or the `all` keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSelection {
    All,
    Ids(Vec<i64>),
}

impl Default for IdSelection {
    fn default() -> Self {
        IdSelection::Ids(Vec::new())
    }
}

impl IdSelection {
    /// `["all"]` selects everything; anything else is a list of ids where
    /// blank or non-numeric entries are ignored.
    pub fn from_values(values: &[String]) -> Self {
        if values.len() == 1 && values[0] == "all" {
            return IdSelection::All;
        }
        let ids = values
            .iter()
            .filter_map(|v| v.trim().parse::<i64>().ok())
            .collect();
        IdSelection::Ids(ids)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, IdSelection::Ids(ids) if ids.is_empty())
    }
}

/// Tracker / role / status selection shared by every workflow page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeParams {
    pub trackers: IdSelection,
    pub roles: IdSelection,
    /// `None` when the request did not send `used_statuses_only`.
    pub used_statuses_only: Option<bool>,
}

impl ScopeParams {
    pub fn from_form(pairs: &[(String, String)]) -> Self {
        ScopeParams {
            trackers: IdSelection::from_values(&form_values(pairs, "tracker_id")),
            roles: IdSelection::from_values(&form_values(pairs, "role_id")),
            used_statuses_only: used_statuses_flag(form_values(pairs, "used_statuses_only").first()),
        }
    }

    /// Only statuses used by the selected trackers are shown unless `"0"` was sent.
    pub fn used_statuses_only(&self) -> bool {
        self.used_statuses_only.unwrap_or(true)
    }

    /// Fill whatever this selection left out from `other`.
    pub fn merge_missing(&mut self, other: ScopeParams) {
        if self.trackers.is_empty() {
            self.trackers = other.trackers;
        }
        if self.roles.is_empty() {
            self.roles = other.roles;
        }
        if self.used_statuses_only.is_none() {
            self.used_statuses_only = other.used_statuses_only;
        }
    }

    pub fn from_json(body: &Value) -> Self {
        let extra = body.get("extra");
        let pick = |name: &str| {
            let top = json_values(body.get(name));
            if !top.is_empty() {
                return top;
            }
            let bracketed = format!("{name}[]");
            extra
                .map(|e| {
                    let v = json_values(e.get(&bracketed));
                    if v.is_empty() { json_values(e.get(name)) } else { v }
                })
                .unwrap_or_default()
        };
        ScopeParams {
            trackers: IdSelection::from_values(&pick("tracker_id")),
            roles: IdSelection::from_values(&pick("role_id")),
            used_statuses_only: used_statuses_flag(pick("used_statuses_only").first()),
        }
    }
}

fn used_statuses_flag(value: Option<&String>) -> Option<bool> {
    value.map(|v| v != "0")
}

/// One raw `transitions[old][new][condition] = value` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedCell {
    pub old_status: String,
    pub new_status: String,
    pub condition: String,
    pub value: String,
}

/// Parsed cell: `Some(bool)` for an explicit value, `None` for `no_change`.
pub type ParsedCell = (TransitionKey, Option<bool>);

impl SubmittedCell {
    /// Returns `None` for a malformed entry (bad ids, unknown condition,
    /// a non-creation self-transition, or an unrecognised value).
    pub fn parse(&self) -> Option<ParsedCell> {
        let old_status_id = self.old_status.trim().parse::<StatusId>().ok()?;
        let new_status_id = self.new_status.trim().parse::<StatusId>().ok()?;
        if old_status_id < 0 || new_status_id <= 0 || !is_valid_pair(old_status_id, new_status_id) {
            return None;
        }
        let condition = self.condition.parse::<Condition>().ok()?;
        let value = match self.value.as_str() {
            NO_CHANGE => None,
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => return None,
        };
        Some((TransitionKey::new(old_status_id, new_status_id, condition), value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionParams {
    pub scope: ScopeParams,
    pub delta_update: bool,
    /// `None` when the payload carried no `transitions` map at all.
    pub transitions: Option<Vec<SubmittedCell>>,
}

impl TransitionParams {
    pub fn from_form(pairs: &[(String, String)]) -> Self {
        let mut cells = Vec::new();
        let mut present = false;
        for (key, value) in pairs {
            let Some(parts) = bracket_parts(key, "transitions") else {
                continue;
            };
            present = true;
            if let [old_status, new_status, condition] = parts.as_slice() {
                cells.push(SubmittedCell {
                    old_status: old_status.to_string(),
                    new_status: new_status.to_string(),
                    condition: condition.to_string(),
                    value: value.clone(),
                });
            }
        }
        TransitionParams {
            scope: ScopeParams::from_form(pairs),
            delta_update: false,
            transitions: present.then_some(cells),
        }
    }

    pub fn from_json(body: &Value) -> Self {
        let transitions = body.get("transitions").and_then(Value::as_object).map(|by_old| {
            let mut cells = Vec::new();
            for (old_status, by_new) in by_old {
                let Some(by_new) = by_new.as_object() else { continue };
                for (new_status, by_condition) in by_new {
                    let Some(by_condition) = by_condition.as_object() else { continue };
                    for (condition, value) in by_condition {
                        let Some(value) = scalar_string(value) else { continue };
                        cells.push(SubmittedCell {
                            old_status: old_status.clone(),
                            new_status: new_status.clone(),
                            condition: condition.clone(),
                            value,
                        });
                    }
                }
            }
            cells
        });
        TransitionParams {
            scope: ScopeParams::from_json(body),
            delta_update: body.get("delta_update").map(truthy).unwrap_or(false),
            transitions,
        }
    }
}

/// One raw `permissions[field][status_id] = rule` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedPermission {
    pub field_name: String,
    pub status: String,
    pub rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionParams {
    pub scope: ScopeParams,
    pub permissions: Option<Vec<SubmittedPermission>>,
}

impl PermissionParams {
    pub fn from_form(pairs: &[(String, String)]) -> Self {
        let mut entries = Vec::new();
        let mut present = false;
        for (key, value) in pairs {
            let Some(parts) = bracket_parts(key, "permissions") else {
                continue;
            };
            present = true;
            if let [field_name, status] = parts.as_slice() {
                entries.push(SubmittedPermission {
                    field_name: field_name.to_string(),
                    status: status.to_string(),
                    rule: value.clone(),
                });
            }
        }
        PermissionParams {
            scope: ScopeParams::from_form(pairs),
            permissions: present.then_some(entries),
        }
    }

    pub fn from_json(body: &Value) -> Self {
        let permissions = body.get("permissions").and_then(Value::as_object).map(|by_field| {
            let mut entries = Vec::new();
            for (field_name, by_status) in by_field {
                let Some(by_status) = by_status.as_object() else { continue };
                for (status, rule) in by_status {
                    let Some(rule) = scalar_string(rule) else { continue };
                    entries.push(SubmittedPermission {
                        field_name: field_name.clone(),
                        status: status.clone(),
                        rule,
                    });
                }
            }
            entries
        });
        PermissionParams {
            scope: ScopeParams::from_json(body),
            permissions,
        }
    }
}

/// A copy source selector as submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CopySource {
    /// Absent or blank.
    #[default]
    Missing,
    /// `any`: use each target's own tracker or role.
    Any,
    Id(i64),
}

impl CopySource {
    /// Non-numeric values name nothing and count as `Any`.
    pub fn from_value(value: Option<&String>) -> Self {
        match value.map(|v| v.trim()) {
            None | Some("") => CopySource::Missing,
            Some(v) => v.parse::<i64>().map(CopySource::Id).unwrap_or(CopySource::Any),
        }
    }

    pub fn id(self) -> Option<i64> {
        match self {
            CopySource::Id(id) => Some(id),
            _ => None,
        }
    }
}

/// Source and targets for copying workflow rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyParams {
    pub source_tracker: CopySource,
    pub source_role: CopySource,
    pub target_tracker_ids: Vec<TrackerId>,
    pub target_role_ids: Vec<RoleId>,
}

impl CopyParams {
    pub fn from_form(pairs: &[(String, String)]) -> Self {
        let source = |name: &str| CopySource::from_value(form_values(pairs, name).first());
        let ids = |name: &str| {
            form_values(pairs, name)
                .iter()
                .filter_map(|v| v.trim().parse::<i64>().ok())
                .collect::<Vec<_>>()
        };
        CopyParams {
            source_tracker: source("source_tracker_id"),
            source_role: source("source_role_id"),
            target_tracker_ids: ids("target_tracker_ids"),
            target_role_ids: ids("target_role_ids"),
        }
    }

    pub fn from_json(body: &Value) -> Self {
        let source = |name: &str| CopySource::from_value(json_values(body.get(name)).first());
        let ids = |name: &str| {
            json_values(body.get(name))
                .iter()
                .filter_map(|v| v.trim().parse::<i64>().ok())
                .collect::<Vec<_>>()
        };
        CopyParams {
            source_tracker: source("source_tracker_id"),
            source_role: source("source_role_id"),
            target_tracker_ids: ids("target_tracker_ids"),
            target_role_ids: ids("target_role_ids"),
        }
    }
}

/// All values for `name` or `name[]`, in submission order.
pub fn form_values(pairs: &[(String, String)], name: &str) -> Vec<String> {
    let bracketed = format!("{name}[]");
    pairs
        .iter()
        .filter(|(k, _)| k == name || *k == bracketed)
        .map(|(_, v)| v.clone())
        .collect()
}

/// Split `prefix[a][b][c]` into `["a", "b", "c"]`.
fn bracket_parts<'a>(key: &'a str, prefix: &str) -> Option<Vec<&'a str>> {
    let rest = key.strip_prefix(prefix)?.strip_prefix('[')?.strip_suffix(']')?;
    Some(rest.split("][").collect())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(v) => scalar_string(v).into_iter().collect(),
        None => Vec::new(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true" || s == "1",
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}
