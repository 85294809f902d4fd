use crate::db;
use crate::partition::{PartitionError, TimePartition, DEFAULT_DAYS, DEFAULT_TIME_SLOTS};
use crate::session::SessionOptions;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const SCHEDULER_KEY: &str = "setup.scheduler";

const MAX_DAYS: usize = 7;
const MAX_TIME_SLOTS: usize = 24;
const MAX_LABEL_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSettings {
    pub days: Vec<String>,
    pub time_slots: Vec<String>,
    pub unassign_on_drag_out: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS.iter().map(|s| s.to_string()).collect(),
            time_slots: DEFAULT_TIME_SLOTS.iter().map(|s| s.to_string()).collect(),
            unassign_on_drag_out: false,
        }
    }
}

impl SchedulerSettings {
    pub fn partition(&self) -> Result<TimePartition, PartitionError> {
        TimePartition::new(self.days.clone(), self.time_slots.clone())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            unassign_on_drag_out: self.unassign_on_drag_out,
        }
    }

    /// Applies a `setup.update` patch. Nothing changes unless every field in
    /// the patch is valid.
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        let mut next = self.clone();
        for (k, v) in patch {
            match k.as_str() {
                "days" => next.days = parse_label_list(v, k, MAX_DAYS)?,
                "timeSlots" => next.time_slots = parse_label_list(v, k, MAX_TIME_SLOTS)?,
                "unassignOnDragOut" => next.unassign_on_drag_out = parse_bool(v, k)?,
                _ => return Err(format!("unknown scheduler field: {}", k)),
            }
        }
        *self = next;
        Ok(())
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

pub(crate) fn parse_label_list(v: &Value, key: &str, max_items: usize) -> Result<Vec<String>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if items.is_empty() || items.len() > max_items {
        return Err(format!("{} must have 1..={} entries", key, max_items));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} must be an array of strings", key))?
            .trim();
        if s.is_empty() {
            return Err(format!("{} entries must not be empty", key));
        }
        if s.len() > MAX_LABEL_LEN {
            return Err(format!("{} entry length must be <= {}", key, MAX_LABEL_LEN));
        }
        if !seen.insert(s.to_string()) {
            return Err(format!("{} has duplicate entry {}", key, s));
        }
        out.push(s.to_string());
    }
    Ok(out)
}

/// Defaults with the saved section merged over them.
pub fn load(conn: &Connection) -> anyhow::Result<SchedulerSettings> {
    let mut current = SchedulerSettings::default();
    if let Some(saved) = db::settings_get_json(conn, SCHEDULER_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = current.merge_patch(saved_obj);
        }
    }
    Ok(current)
}

pub fn store(conn: &Connection, settings: &SchedulerSettings) -> anyhow::Result<()> {
    db::settings_set_json(conn, SCHEDULER_KEY, &serde_json::to_value(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn defaults_are_weekdays_and_four_slots() {
        let s = SchedulerSettings::default();
        assert_eq!(s.days.len(), 5);
        assert_eq!(s.time_slots[0], "07:00-10:00");
        assert!(!s.unassign_on_drag_out);
        assert_eq!(s.partition().unwrap(), TimePartition::default());
    }

    #[test]
    fn patch_trims_and_applies_fields() {
        let mut s = SchedulerSettings::default();
        s.merge_patch(&patch(json!({
            "days": [" Mon ", "Sat"],
            "unassignOnDragOut": true
        })))
        .unwrap();
        assert_eq!(s.days, vec!["Mon", "Sat"]);
        assert!(s.session_options().unassign_on_drag_out);
    }

    #[test]
    fn invalid_patch_changes_nothing() {
        let mut s = SchedulerSettings::default();
        let err = s
            .merge_patch(&patch(json!({
                "unassignOnDragOut": true,
                "days": ["Mon", "Mon"]
            })))
            .unwrap_err();
        assert!(err.contains("duplicate"), "{err}");
        assert_eq!(s, SchedulerSettings::default());
    }

    #[test]
    fn rejects_out_of_range_lists_and_unknown_fields() {
        let mut s = SchedulerSettings::default();
        assert!(s.merge_patch(&patch(json!({ "days": [] }))).is_err());
        assert!(s
            .merge_patch(&patch(json!({
                "days": ["1", "2", "3", "4", "5", "6", "7", "8"]
            })))
            .is_err());
        assert!(s
            .merge_patch(&patch(json!({ "timeSlots": ["a-very-long-time-slot-label"] })))
            .is_err());
        assert!(s.merge_patch(&patch(json!({ "colour": "red" }))).is_err());
        assert!(s
            .merge_patch(&patch(json!({ "unassignOnDragOut": "yes" })))
            .is_err());
    }
}
