use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::partition::TimePartition;
use crate::settings::{self, SchedulerSettings};
use rusqlite::Connection;
use serde_json::json;

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let scheduler = match settings::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "scheduler": scheduler }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    if section != "scheduler" {
        return err(&req.id, "bad_params", "unknown section", None);
    }
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match settings::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = current.merge_patch(patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    let partition = match current.partition() {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let pruned = match store_with_partition(conn, &current, &partition) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", format!("{e:#}"), None),
    };
    if pruned > 0 {
        tracing::info!(pruned, "saved assignments outside the new week dropped");
    }
    // An open session keeps the settings it was opened with.
    ok(
        &req.id,
        json!({ "ok": true, "scheduler": current, "prunedAssignments": pruned }),
    )
}

/// Saved assignments on a removed day or time slot go with the settings
/// change, so the stored schedule always loads.
fn store_with_partition(
    conn: &Connection,
    scheduler: &SchedulerSettings,
    partition: &TimePartition,
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    settings::store(&tx, scheduler)?;
    let pruned = db::prune_outside_partition(&tx, partition)?;
    tx.commit()?;
    Ok(pruned)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
