use crate::db;
use crate::filters::ClassFilter;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::catalog::parse_catalog;
use crate::ipc::helpers::{drag_state_json, proposal_json, session_ref};
use crate::ipc::types::{AppState, OpenSession, Request};
use crate::session::ScheduleSession;
use crate::settings::{self, SchedulerSettings};
use crate::snapshot::GridSnapshot;
use serde_json::{json, Map, Value};

pub(crate) fn session_summary(open: &OpenSession) -> Value {
    let s = &open.schedule;
    let grid = s.grid();
    json!({
        "sessionId": s.id().to_string(),
        "workspaceBacked": open.workspace_backed,
        "revision": s.revision(),
        "dirty": s.is_dirty(),
        "days": grid.partition().days(),
        "timeSlots": grid.partition().time_slots(),
        "unassignOnDragOut": s.options().unassign_on_drag_out,
        "counts": {
            "rooms": grid.catalog().rooms().len(),
            "classes": grid.catalog().classes().len(),
            "cells": grid.cell_count(),
            "assigned": grid.assigned_count(),
            "unassigned": s.unassigned(&ClassFilter::default()).len()
        },
        "drag": drag_state_json(grid, s.drag_state()),
        "swap": s.pending_swap().map(|p| proposal_json(grid, p)),
        "lastSave": s.last_save().map(|r| json!({
            "saveId": r.save_id.to_string(),
            "savedAt": r.saved_at,
            "fingerprint": r.fingerprint,
            "assignments": r.assignments
        }))
    })
}

fn handle_session_open(state: &mut AppState, req: &Request) -> Value {
    let mut scheduler = match state.db.as_ref() {
        Some(conn) => match settings::load(conn) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        },
        None => SchedulerSettings::default(),
    };
    let mut overrides = Map::new();
    for key in ["days", "timeSlots", "unassignOnDragOut"] {
        if let Some(v) = req.params.get(key) {
            overrides.insert(key.to_string(), v.clone());
        }
    }
    if let Err(msg) = scheduler.merge_patch(&overrides) {
        return err(&req.id, "bad_params", msg, None);
    }
    let partition = match scheduler.partition() {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    let inline = req.params.get("rooms").is_some() || req.params.get("classes").is_some();
    let (catalog, snapshot) = if inline {
        let catalog = match parse_catalog(&req.params) {
            Ok(c) => c,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        };
        let snapshot: GridSnapshot = match req.params.get("schedule") {
            Some(v) => match serde_json::from_value(v.clone()) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "bad_params", format!("schedule: {}", e), None),
            },
            None => GridSnapshot::default(),
        };
        (catalog, snapshot)
    } else {
        let Some(conn) = state.db.as_ref() else {
            return err(
                &req.id,
                "no_workspace",
                "select a workspace or pass rooms and classes",
                None,
            );
        };
        let catalog = match db::load_catalog(conn) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        };
        let snapshot = match db::load_schedule(conn) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        };
        // A session that cannot show every saved row would delete the hidden
        // ones on its next save.
        let outside = snapshot
            .assignments
            .iter()
            .filter(|a| {
                partition.day_index(&a.cell.day).is_none()
                    || partition.slot_index(&a.cell.time_slot).is_none()
            })
            .count();
        if outside > 0 {
            return err(
                &req.id,
                "partition_mismatch",
                format!("{} saved assignments fall outside the requested days and time slots", outside),
                Some(json!({ "outsidePartition": outside })),
            );
        }
        (catalog, snapshot)
    };

    let schedule = match ScheduleSession::open(
        catalog,
        partition,
        &snapshot,
        scheduler.session_options(),
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };
    if let Some(prev) = state.session.take() {
        tracing::info!(
            session = %prev.schedule.id(),
            dirty = prev.schedule.is_dirty(),
            "replacing open session"
        );
    }
    let open = OpenSession {
        schedule,
        workspace_backed: !inline,
    };
    let summary = session_summary(&open);
    state.session = Some(open);
    ok(&req.id, summary)
}

fn handle_session_state(state: &mut AppState, req: &Request) -> Value {
    match session_ref(state, req) {
        Ok(open) => ok(&req.id, session_summary(open)),
        Err(resp) => resp,
    }
}

fn handle_session_close(state: &mut AppState, req: &Request) -> Value {
    let Some(open) = state.session.take() else {
        return ok(&req.id, json!({ "closed": false }));
    };
    let discarded = open.schedule.is_dirty();
    tracing::info!(session = %open.schedule.id(), discarded, "schedule session closed");
    ok(
        &req.id,
        json!({ "closed": true, "discardedChanges": discarded }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "session.open" => Some(handle_session_open(state, req)),
        "session.state" => Some(handle_session_state(state, req)),
        "session.close" => Some(handle_session_close(state, req)),
        _ => None,
    }
}
