use crate::db::SqliteScheduleStore;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{with_session, with_session_mut, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::{SaveError, ScheduleSession};
use serde_json::{json, Value};

fn schedule_snapshot(s: &ScheduleSession) -> Result<Value, HandlerErr> {
    let snapshot = s.snapshot();
    Ok(json!({
        "assignments": snapshot.assignments,
        "fingerprint": snapshot.fingerprint(),
        "revision": s.revision(),
        "dirty": s.is_dirty()
    }))
}

fn handle_schedule_save(state: &mut AppState, req: &Request) -> Value {
    let AppState { db, session, .. } = state;
    let Some(open) = session.as_mut() else {
        return err(&req.id, "no_session", "open a schedule session first", None);
    };
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if !open.workspace_backed {
        return err(
            &req.id,
            "inline_session",
            "sessions opened from inline data cannot be saved",
            None,
        );
    }

    let mut store = SqliteScheduleStore::new(conn);
    match open.schedule.save(&mut store) {
        Ok(receipt) => ok(
            &req.id,
            json!({
                "saveId": receipt.save_id.to_string(),
                "savedAt": receipt.saved_at,
                "fingerprint": receipt.fingerprint,
                "assignments": receipt.assignments,
                "revision": open.schedule.revision()
            }),
        ),
        Err(e) => {
            let details = match &e {
                SaveError::PersistFailed { reverted, .. } => Some(json!({ "reverted": reverted })),
                SaveError::SwapPending => None,
            };
            err(&req.id, e.code(), e.to_string(), details)
        }
    }
}

fn schedule_revert(s: &mut ScheduleSession) -> Result<Value, HandlerErr> {
    let reverted = s.revert();
    Ok(json!({
        "reverted": reverted,
        "revision": s.revision(),
        "dirty": s.is_dirty()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "schedule.snapshot" => Some(with_session(state, req, schedule_snapshot)),
        "schedule.save" => Some(handle_schedule_save(state, req)),
        "schedule.revert" => Some(with_session_mut(state, req, schedule_revert)),
        _ => None,
    }
}
