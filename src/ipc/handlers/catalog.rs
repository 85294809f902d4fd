use crate::catalog::{Catalog, Class, Room, RoomId, RoomStatus};
use crate::db;
use crate::grid::GridError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::SessionError;
use serde_json::json;

pub(crate) fn parse_catalog(params: &serde_json::Value) -> Result<Catalog, String> {
    let rooms: Vec<Room> = match params.get("rooms") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| format!("rooms: {}", e))?,
        None => return Err("missing rooms".into()),
    };
    let classes: Vec<Class> = match params.get("classes") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| format!("classes: {}", e))?,
        None => return Err("missing classes".into()),
    };
    Catalog::new(rooms, classes).map_err(|e| e.to_string())
}

fn handle_catalog_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let catalog = match parse_catalog(&req.params) {
        Ok(c) => c,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let changes = match db::replace_catalog(conn, &catalog) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_update_failed", format!("{e:#}"), None),
    };
    tracing::info!(
        rooms = catalog.rooms().len(),
        classes = catalog.classes().len(),
        pruned = changes.pruned,
        relocated = changes.relocated,
        "catalog imported"
    );
    ok(
        &req.id,
        json!({
            "rooms": catalog.rooms().len(),
            "classes": catalog.classes().len(),
            "prunedAssignments": changes.pruned,
            "relocatedAssignments": changes.relocated
        }),
    )
}

fn handle_catalog_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match db::load_catalog(conn) {
        Ok(c) => ok(
            &req.id,
            json!({ "rooms": c.rooms(), "classes": c.classes() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

/// Admin status edit. Applies to the open session, and to the stored catalog
/// unless the session was opened from inline data.
fn handle_rooms_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() && state.session.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let write_storage = state.session.as_ref().map_or(true, |s| s.workspace_backed);
    let Some(room_raw) = req.params.get("roomId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing roomId", None);
    };
    let room = RoomId(room_raw.trim().to_string());
    let Some(status) = req
        .params
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(RoomStatus::parse)
    else {
        return err(
            &req.id,
            "bad_params",
            "status must be one of: available, unavailable",
            None,
        );
    };

    let mut known = false;
    let mut stored = false;
    let mut dropped_saved = 0;
    if let Some(conn) = state.db.as_ref().filter(|_| write_storage) {
        match db::set_room_status(conn, &room, status) {
            Ok(Some(n)) => {
                known = true;
                stored = true;
                dropped_saved = n;
            }
            Ok(None) => {}
            Err(e) => return err(&req.id, "db_update_failed", format!("{e:#}"), None),
        }
    }

    let mut evicted = Vec::new();
    if let Some(open) = state.session.as_mut() {
        match open.schedule.set_room_status(&room, status) {
            Ok(ev) => {
                known = true;
                evicted = ev
                    .into_iter()
                    .map(|(key, class)| {
                        json!({ "cell": open.schedule.grid().address(key), "classId": class })
                    })
                    .collect();
                // Storage just dropped the room's saved rows.
                if stored && status == RoomStatus::Unavailable {
                    if let Err(e) = open.schedule.forget_saved_room(&room) {
                        return err(&req.id, e.code(), e.to_string(), None);
                    }
                }
            }
            Err(SessionError::Grid(GridError::UnknownRoom(_))) => {}
            Err(e) => return err(&req.id, e.code(), e.to_string(), None),
        }
    }

    if !known {
        return err(
            &req.id,
            "not_found",
            "room not found",
            Some(json!({ "roomId": room })),
        );
    }
    tracing::info!(room = %room, status = status.as_str(), evicted = evicted.len(), "room status set");
    ok(
        &req.id,
        json!({
            "roomId": room,
            "status": status,
            "evicted": evicted,
            "droppedSavedAssignments": dropped_saved,
            "storageUpdated": stored
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.import" => Some(handle_catalog_import(state, req)),
        "catalog.get" => Some(handle_catalog_get(state, req)),
        "rooms.setStatus" => Some(handle_rooms_set_status(state, req)),
        _ => None,
    }
}
