use crate::drag::{DragEnd, DropEffect, DropOutcome};
use crate::ipc::helpers::{
    drag_state_json, get_class_id, hover_json, parse_cell, proposal_json, with_session_mut,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::ScheduleSession;
use serde_json::{json, Value};

fn drag_start(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    if req.params.get("origin").is_some() {
        let origin = parse_cell(s.grid(), req, "origin")?;
        s.drag_start_from_cell(origin)?;
    } else {
        let class = get_class_id(req, "classId")?;
        s.drag_start_from_pool(class)?;
    }
    Ok(drag_state_json(s.grid(), s.drag_state()))
}

fn drag_enter(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let key = parse_cell(s.grid(), req, "cell")?;
    let hover = s.drag_enter(key)?;
    Ok(json!({
        "phase": s.drag_state().phase(),
        "hover": hover_json(s.grid(), &hover)
    }))
}

fn drag_leave(s: &mut ScheduleSession, _req: &Request) -> Result<Value, HandlerErr> {
    s.drag_leave();
    Ok(drag_state_json(s.grid(), s.drag_state()))
}

fn drag_drop(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let target = parse_cell(s.grid(), req, "cell")?;
    let outcome = s.drag_drop(target)?;
    let grid = s.grid();
    Ok(match outcome {
        DropOutcome::Placed { class, target } => json!({
            "outcome": "placed",
            "classId": class,
            "to": grid.address(target),
            "revision": s.revision()
        }),
        DropOutcome::Moved { class, from, to } => json!({
            "outcome": "moved",
            "classId": class,
            "from": grid.address(from),
            "to": grid.address(to),
            "revision": s.revision()
        }),
        DropOutcome::Unchanged => json!({ "outcome": "unchanged" }),
        DropOutcome::SwapProposed(p) => json!({
            "outcome": "swapProposed",
            "proposal": proposal_json(grid, &p)
        }),
    })
}

fn drag_end(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    // Required: "none" can unassign, so it is never assumed.
    let effect = req
        .params
        .get("dropEffect")
        .and_then(|v| v.as_str())
        .and_then(DropEffect::parse)
        .ok_or_else(|| {
            HandlerErr::bad_params("dropEffect must be one of: none, move, copy, link")
        })?;
    Ok(match s.drag_end(effect) {
        DragEnd::Idle => json!({ "outcome": "idle" }),
        DragEnd::Cancelled => json!({ "outcome": "cancelled" }),
        DragEnd::Unassigned { class, from } => json!({
            "outcome": "unassigned",
            "classId": class,
            "from": s.grid().address(from),
            "revision": s.revision()
        }),
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let f: fn(&mut ScheduleSession, &Request) -> Result<Value, HandlerErr> =
        match req.method.as_str() {
            "drag.start" => drag_start,
            "drag.enter" => drag_enter,
            "drag.leave" => drag_leave,
            "drag.drop" => drag_drop,
            "drag.end" => drag_end,
            _ => return None,
        };
    Some(with_session_mut(state, req, |s| f(s, req)))
}
