use crate::filters::ClassFilter;
use crate::ipc::helpers::{
    cell_json, get_class_id, parse_cell, proposal_json, with_session, with_session_mut,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::placement::{DragSource, MoveOutcome, PlacementError};
use crate::session::ScheduleSession;
use serde_json::{json, Value};

fn grid_rows(s: &ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let grid = s.grid();
    let partition = grid.partition();
    let day = req.params.get("day").and_then(|v| v.as_str());
    let slot = req.params.get("timeSlot").and_then(|v| v.as_str());
    let day_idx = match day {
        Some(d) => Some(
            partition
                .day_index(d)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown day: {}", d)))?,
        ),
        None => None,
    };
    let slot_idx = match slot {
        Some(t) => Some(
            partition
                .slot_index(t)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown time slot: {}", t)))?,
        ),
        None => None,
    };

    let rows: Vec<Value> = grid
        .time_coordinates()
        .into_iter()
        .filter(|c| day_idx.map_or(true, |d| d == c.day) && slot_idx.map_or(true, |t| t == c.slot))
        .map(|coord| {
            let cells: Vec<Value> = grid
                .row(coord)
                .into_iter()
                .map(|key| cell_json(s.engine(), key))
                .collect();
            json!({
                "day": partition.days()[coord.day],
                "timeSlot": partition.time_slots()[coord.slot],
                "building": grid.building_label(coord),
                "floor": grid.floor_label(coord),
                "cells": cells
            })
        })
        .collect();
    Ok(json!({ "rows": rows }))
}

fn grid_cell(s: &ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let key = parse_cell(s.grid(), req, "cell")?;
    Ok(cell_json(s.engine(), key))
}

fn grid_unassigned(s: &ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let filter: ClassFilter = match req.params.get("filter") {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("filter: {}", e)))?,
        _ => ClassFilter::default(),
    };
    let classes = s.unassigned(&filter);
    Ok(json!({ "classes": classes }))
}

/// Pure predicate: never mutates, and answers with the rejection reason.
fn grid_can_place(s: &ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let target = parse_cell(s.grid(), req, "cell")?;
    let source = if req.params.get("origin").is_some() {
        let origin = parse_cell(s.grid(), req, "origin")?;
        match s.grid().get_cell(origin).class {
            Some(class) => DragSource::Cell {
                origin,
                class: class.clone(),
            },
            None => {
                let e = PlacementError::EmptyOrigin;
                return Ok(json!({ "canPlace": false, "reason": e.code(), "message": e.to_string() }));
            }
        }
    } else {
        DragSource::Pool(get_class_id(req, "classId")?)
    };
    Ok(match s.engine().check(target, &source) {
        Ok(()) => json!({ "canPlace": true }),
        Err(e) => json!({ "canPlace": false, "reason": e.code(), "message": e.to_string() }),
    })
}

fn grid_place_new(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let class = get_class_id(req, "classId")?;
    let target = parse_cell(s.grid(), req, "cell")?;
    s.place_new(&class, target)?;
    Ok(json!({
        "classId": class,
        "cell": s.grid().address(target),
        "revision": s.revision()
    }))
}

fn grid_move_or_swap(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let origin = parse_cell(s.grid(), req, "origin")?;
    let target = parse_cell(s.grid(), req, "target")?;
    let outcome = s.move_or_swap(origin, target)?;
    let grid = s.grid();
    Ok(match outcome {
        MoveOutcome::Unchanged => json!({ "outcome": "unchanged" }),
        MoveOutcome::Moved { class } => json!({
            "outcome": "moved",
            "classId": class,
            "from": grid.address(origin),
            "to": grid.address(target),
            "revision": s.revision()
        }),
        MoveOutcome::SwapProposed(p) => json!({
            "outcome": "swapProposed",
            "proposal": proposal_json(grid, &p)
        }),
    })
}

fn grid_unassign(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let key = parse_cell(s.grid(), req, "cell")?;
    let removed = s.unassign(key)?;
    Ok(json!({
        "classId": removed,
        "cell": s.grid().address(key),
        "revision": s.revision()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grid.get" => Some(with_session(state, req, |s| grid_rows(s, req))),
        "grid.cell" => Some(with_session(state, req, |s| grid_cell(s, req))),
        "grid.unassigned" => Some(with_session(state, req, |s| grid_unassigned(s, req))),
        "grid.canPlace" => Some(with_session(state, req, |s| grid_can_place(s, req))),
        "grid.placeNew" => Some(with_session_mut(state, req, |s| grid_place_new(s, req))),
        "grid.moveOrSwap" => Some(with_session_mut(state, req, |s| grid_move_or_swap(s, req))),
        "grid.unassign" => Some(with_session_mut(state, req, |s| grid_unassign(s, req))),
        _ => None,
    }
}
