use crate::catalog::ClassId;
use crate::drag::{DragState, Hover};
use crate::grid::{CellAddress, CellKey, GridStore};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, OpenSession, Request};
use crate::placement::{DragSource, PlacementEngine};
use crate::session::{ScheduleSession, SessionError};
use crate::swap::SwapProposal;
use serde_json::{json, Value};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<SessionError> for HandlerErr {
    fn from(e: SessionError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn get_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn get_class_id(req: &Request, key: &str) -> Result<ClassId, HandlerErr> {
    match get_str(req, key).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(ClassId(s.to_string())),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn session_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a OpenSession, Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_session", "open a schedule session first", None))
}

pub fn session_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut OpenSession, Value> {
    state
        .session
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_session", "open a schedule session first", None))
}

/// Resolves `params[key]` (a wire cell address) to a key of `grid`.
pub fn parse_cell(grid: &GridStore, req: &Request, key: &str) -> Result<CellKey, HandlerErr> {
    let Some(raw) = req.params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    let addr: CellAddress = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("{} must be a cell address: {}", key, e)))?;
    grid.resolve(&addr).map_err(|e| HandlerErr {
        code: e.code(),
        message: e.to_string(),
        details: Some(json!({ key: addr })),
    })
}

pub fn cell_json(engine: &PlacementEngine, key: CellKey) -> Value {
    let grid = engine.grid();
    let cell = grid.get_cell(key);
    json!({
        "cell": grid.address(key),
        "room": cell.room,
        "classId": cell.class,
        "state": engine.classify(key),
    })
}

pub fn proposal_json(grid: &GridStore, p: &SwapProposal) -> Value {
    json!({
        "proposalId": p.id().to_string(),
        "from": { "cell": grid.address(p.from.key), "classId": p.from.class },
        "to": { "cell": grid.address(p.to.key), "classId": p.to.class },
    })
}

pub fn hover_json(grid: &GridStore, h: &Hover) -> Value {
    json!({
        "cell": grid.address(h.key),
        "state": h.state,
        "warning": h.warning,
    })
}

pub fn source_json(grid: &GridStore, source: &DragSource) -> Value {
    match source {
        DragSource::Pool(class) => json!({ "kind": "pool", "classId": class }),
        DragSource::Cell { origin, class } => json!({
            "kind": "cell",
            "classId": class,
            "origin": grid.address(*origin),
        }),
    }
}

pub fn drag_state_json(grid: &GridStore, state: &DragState) -> Value {
    match state {
        DragState::Idle => json!({ "phase": state.phase() }),
        DragState::Dragging { source, hover } => json!({
            "phase": state.phase(),
            "source": source_json(grid, source),
            "hover": hover.as_ref().map(|h| hover_json(grid, h)),
        }),
    }
}

/// Runs `f` against the open session and wraps the result as a response.
pub fn with_session(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&ScheduleSession) -> Result<Value, HandlerErr>,
) -> Value {
    match session_ref(state, req) {
        Ok(open) => match f(&open.schedule) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        },
        Err(resp) => resp,
    }
}

pub fn with_session_mut(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut ScheduleSession) -> Result<Value, HandlerErr>,
) -> Value {
    match session_mut(state, req) {
        Ok(open) => match f(&mut open.schedule) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        },
        Err(resp) => resp,
    }
}
