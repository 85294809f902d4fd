use crate::ipc::helpers::{proposal_json, with_session, with_session_mut, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::ScheduleSession;
use serde_json::{json, Value};
use uuid::Uuid;

fn swap_get(s: &ScheduleSession) -> Result<Value, HandlerErr> {
    Ok(json!({
        "open": s.pending_swap().is_some(),
        "proposal": s.pending_swap().map(|p| proposal_json(s.grid(), p))
    }))
}

fn swap_confirm(s: &mut ScheduleSession, req: &Request) -> Result<Value, HandlerErr> {
    let expected = match req.params.get("proposalId").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| HandlerErr::bad_params("proposalId must be a uuid"))?,
        ),
        None => None,
    };
    let proposal = s.confirm_swap(expected)?;
    Ok(json!({
        "swapped": proposal_json(s.grid(), &proposal),
        "revision": s.revision()
    }))
}

fn swap_cancel(s: &mut ScheduleSession) -> Result<Value, HandlerErr> {
    let proposal = s.cancel_swap()?;
    Ok(json!({ "cancelled": proposal_json(s.grid(), &proposal) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "swap.get" => Some(with_session(state, req, swap_get)),
        "swap.confirm" => Some(with_session_mut(state, req, |s| swap_confirm(s, req))),
        "swap.cancel" => Some(with_session_mut(state, req, swap_cancel)),
        _ => None,
    }
}
