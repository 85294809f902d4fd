use crate::catalog::ClassId;
use crate::grid::CellKey;
use crate::placement::{CellState, DragSource, MoveOutcome, PlacementEngine, PlacementError};
use crate::swap::SwapProposal;
use thiserror::Error;
use tracing::debug;

/// `dataTransfer.dropEffect` reported with the drag end event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEffect {
    None,
    Move,
    Copy,
    Link,
}

impl DropEffect {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "move" => Some(Self::Move),
            "copy" => Some(Self::Copy),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    pub key: CellKey,
    pub state: CellState,
    /// Set when a drop here would be rejected; drives the warning border.
    pub warning: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        source: DragSource,
        hover: Option<Hover>,
    },
}

impl DragState {
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dragging { hover: None, .. } => "dragging",
            Self::Dragging {
                hover: Some(h), ..
            } if h.warning => "hoveringInvalid",
            Self::Dragging { .. } => "hoveringValid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    Placed { class: ClassId, target: CellKey },
    Moved {
        class: ClassId,
        from: CellKey,
        to: CellKey,
    },
    Unchanged,
    SwapProposed(SwapProposal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEnd {
    /// The drop already finished the session.
    Idle,
    Cancelled,
    Unassigned { class: ClassId, from: CellKey },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragError {
    #[error("a drag is already in progress")]
    AlreadyDragging,
    #[error("no drag in progress")]
    NotDragging,
    #[error(transparent)]
    Placement(#[from] PlacementError),
}

impl DragError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyDragging => "drag_in_progress",
            Self::NotDragging => "not_dragging",
            Self::Placement(e) => e.code(),
        }
    }
}

/// Turns drag events into engine calls and keeps the hover highlight.
#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn start_from_pool(
        &mut self,
        engine: &PlacementEngine,
        class: ClassId,
    ) -> Result<(), DragError> {
        if self.is_dragging() {
            return Err(DragError::AlreadyDragging);
        }
        if !engine.grid().catalog().contains_class(&class) {
            return Err(PlacementError::UnknownClass(class).into());
        }
        if engine.grid().find_cell_of_class(&class).is_some() {
            return Err(PlacementError::AlreadyPlaced(class).into());
        }
        debug!(class = %class, "drag started from pool");
        self.state = DragState::Dragging {
            source: DragSource::Pool(class),
            hover: None,
        };
        Ok(())
    }

    pub fn start_from_cell(
        &mut self,
        engine: &PlacementEngine,
        origin: CellKey,
    ) -> Result<(), DragError> {
        if self.is_dragging() {
            return Err(DragError::AlreadyDragging);
        }
        let class = engine
            .grid()
            .get_cell(origin)
            .class
            .cloned()
            .ok_or(PlacementError::EmptyOrigin)?;
        debug!(class = %class, room = %engine.grid().room(origin).id, "drag started from cell");
        self.state = DragState::Dragging {
            source: DragSource::Cell { origin, class },
            hover: None,
        };
        Ok(())
    }

    pub fn enter(&mut self, engine: &PlacementEngine, key: CellKey) -> Result<Hover, DragError> {
        let DragState::Dragging { source, hover } = &mut self.state else {
            return Err(DragError::NotDragging);
        };
        let next = Hover {
            key,
            state: engine.classify(key),
            warning: !engine.can_place(key, source),
        };
        *hover = Some(next.clone());
        Ok(next)
    }

    pub fn leave(&mut self) {
        if let DragState::Dragging { hover, .. } = &mut self.state {
            *hover = None;
        }
    }

    /// Hands the drop to the engine. Transient state is cleared whatever the
    /// outcome.
    pub fn drop(
        &mut self,
        engine: &mut PlacementEngine,
        target: CellKey,
    ) -> Result<DropOutcome, DragError> {
        let DragState::Dragging { source, .. } = std::mem::take(&mut self.state) else {
            return Err(DragError::NotDragging);
        };
        match source {
            DragSource::Pool(class) => {
                engine.place_new(&class, target)?;
                Ok(DropOutcome::Placed { class, target })
            }
            DragSource::Cell { origin, class } => match engine.move_or_swap(origin, target)? {
                MoveOutcome::Unchanged => Ok(DropOutcome::Unchanged),
                MoveOutcome::Moved { .. } => Ok(DropOutcome::Moved {
                    class,
                    from: origin,
                    to: target,
                }),
                MoveOutcome::SwapProposed(p) => Ok(DropOutcome::SwapProposed(p)),
            },
        }
    }

    /// Drag end. With `unassign_on_drag_out`, a placed class released outside
    /// every drop target (`DropEffect::None`) leaves the grid.
    pub fn end(
        &mut self,
        engine: &mut PlacementEngine,
        effect: DropEffect,
        unassign_on_drag_out: bool,
    ) -> DragEnd {
        let DragState::Dragging { source, .. } = std::mem::take(&mut self.state) else {
            return DragEnd::Idle;
        };
        match source {
            DragSource::Cell { origin, class }
                if effect == DropEffect::None && unassign_on_drag_out =>
            {
                if engine.grid().get_cell(origin).class != Some(&class) {
                    return DragEnd::Cancelled;
                }
                engine.unassign(origin);
                DragEnd::Unassigned {
                    class,
                    from: origin,
                }
            }
            _ => DragEnd::Cancelled,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = DragState::Idle;
    }
}
