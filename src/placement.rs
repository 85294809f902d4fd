use crate::catalog::{Catalog, ClassId, RoomId, RoomStatus};
use crate::grid::{CellKey, CellsBaseline, GridError, GridStore};
use crate::partition::TimePartition;
use crate::snapshot::GridSnapshot;
use crate::swap::{SwapProposal, SwapSide};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapRejection {
    #[error("room {0} became unavailable")]
    RoomUnavailable(RoomId),
    #[error("cell in room {0} changed since the swap was proposed")]
    CellChanged(RoomId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("room {room} is unavailable")]
    UnavailableRoom { room: RoomId },
    #[error("cell in room {room} is already occupied by class {occupant}")]
    CellOccupied { room: RoomId, occupant: ClassId },
    #[error("swap rejected: {0}")]
    SwapRejected(SwapRejection),
    #[error("class {0} is already placed")]
    AlreadyPlaced(ClassId),
    #[error("unknown class: {0}")]
    UnknownClass(ClassId),
    #[error("origin cell is empty")]
    EmptyOrigin,
    #[error("origin cell no longer holds class {0}")]
    OriginChanged(ClassId),
}

impl PlacementError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnavailableRoom { .. } => "unavailable_room",
            Self::CellOccupied { .. } => "cell_occupied",
            Self::SwapRejected(_) => "swap_rejected",
            Self::AlreadyPlaced(_) => "already_placed",
            Self::UnknownClass(_) => "unknown_class",
            Self::EmptyOrigin => "empty_origin",
            Self::OriginChanged(_) => "origin_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Cell(#[from] GridError),
    #[error("assignment references unknown class {0}")]
    UnknownClass(ClassId),
    #[error("class {0} is assigned more than once")]
    DuplicateClass(ClassId),
    #[error("classes {first} and {second} share a cell in room {room}")]
    CellConflict {
        room: RoomId,
        first: ClassId,
        second: ClassId,
    },
    #[error("class {class} is assigned to unavailable room {room}")]
    UnavailableRoom { room: RoomId, class: ClassId },
}

impl SnapshotError {
    pub fn code(&self) -> &'static str {
        "bad_snapshot"
    }
}

/// What a drop target currently is, from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "classId", rename_all = "camelCase")]
pub enum CellState {
    Unavailable,
    Occupied(ClassId),
    Empty,
}

/// The class being dragged and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragSource {
    Pool(ClassId),
    Cell { origin: CellKey, class: ClassId },
}

impl DragSource {
    pub fn class(&self) -> &ClassId {
        match self {
            Self::Pool(class) | Self::Cell { class, .. } => class,
        }
    }

    pub fn origin(&self) -> Option<CellKey> {
        match self {
            Self::Pool(_) => None,
            Self::Cell { origin, .. } => Some(*origin),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Unchanged,
    Moved { class: ClassId },
    SwapProposed(SwapProposal),
}

/// Sole writer of the grid. Every mutation is validated here.
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    grid: GridStore,
}

impl PlacementEngine {
    pub fn new(grid: GridStore) -> Self {
        Self { grid }
    }

    /// Builds the grid and loads a pre-populated schedule, refusing any
    /// snapshot that breaks a placement invariant.
    pub fn from_snapshot(
        catalog: Catalog,
        partition: TimePartition,
        snapshot: &GridSnapshot,
    ) -> Result<Self, SnapshotError> {
        let mut grid = GridStore::new(catalog, partition);
        let mut seen: HashSet<&ClassId> = HashSet::with_capacity(snapshot.len());

        for a in &snapshot.assignments {
            let key = grid.resolve(&a.cell)?;
            if !grid.catalog().contains_class(&a.class_id) {
                return Err(SnapshotError::UnknownClass(a.class_id.clone()));
            }
            if !seen.insert(&a.class_id) {
                return Err(SnapshotError::DuplicateClass(a.class_id.clone()));
            }
            let cell = grid.get_cell(key);
            if !cell.room.is_available() {
                return Err(SnapshotError::UnavailableRoom {
                    room: cell.room.id.clone(),
                    class: a.class_id.clone(),
                });
            }
            if let Some(existing) = cell.class {
                return Err(SnapshotError::CellConflict {
                    room: cell.room.id.clone(),
                    first: existing.clone(),
                    second: a.class_id.clone(),
                });
            }
            grid.set_cell(key, Some(a.class_id.clone()));
        }

        debug!(
            assignments = snapshot.len(),
            cells = grid.cell_count(),
            "grid loaded from snapshot"
        );
        Ok(Self::new(grid))
    }

    pub fn grid(&self) -> &GridStore {
        &self.grid
    }

    pub fn classify(&self, key: CellKey) -> CellState {
        let cell = self.grid.get_cell(key);
        if !cell.room.is_available() {
            return CellState::Unavailable;
        }
        match cell.class {
            Some(class) => CellState::Occupied(class.clone()),
            None => CellState::Empty,
        }
    }

    /// The one placement rule. Live hover highlighting and every commit go
    /// through here.
    pub fn check(&self, target: CellKey, source: &DragSource) -> Result<(), PlacementError> {
        let cell = self.grid.get_cell(target);
        match source {
            DragSource::Pool(class) => {
                if !self.grid.catalog().contains_class(class) {
                    return Err(PlacementError::UnknownClass(class.clone()));
                }
                if self.grid.find_cell_of_class(class).is_some() {
                    return Err(PlacementError::AlreadyPlaced(class.clone()));
                }
                if !cell.room.is_available() {
                    return Err(PlacementError::UnavailableRoom {
                        room: cell.room.id.clone(),
                    });
                }
                if let Some(occupant) = cell.class {
                    return Err(PlacementError::CellOccupied {
                        room: cell.room.id.clone(),
                        occupant: occupant.clone(),
                    });
                }
                Ok(())
            }
            DragSource::Cell { origin, class } => {
                if self.grid.get_cell(*origin).class != Some(class) {
                    return Err(PlacementError::OriginChanged(class.clone()));
                }
                if *origin == target {
                    return Ok(());
                }
                if !cell.room.is_available() {
                    return Err(PlacementError::UnavailableRoom {
                        room: cell.room.id.clone(),
                    });
                }
                Ok(())
            }
        }
    }

    pub fn can_place(&self, target: CellKey, source: &DragSource) -> bool {
        self.check(target, source).is_ok()
    }

    pub fn place_new(&mut self, class: &ClassId, target: CellKey) -> Result<(), PlacementError> {
        self.check(target, &DragSource::Pool(class.clone()))?;
        self.grid.set_cell(target, Some(class.clone()));
        info!(class = %class, room = %self.grid.room(target).id, "class placed");
        Ok(())
    }

    /// Moves a placed class into an empty cell, or proposes a swap when the
    /// target is occupied. A proposal leaves the grid untouched.
    pub fn move_or_swap(
        &mut self,
        origin: CellKey,
        target: CellKey,
    ) -> Result<MoveOutcome, PlacementError> {
        if origin == target {
            return Ok(MoveOutcome::Unchanged);
        }
        let class = self
            .grid
            .get_cell(origin)
            .class
            .cloned()
            .ok_or(PlacementError::EmptyOrigin)?;
        self.check(
            target,
            &DragSource::Cell {
                origin,
                class: class.clone(),
            },
        )?;

        match self.grid.get_cell(target).class.cloned() {
            None => {
                self.grid.set_cell(target, Some(class.clone()));
                self.grid.set_cell(origin, None);
                info!(
                    class = %class,
                    from = %self.grid.room(origin).id,
                    to = %self.grid.room(target).id,
                    "class moved"
                );
                Ok(MoveOutcome::Moved { class })
            }
            Some(occupant) => {
                let proposal = SwapProposal::new(
                    SwapSide { key: origin, class },
                    SwapSide {
                        key: target,
                        class: occupant,
                    },
                );
                debug!(proposal = %proposal.id(), "swap proposed");
                Ok(MoveOutcome::SwapProposed(proposal))
            }
        }
    }

    /// Applies both halves of a swap or neither. The proposal is re-checked
    /// against the current grid first.
    pub fn commit_swap(&mut self, proposal: &SwapProposal) -> Result<(), PlacementError> {
        for side in [&proposal.from, &proposal.to] {
            let cell = self.grid.get_cell(side.key);
            if !cell.room.is_available() {
                warn!(proposal = %proposal.id(), room = %cell.room.id, "swap target became unavailable");
                return Err(PlacementError::SwapRejected(SwapRejection::RoomUnavailable(
                    cell.room.id.clone(),
                )));
            }
            if cell.class != Some(&side.class) {
                warn!(proposal = %proposal.id(), room = %cell.room.id, "swap cell changed");
                return Err(PlacementError::SwapRejected(SwapRejection::CellChanged(
                    cell.room.id.clone(),
                )));
            }
        }

        self.grid
            .set_cell(proposal.from.key, Some(proposal.to.class.clone()));
        self.grid
            .set_cell(proposal.to.key, Some(proposal.from.class.clone()));
        info!(
            proposal = %proposal.id(),
            first = %proposal.from.class,
            second = %proposal.to.class,
            "classes swapped"
        );
        Ok(())
    }

    pub fn unassign(&mut self, key: CellKey) -> Option<ClassId> {
        let removed = self.grid.set_cell(key, None);
        if let Some(class) = &removed {
            info!(class = %class, room = %self.grid.room(key).id, "class unassigned");
        }
        removed
    }

    /// Admin status edit. Making a room unavailable evicts every class it
    /// holds; the evicted placements are returned.
    pub fn set_room_status(
        &mut self,
        room: &RoomId,
        status: RoomStatus,
    ) -> Result<Vec<(CellKey, ClassId)>, GridError> {
        let position = self
            .grid
            .catalog()
            .room_position(room)
            .ok_or_else(|| GridError::UnknownRoom(room.clone()))?;
        let previous = self.grid.catalog_mut().set_room_status(position, status);

        let mut evicted = Vec::new();
        if status == RoomStatus::Unavailable {
            for key in self.grid.keys_of_room(position) {
                if let Some(class) = self.grid.set_cell(key, None) {
                    evicted.push((key, class));
                }
            }
        }
        info!(
            room = %room,
            from = previous.as_str(),
            to = status.as_str(),
            evicted = evicted.len(),
            "room status changed"
        );
        Ok(evicted)
    }

    /// Returns the grid to `baseline`, except that unavailable rooms stay empty.
    pub fn restore(&mut self, baseline: &CellsBaseline) -> usize {
        self.grid.restore_where(baseline, |room| room.is_available())
    }
}
