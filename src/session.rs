use crate::catalog::{Catalog, Class, ClassId, RoomId, RoomStatus};
use crate::drag::{DragController, DragEnd, DragError, DragState, DropEffect, DropOutcome, Hover};
use crate::filters::ClassFilter;
use crate::grid::{CellKey, CellsBaseline, GridError, GridStore};
use crate::partition::TimePartition;
use crate::placement::{DragSource, MoveOutcome, PlacementEngine, PlacementError, SnapshotError};
use crate::snapshot::GridSnapshot;
use crate::swap::{SwapError, SwapProposal, SwapWorkflow};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub unassign_on_drag_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub save_id: Uuid,
    pub saved_at: String,
    pub fingerprint: String,
    pub assignments: usize,
}

/// Destination of an explicit save.
pub trait SchedulePersistence {
    fn persist(&mut self, snapshot: &GridSnapshot) -> anyhow::Result<SaveReceipt>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a swap proposal is awaiting confirmation")]
    SwapPending,
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    Drag(#[from] DragError),
    #[error(transparent)]
    Swap(#[from] SwapError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SwapPending => "swap_pending",
            Self::Placement(e) => e.code(),
            Self::Drag(e) => e.code(),
            Self::Swap(e) => e.code(),
            Self::Grid(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("a swap proposal is awaiting confirmation")]
    SwapPending,
    #[error("save failed, {reverted} cells reverted to the last saved state: {message}")]
    PersistFailed { reverted: usize, message: String },
}

impl SaveError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SwapPending => "swap_pending",
            Self::PersistFailed { .. } => "persist_failed",
        }
    }
}

/// One scheduling session: the engine, the drag controller and the swap
/// workflow, plus save bookkeeping. Every grid mutation goes through here.
#[derive(Debug)]
pub struct ScheduleSession {
    id: Uuid,
    engine: PlacementEngine,
    drag: DragController,
    swap: SwapWorkflow,
    options: SessionOptions,
    revision: u64,
    saved_revision: u64,
    baseline: CellsBaseline,
    last_save: Option<SaveReceipt>,
}

impl ScheduleSession {
    pub fn open(
        catalog: Catalog,
        partition: TimePartition,
        snapshot: &GridSnapshot,
        options: SessionOptions,
    ) -> Result<Self, SnapshotError> {
        let engine = PlacementEngine::from_snapshot(catalog, partition, snapshot)?;
        let baseline = engine.grid().capture();
        let id = Uuid::new_v4();
        info!(
            session = %id,
            rooms = engine.grid().catalog().rooms().len(),
            classes = engine.grid().catalog().classes().len(),
            assigned = engine.grid().assigned_count(),
            "schedule session opened"
        );
        Ok(Self {
            id,
            engine,
            drag: DragController::default(),
            swap: SwapWorkflow::default(),
            options,
            revision: 0,
            saved_revision: 0,
            baseline,
            last_save: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn grid(&self) -> &GridStore {
        self.engine.grid()
    }

    pub fn engine(&self) -> &PlacementEngine {
        &self.engine
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn drag_state(&self) -> &DragState {
        self.drag.state()
    }

    pub fn pending_swap(&self) -> Option<&SwapProposal> {
        self.swap.pending()
    }

    pub fn last_save(&self) -> Option<&SaveReceipt> {
        self.last_save.as_ref()
    }

    fn guard_no_proposal(&self) -> Result<(), SessionError> {
        if self.swap.is_open() {
            return Err(SessionError::SwapPending);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn unassigned(&self, filter: &ClassFilter) -> Vec<&Class> {
        self.grid()
            .unassigned_classes()
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect()
    }

    pub fn can_place(&self, target: CellKey, source: &DragSource) -> bool {
        self.engine.can_place(target, source)
    }

    pub fn place_new(&mut self, class: &ClassId, target: CellKey) -> Result<(), SessionError> {
        self.guard_no_proposal()?;
        self.engine.place_new(class, target)?;
        self.touch();
        Ok(())
    }

    /// Direct move/swap request. A swap outcome opens the confirmation
    /// workflow.
    pub fn move_or_swap(
        &mut self,
        origin: CellKey,
        target: CellKey,
    ) -> Result<MoveOutcome, SessionError> {
        self.guard_no_proposal()?;
        if self.drag.is_dragging() {
            return Err(DragError::AlreadyDragging.into());
        }
        let outcome = self.engine.move_or_swap(origin, target)?;
        match &outcome {
            MoveOutcome::Moved { .. } => self.touch(),
            MoveOutcome::SwapProposed(p) => {
                self.swap.propose(p.clone())?;
            }
            MoveOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    pub fn unassign(&mut self, key: CellKey) -> Result<Option<ClassId>, SessionError> {
        self.guard_no_proposal()?;
        let removed = self.engine.unassign(key);
        if removed.is_some() {
            self.touch();
        }
        Ok(removed)
    }

    pub fn drag_start_from_pool(&mut self, class: ClassId) -> Result<(), SessionError> {
        self.guard_no_proposal()?;
        self.drag.start_from_pool(&self.engine, class)?;
        Ok(())
    }

    pub fn drag_start_from_cell(&mut self, origin: CellKey) -> Result<(), SessionError> {
        self.guard_no_proposal()?;
        self.drag.start_from_cell(&self.engine, origin)?;
        Ok(())
    }

    pub fn drag_enter(&mut self, key: CellKey) -> Result<Hover, SessionError> {
        Ok(self.drag.enter(&self.engine, key)?)
    }

    pub fn drag_leave(&mut self) {
        self.drag.leave();
    }

    pub fn drag_drop(&mut self, target: CellKey) -> Result<DropOutcome, SessionError> {
        let outcome = self.drag.drop(&mut self.engine, target)?;
        match &outcome {
            DropOutcome::Placed { .. } | DropOutcome::Moved { .. } => self.touch(),
            DropOutcome::SwapProposed(p) => {
                self.swap.propose(p.clone())?;
            }
            DropOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    pub fn drag_end(&mut self, effect: DropEffect) -> DragEnd {
        let end = self
            .drag
            .end(&mut self.engine, effect, self.options.unassign_on_drag_out);
        if matches!(end, DragEnd::Unassigned { .. }) {
            self.touch();
        }
        end
    }

    pub fn confirm_swap(&mut self, expected: Option<Uuid>) -> Result<SwapProposal, SessionError> {
        let proposal = self.swap.confirm(&mut self.engine, expected)?;
        self.touch();
        Ok(proposal)
    }

    pub fn cancel_swap(&mut self) -> Result<SwapProposal, SessionError> {
        Ok(self.swap.cancel()?)
    }

    pub fn set_room_status(
        &mut self,
        room: &RoomId,
        status: RoomStatus,
    ) -> Result<Vec<(CellKey, ClassId)>, SessionError> {
        let evicted = self.engine.set_room_status(room, status)?;
        if !evicted.is_empty() {
            self.touch();
        }
        Ok(evicted)
    }

    /// Storage dropped the saved assignments of `room`. The baseline follows
    /// so that a later revert cannot bring them back as "saved".
    pub fn forget_saved_room(&mut self, room: &RoomId) -> Result<usize, SessionError> {
        let position = self
            .grid()
            .catalog()
            .room_position(room)
            .ok_or_else(|| GridError::UnknownRoom(room.clone()))?;
        let cleared = self.engine.grid().clear_room_in(&mut self.baseline, position);
        self.sync_saved_revision();
        Ok(cleared)
    }

    pub fn snapshot(&self) -> GridSnapshot {
        self.grid().snapshot()
    }

    /// Hands the current grid to `sink`. A failed save restores the last
    /// saved state so the grid never runs ahead of storage.
    pub fn save(&mut self, sink: &mut dyn SchedulePersistence) -> Result<SaveReceipt, SaveError> {
        if self.swap.is_open() {
            return Err(SaveError::SwapPending);
        }
        let snapshot = self.snapshot();
        match sink.persist(&snapshot) {
            Ok(receipt) => {
                self.baseline = self.grid().capture();
                self.saved_revision = self.revision;
                info!(
                    session = %self.id,
                    save = %receipt.save_id,
                    assignments = receipt.assignments,
                    "schedule saved"
                );
                self.last_save = Some(receipt.clone());
                Ok(receipt)
            }
            Err(e) => {
                let reverted = self.rollback();
                warn!(session = %self.id, reverted, error = %e, "schedule save failed, rolled back");
                Err(SaveError::PersistFailed {
                    reverted,
                    message: format!("{e:#}"),
                })
            }
        }
    }

    /// Discards everything since the last save.
    pub fn revert(&mut self) -> usize {
        let reverted = self.rollback();
        info!(session = %self.id, reverted, "schedule reverted");
        reverted
    }

    fn rollback(&mut self) -> usize {
        self.drag.reset();
        self.swap.clear();
        let reverted = self.engine.restore(&self.baseline);
        if reverted > 0 {
            self.touch();
        }
        self.sync_saved_revision();
        reverted
    }

    // Rooms closed since the save keep their cells empty, so the grid can
    // still differ from the baseline after a rollback.
    fn sync_saved_revision(&mut self) {
        if self.grid().capture() == self.baseline {
            self.saved_revision = self.revision;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Assignment;
    use crate::test_fixtures::{class_id, sample_catalog};
    use anyhow::anyhow;

    struct MemorySink {
        saved: Vec<GridSnapshot>,
        fail: bool,
    }

    impl SchedulePersistence for MemorySink {
        fn persist(&mut self, snapshot: &GridSnapshot) -> anyhow::Result<SaveReceipt> {
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            self.saved.push(snapshot.clone());
            Ok(SaveReceipt {
                save_id: Uuid::new_v4(),
                saved_at: "2026-10-19T08:00:00+00:00".to_string(),
                fingerprint: snapshot.fingerprint(),
                assignments: snapshot.len(),
            })
        }
    }

    fn session(options: SessionOptions) -> ScheduleSession {
        ScheduleSession::open(
            sample_catalog(),
            TimePartition::default(),
            &GridSnapshot::default(),
            options,
        )
        .unwrap()
    }

    fn mon(s: &ScheduleSession, room: &str) -> CellKey {
        s.grid()
            .key_for("Mon", "07:00-10:00", &RoomId::from(room))
            .unwrap()
    }

    #[test]
    fn drag_swap_confirm_flow() {
        let mut s = session(SessionOptions::default());
        let (a1, a2) = (mon(&s, "A1"), mon(&s, "A2"));
        s.place_new(&class_id("X"), a1).unwrap();
        s.place_new(&class_id("Y"), a2).unwrap();

        s.drag_start_from_cell(a1).unwrap();
        let hover = s.drag_enter(a2).unwrap();
        assert!(!hover.warning);
        let out = s.drag_drop(a2).unwrap();
        let DropOutcome::SwapProposed(p) = out else {
            panic!("expected a swap proposal");
        };
        assert_eq!(s.pending_swap().map(|p| p.id()), Some(p.id()));
        assert_eq!(s.grid().get_cell(a1).class, Some(&class_id("X")));

        s.confirm_swap(Some(p.id())).unwrap();
        assert!(s.pending_swap().is_none());
        assert_eq!(s.grid().get_cell(a1).class, Some(&class_id("Y")));
        assert_eq!(s.grid().get_cell(a2).class, Some(&class_id("X")));
    }

    #[test]
    fn drags_and_mutations_are_blocked_while_a_proposal_is_open() {
        let mut s = session(SessionOptions::default());
        let (a1, a2) = (mon(&s, "A1"), mon(&s, "A2"));
        s.place_new(&class_id("X"), a1).unwrap();
        s.place_new(&class_id("Y"), a2).unwrap();
        s.move_or_swap(a1, a2).unwrap();

        assert_eq!(
            s.drag_start_from_pool(class_id("Z")),
            Err(SessionError::SwapPending)
        );
        assert_eq!(s.drag_start_from_cell(a2), Err(SessionError::SwapPending));
        assert_eq!(
            s.place_new(&class_id("Z"), mon(&s, "B2")),
            Err(SessionError::SwapPending)
        );
        assert_eq!(s.unassign(a1), Err(SessionError::SwapPending));

        s.cancel_swap().unwrap();
        s.drag_start_from_pool(class_id("Z")).unwrap();
    }

    #[test]
    fn dirty_tracking_follows_mutations_and_saves() {
        let mut s = session(SessionOptions::default());
        let mut sink = MemorySink {
            saved: vec![],
            fail: false,
        };
        assert!(!s.is_dirty());

        s.place_new(&class_id("X"), mon(&s, "A1")).unwrap();
        assert!(s.is_dirty());

        let receipt = s.save(&mut sink).unwrap();
        assert_eq!(receipt.assignments, 1);
        assert!(!s.is_dirty());
        assert_eq!(sink.saved.len(), 1);

        // Rejected operations are not mutations.
        let _ = s.place_new(&class_id("Y"), mon(&s, "B1"));
        assert!(!s.is_dirty());
    }

    #[test]
    fn failed_save_rolls_back_to_last_saved_state() {
        let mut s = session(SessionOptions::default());
        let mut ok_sink = MemorySink {
            saved: vec![],
            fail: false,
        };
        let a1 = mon(&s, "A1");
        s.place_new(&class_id("X"), a1).unwrap();
        s.save(&mut ok_sink).unwrap();
        let saved = s.snapshot();

        s.move_or_swap(a1, mon(&s, "A2")).unwrap();
        s.place_new(&class_id("Y"), mon(&s, "B2")).unwrap();

        let mut bad_sink = MemorySink {
            saved: vec![],
            fail: true,
        };
        let err = s.save(&mut bad_sink).unwrap_err();
        assert_eq!(err.code(), "persist_failed");
        assert_eq!(
            err,
            SaveError::PersistFailed {
                reverted: 3,
                message: "disk full".to_string()
            }
        );
        assert_eq!(s.snapshot(), saved);
        assert!(!s.is_dirty());
    }

    #[test]
    fn save_is_refused_while_a_proposal_is_open() {
        let mut s = session(SessionOptions::default());
        let (a1, a2) = (mon(&s, "A1"), mon(&s, "A2"));
        s.place_new(&class_id("X"), a1).unwrap();
        s.place_new(&class_id("Y"), a2).unwrap();
        s.move_or_swap(a1, a2).unwrap();
        let mut sink = MemorySink {
            saved: vec![],
            fail: false,
        };
        assert_eq!(s.save(&mut sink), Err(SaveError::SwapPending));
        assert!(sink.saved.is_empty());
    }

    #[test]
    fn revert_discards_unsaved_changes_and_transient_state() {
        let mut s = session(SessionOptions::default());
        let (a1, a2) = (mon(&s, "A1"), mon(&s, "A2"));
        s.place_new(&class_id("X"), a1).unwrap();
        s.place_new(&class_id("Y"), a2).unwrap();
        s.move_or_swap(a1, a2).unwrap();

        assert_eq!(s.revert(), 2);
        assert_eq!(s.grid().assigned_count(), 0);
        assert!(s.pending_swap().is_none());
        assert!(!s.is_dirty());
    }

    #[test]
    fn drag_out_respects_session_policy() {
        let mut keep = session(SessionOptions::default());
        let a1 = mon(&keep, "A1");
        keep.place_new(&class_id("X"), a1).unwrap();
        keep.drag_start_from_cell(a1).unwrap();
        assert_eq!(keep.drag_end(DropEffect::None), DragEnd::Cancelled);
        assert_eq!(keep.grid().assigned_count(), 1);

        let mut trash = session(SessionOptions {
            unassign_on_drag_out: true,
        });
        trash.place_new(&class_id("X"), a1).unwrap();
        let before = trash.revision();
        trash.drag_start_from_cell(a1).unwrap();
        assert!(matches!(
            trash.drag_end(DropEffect::None),
            DragEnd::Unassigned { .. }
        ));
        assert_eq!(trash.grid().assigned_count(), 0);
        assert_eq!(trash.revision(), before + 1);
    }

    #[test]
    fn closing_a_room_evicts_and_counts_as_change() {
        let mut s = session(SessionOptions::default());
        s.place_new(&class_id("X"), mon(&s, "A2")).unwrap();
        s.place_new(&class_id("Y"), mon(&s, "A1")).unwrap();
        let rev = s.revision();

        let evicted = s
            .set_room_status(&RoomId::from("A2"), RoomStatus::Unavailable)
            .unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(s.revision(), rev + 1);
        let pool: Vec<ClassId> = s
            .unassigned(&ClassFilter::default())
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert!(pool.contains(&class_id("X")));
        assert!(!pool.contains(&class_id("Y")));
    }

    #[test]
    fn revert_after_reopening_a_room_keeps_storage_eviction() {
        let mut s = session(SessionOptions::default());
        let mut sink = MemorySink {
            saved: vec![],
            fail: false,
        };
        let a2 = mon(&s, "A2");
        s.place_new(&class_id("X"), a2).unwrap();
        s.save(&mut sink).unwrap();

        let room = RoomId::from("A2");
        s.set_room_status(&room, RoomStatus::Unavailable).unwrap();
        assert_eq!(s.forget_saved_room(&room).unwrap(), 1);
        assert!(!s.is_dirty());

        s.set_room_status(&room, RoomStatus::Available).unwrap();
        assert_eq!(s.revert(), 0);
        assert_eq!(s.grid().get_cell(a2).class, None);
        assert!(!s.is_dirty());
        assert_eq!(s.snapshot().len(), 0);
    }

    #[test]
    fn open_rejects_invalid_schedule() {
        let grid = GridStore::new(sample_catalog(), TimePartition::default());
        let b1 = grid.address(
            grid.key_for("Tue", "10:00-13:00", &RoomId::from("B1"))
                .unwrap(),
        );
        let snapshot = GridSnapshot {
            assignments: vec![Assignment {
                cell: b1,
                class_id: class_id("X"),
            }],
        };
        let err = ScheduleSession::open(
            sample_catalog(),
            TimePartition::default(),
            &snapshot,
            SessionOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_snapshot");
    }
}
