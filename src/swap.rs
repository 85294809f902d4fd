use crate::catalog::ClassId;
use crate::grid::CellKey;
use crate::placement::{PlacementEngine, PlacementError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapSide {
    pub key: CellKey,
    pub class: ClassId,
}

/// Two occupied cells whose classes would be exchanged on confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapProposal {
    id: Uuid,
    pub from: SwapSide,
    pub to: SwapSide,
}

impl SwapProposal {
    pub fn new(from: SwapSide, to: SwapSide) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    Closed,
    Proposed(SwapProposal),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    #[error("a swap proposal is already open")]
    AlreadyOpen,
    #[error("no swap proposal is open")]
    NotOpen,
    #[error("proposal {got} is not the open proposal {open}")]
    StaleProposal { open: Uuid, got: Uuid },
    #[error(transparent)]
    Rejected(#[from] PlacementError),
}

impl SwapError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyOpen => "swap_pending",
            Self::NotOpen => "no_proposal",
            Self::StaleProposal { .. } => "stale_proposal",
            Self::Rejected(e) => e.code(),
        }
    }
}

/// Confirmation gate in front of destructive swaps. At most one proposal is
/// open at a time; `confirm` and `cancel` are the only ways back to `Closed`.
#[derive(Debug, Default)]
pub struct SwapWorkflow {
    state: WorkflowState,
}

impl SwapWorkflow {
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn pending(&self) -> Option<&SwapProposal> {
        match &self.state {
            WorkflowState::Proposed(p) => Some(p),
            WorkflowState::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WorkflowState::Proposed(_))
    }

    pub fn propose(&mut self, proposal: SwapProposal) -> Result<&SwapProposal, SwapError> {
        if self.is_open() {
            return Err(SwapError::AlreadyOpen);
        }
        info!(proposal = %proposal.id(), "swap awaiting confirmation");
        self.state = WorkflowState::Proposed(proposal);
        self.pending().ok_or(SwapError::NotOpen)
    }

    /// Commits the open proposal. The workflow closes whether the commit
    /// succeeds or is rejected; a mismatched `expected` id leaves it open.
    pub fn confirm(
        &mut self,
        engine: &mut PlacementEngine,
        expected: Option<Uuid>,
    ) -> Result<SwapProposal, SwapError> {
        let open = self.pending().ok_or(SwapError::NotOpen)?.id();
        if let Some(got) = expected {
            if got != open {
                return Err(SwapError::StaleProposal { open, got });
            }
        }

        let WorkflowState::Proposed(proposal) = std::mem::take(&mut self.state) else {
            return Err(SwapError::NotOpen);
        };
        engine.commit_swap(&proposal)?;
        Ok(proposal)
    }

    pub fn cancel(&mut self) -> Result<SwapProposal, SwapError> {
        match std::mem::take(&mut self.state) {
            WorkflowState::Proposed(p) => {
                info!(proposal = %p.id(), "swap cancelled");
                Ok(p)
            }
            WorkflowState::Closed => Err(SwapError::NotOpen),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.state = WorkflowState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RoomId, RoomStatus};
    use crate::grid::GridStore;
    use crate::partition::TimePartition;
    use crate::placement::MoveOutcome;
    use crate::test_fixtures::{class_id, sample_catalog};

    fn proposed() -> (PlacementEngine, SwapWorkflow, CellKey, CellKey) {
        let mut e =
            PlacementEngine::new(GridStore::new(sample_catalog(), TimePartition::default()));
        let a1 = e
            .grid()
            .key_for("Mon", "07:00-10:00", &RoomId::from("A1"))
            .unwrap();
        let a2 = e
            .grid()
            .key_for("Mon", "07:00-10:00", &RoomId::from("A2"))
            .unwrap();
        e.place_new(&class_id("X"), a1).unwrap();
        e.place_new(&class_id("Y"), a2).unwrap();

        let mut wf = SwapWorkflow::default();
        let MoveOutcome::SwapProposed(p) = e.move_or_swap(a1, a2).unwrap() else {
            panic!("expected a swap proposal");
        };
        wf.propose(p).unwrap();
        (e, wf, a1, a2)
    }

    #[test]
    fn confirm_applies_both_writes_and_closes() {
        let (mut e, mut wf, a1, a2) = proposed();
        assert_eq!(e.grid().get_cell(a1).class, Some(&class_id("X")));

        let p = wf.confirm(&mut e, None).unwrap();
        assert_eq!(p.from.key, a1);
        assert_eq!(e.grid().get_cell(a1).class, Some(&class_id("Y")));
        assert_eq!(e.grid().get_cell(a2).class, Some(&class_id("X")));
        assert_eq!(wf.state(), &WorkflowState::Closed);
    }

    #[test]
    fn cancel_leaves_grid_untouched() {
        let (e, mut wf, a1, a2) = proposed();
        let before = e.grid().snapshot();
        wf.cancel().unwrap();
        assert!(!wf.is_open());
        assert_eq!(e.grid().snapshot(), before);
        assert_eq!(e.grid().get_cell(a1).class, Some(&class_id("X")));
        assert_eq!(e.grid().get_cell(a2).class, Some(&class_id("Y")));
    }

    #[test]
    fn only_one_proposal_at_a_time() {
        let (_, mut wf, _, _) = proposed();
        let other = wf.pending().cloned().unwrap();
        assert_eq!(wf.propose(other), Err(SwapError::AlreadyOpen));
    }

    #[test]
    fn confirming_or_cancelling_when_closed_is_an_error() {
        let (mut e, mut wf, _, _) = proposed();
        wf.cancel().unwrap();
        assert_eq!(wf.cancel(), Err(SwapError::NotOpen));
        assert_eq!(wf.confirm(&mut e, None), Err(SwapError::NotOpen));
    }

    #[test]
    fn stale_proposal_id_keeps_workflow_open() {
        let (mut e, mut wf, _, _) = proposed();
        let err = wf.confirm(&mut e, Some(Uuid::new_v4())).unwrap_err();
        assert_eq!(err.code(), "stale_proposal");
        assert!(wf.is_open());
    }

    #[test]
    fn rejected_confirm_fails_closed() {
        let (mut e, mut wf, a1, a2) = proposed();
        e.set_room_status(&RoomId::from("A2"), RoomStatus::Unavailable)
            .unwrap();

        let err = wf.confirm(&mut e, None).unwrap_err();
        assert_eq!(err.code(), "swap_rejected");
        assert!(!wf.is_open());
        assert_eq!(e.grid().get_cell(a1).class, Some(&class_id("X")));
        assert!(e.grid().get_cell(a2).is_empty());
    }
}
