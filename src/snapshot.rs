use crate::catalog::ClassId;
use crate::grid::CellAddress;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub cell: CellAddress,
    pub class_id: ClassId,
}

/// Every occupied cell of a grid; the exchange format for session open and save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSnapshot {
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl GridSnapshot {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Order-independent SHA-256 over the assignment set, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut lines: Vec<String> = self
            .assignments
            .iter()
            .map(|a| {
                format!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    a.cell.day,
                    a.cell.time_slot,
                    a.cell.building,
                    a.cell.floor,
                    a.cell.room_id,
                    a.class_id
                )
            })
            .collect();
        lines.sort();

        let mut hasher = Sha256::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RoomId;

    fn assignment(room: &str, class: &str) -> Assignment {
        Assignment {
            cell: CellAddress {
                day: "Mon".into(),
                time_slot: "07:00-10:00".into(),
                building: "A".into(),
                floor: 1,
                room_id: RoomId::from(room),
            },
            class_id: ClassId::from(class),
        }
    }

    #[test]
    fn fingerprint_ignores_assignment_order() {
        let a = GridSnapshot {
            assignments: vec![assignment("A1", "X"), assignment("A2", "Y")],
        };
        let b = GridSnapshot {
            assignments: vec![assignment("A2", "Y"), assignment("A1", "X")],
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_changes_when_classes_swap() {
        let a = GridSnapshot {
            assignments: vec![assignment("A1", "X"), assignment("A2", "Y")],
        };
        let b = GridSnapshot {
            assignments: vec![assignment("A1", "Y"), assignment("A2", "X")],
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
