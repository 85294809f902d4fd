use crate::catalog::{Catalog, Class, ClassId, Room, RoomId, RoomStatus};
use std::collections::BTreeSet;

pub fn room(id: &str, building: &str, floor: i64, status: RoomStatus) -> Room {
    Room {
        id: RoomId::from(id),
        name: id.to_string(),
        building: building.to_string(),
        floor,
        capacity: 40,
        equipment: BTreeSet::from(["projector".to_string()]),
        status,
    }
}

pub fn class(id: &str, degree: &str, generation: &str, shift: &str) -> Class {
    Class {
        id: ClassId::from(id),
        name: format!("Class {}", id),
        code: Some(format!("C-{}", id)),
        degree: Some(degree.to_string()),
        generation: Some(generation.to_string()),
        shift: Some(shift.to_string()),
    }
}

pub fn class_id(id: &str) -> ClassId {
    ClassId::from(id)
}

/// Building A: A1, A2 on floor 1, A3 on floor 2.
/// Building B: B1 (unavailable), B2 on floor 1.
pub fn sample_catalog() -> Catalog {
    Catalog::new(
        vec![
            room("A2", "A", 1, RoomStatus::Available),
            room("A1", "A", 1, RoomStatus::Available),
            room("A3", "A", 2, RoomStatus::Available),
            room("B1", "B", 1, RoomStatus::Unavailable),
            room("B2", "B", 1, RoomStatus::Available),
        ],
        vec![
            class("X", "Informatics", "2023", "morning"),
            class("Y", "Informatics", "2024", "evening"),
            class("Z", "Civil", "2023", "morning"),
            class("W", "Civil", "2024", "morning"),
        ],
    )
    .expect("sample catalog")
}
