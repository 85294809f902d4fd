use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for ClassId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Available,
    Unavailable,
}

impl RoomStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Some(Self::Available),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub building: String,
    pub floor: i64,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub equipment: BTreeSet<String>,
    #[serde(default)]
    pub status: RoomStatus,
}

impl Room {
    pub fn is_available(&self) -> bool {
        self.status == RoomStatus::Available
    }
}

/// A schedulable class. Everything besides `id` is display/filter data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("{kind} id must not be empty")]
    EmptyId { kind: &'static str },
    #[error("duplicate room id: {0}")]
    DuplicateRoom(RoomId),
    #[error("duplicate class id: {0}")]
    DuplicateClass(ClassId),
}

/// Rooms and classes known to one scheduling session.
#[derive(Debug, Clone)]
pub struct Catalog {
    rooms: Vec<Room>,
    classes: Vec<Class>,
    room_index: HashMap<RoomId, usize>,
    class_index: HashMap<ClassId, usize>,
}

impl Catalog {
    pub fn new(rooms: Vec<Room>, classes: Vec<Class>) -> Result<Self, CatalogError> {
        let mut room_index = HashMap::with_capacity(rooms.len());
        for (i, room) in rooms.iter().enumerate() {
            if room.id.0.trim().is_empty() {
                return Err(CatalogError::EmptyId { kind: "room" });
            }
            if room_index.insert(room.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateRoom(room.id.clone()));
            }
        }

        let mut class_index = HashMap::with_capacity(classes.len());
        for (i, class) in classes.iter().enumerate() {
            if class.id.0.trim().is_empty() {
                return Err(CatalogError::EmptyId { kind: "class" });
            }
            if class_index.insert(class.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateClass(class.id.clone()));
            }
        }

        Ok(Self {
            rooms,
            classes,
            room_index,
            class_index,
        })
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.room_index.get(id).map(|&i| &self.rooms[i])
    }

    pub fn room_position(&self, id: &RoomId) -> Option<usize> {
        self.room_index.get(id).copied()
    }

    pub fn room_at(&self, position: usize) -> &Room {
        &self.rooms[position]
    }

    pub fn class(&self, id: &ClassId) -> Option<&Class> {
        self.class_index.get(id).map(|&i| &self.classes[i])
    }

    pub fn contains_class(&self, id: &ClassId) -> bool {
        self.class_index.contains_key(id)
    }

    pub(crate) fn set_room_status(&mut self, position: usize, status: RoomStatus) -> RoomStatus {
        std::mem::replace(&mut self.rooms[position].status, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> Room {
        Room {
            id: RoomId::from(id),
            name: id.to_string(),
            building: "A".to_string(),
            floor: 1,
            capacity: 30,
            equipment: BTreeSet::new(),
            status: RoomStatus::Available,
        }
    }

    #[test]
    fn rejects_duplicate_room_ids() {
        let err = Catalog::new(vec![room("A1"), room("A1")], vec![]).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateRoom(RoomId::from("A1")));
    }

    #[test]
    fn room_status_wire_names() {
        assert_eq!(RoomStatus::parse(" Unavailable "), Some(RoomStatus::Unavailable));
        assert_eq!(RoomStatus::parse("closed"), None);
        let json = serde_json::to_value(RoomStatus::Available).unwrap();
        assert_eq!(json, serde_json::json!("available"));
    }

    #[test]
    fn room_defaults_to_available_when_status_omitted() {
        let parsed: Room = serde_json::from_value(serde_json::json!({
            "id": "B2",
            "name": "B2",
            "building": "B",
            "floor": 2
        }))
        .unwrap();
        assert!(parsed.is_available());
        assert_eq!(parsed.capacity, 0);
    }
}
