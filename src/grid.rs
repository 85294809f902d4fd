use crate::catalog::{Catalog, Class, ClassId, Room, RoomId};
use crate::partition::TimePartition;
use crate::snapshot::{Assignment, GridSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Address of one cell. Only a `GridStore` hands these out, so every key it
/// receives back is inside its key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    day: usize,
    slot: usize,
    building: usize,
    floor: usize,
    room: usize,
}

impl CellKey {
    pub fn day(&self) -> usize {
        self.day
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn room_index(&self) -> usize {
        self.room
    }

    pub fn coordinate(&self) -> TimeCoordinate {
        TimeCoordinate {
            day: self.day,
            slot: self.slot,
            building: self.building,
            floor: self.floor,
        }
    }
}

/// One visual row of rooms: (day, time-slot, building, floor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeCoordinate {
    pub day: usize,
    pub slot: usize,
    pub building: usize,
    pub floor: usize,
}

/// Wire form of a cell key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellAddress {
    pub day: String,
    pub time_slot: String,
    pub building: String,
    pub floor: i64,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell<'a> {
    pub room: &'a Room,
    pub class: Option<&'a ClassId>,
}

impl Cell<'_> {
    pub fn is_empty(&self) -> bool {
        self.class.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("unknown day: {0}")]
    UnknownDay(String),
    #[error("unknown time slot: {0}")]
    UnknownTimeSlot(String),
    #[error("unknown room: {0}")]
    UnknownRoom(RoomId),
    #[error("room {room} is not in building {building} floor {floor}")]
    RoomMismatch {
        room: RoomId,
        building: String,
        floor: i64,
    },
}

impl GridError {
    pub fn code(&self) -> &'static str {
        "unknown_cell"
    }
}

#[derive(Debug, Clone)]
struct FloorLayout {
    floor: i64,
    start: usize,
    len: usize,
}

#[derive(Debug, Clone)]
struct BuildingLayout {
    name: String,
    floors: Vec<FloorLayout>,
}

/// Dense copy of every cell, used as the last-saved baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellsBaseline(Vec<Option<ClassId>>);

/// Fully materialized (day × slot × building × floor × room) → class mapping.
///
/// Writes are unchecked; `PlacementEngine` is the only caller of `set_cell`.
#[derive(Debug, Clone)]
pub struct GridStore {
    catalog: Catalog,
    partition: TimePartition,
    buildings: Vec<BuildingLayout>,
    // flat room position -> catalog position
    order: Vec<usize>,
    // catalog position -> (building, floor, room index on floor)
    placement: Vec<(usize, usize, usize)>,
    cells: Vec<Option<ClassId>>,
}

impl GridStore {
    pub fn new(catalog: Catalog, partition: TimePartition) -> Self {
        let rooms = catalog.rooms();
        let mut order: Vec<usize> = (0..rooms.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&rooms[a], &rooms[b]);
            (&ra.building, ra.floor, &ra.name, &ra.id).cmp(&(&rb.building, rb.floor, &rb.name, &rb.id))
        });

        let mut buildings: Vec<BuildingLayout> = Vec::new();
        let mut placement = vec![(0, 0, 0); rooms.len()];
        for (flat, &pos) in order.iter().enumerate() {
            let room = &rooms[pos];
            if buildings.last().map_or(true, |b| b.name != room.building) {
                buildings.push(BuildingLayout {
                    name: room.building.clone(),
                    floors: Vec::new(),
                });
            }
            let b = buildings.len() - 1;
            let floors = &mut buildings[b].floors;
            if floors.last().map_or(true, |f| f.floor != room.floor) {
                floors.push(FloorLayout {
                    floor: room.floor,
                    start: flat,
                    len: 0,
                });
            }
            let f = floors.len() - 1;
            placement[pos] = (b, f, floors[f].len);
            floors[f].len += 1;
        }

        let size = partition.days().len() * partition.time_slots().len() * rooms.len();
        Self {
            catalog,
            partition,
            buildings,
            order,
            placement,
            cells: vec![None; size],
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub(crate) fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn partition(&self) -> &TimePartition {
        &self.partition
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn room_count(&self) -> usize {
        self.order.len()
    }

    fn index(&self, key: CellKey) -> usize {
        let start = self.buildings[key.building].floors[key.floor].start;
        (key.day * self.partition.time_slots().len() + key.slot) * self.room_count()
            + start
            + key.room
    }

    fn key_at(&self, index: usize) -> CellKey {
        let rooms = self.room_count();
        let slots = self.partition.time_slots().len();
        let coord = index / rooms;
        let (building, floor, room) = self.placement[self.order[index % rooms]];
        CellKey {
            day: coord / slots,
            slot: coord % slots,
            building,
            floor,
            room,
        }
    }

    /// Catalog position of the room behind `key`.
    pub fn room_position(&self, key: CellKey) -> usize {
        let start = self.buildings[key.building].floors[key.floor].start;
        self.order[start + key.room]
    }

    pub fn room(&self, key: CellKey) -> &Room {
        self.catalog.room_at(self.room_position(key))
    }

    pub fn get_cell(&self, key: CellKey) -> Cell<'_> {
        Cell {
            room: self.room(key),
            class: self.cells[self.index(key)].as_ref(),
        }
    }

    pub(crate) fn set_cell(&mut self, key: CellKey, class: Option<ClassId>) -> Option<ClassId> {
        let index = self.index(key);
        std::mem::replace(&mut self.cells[index], class)
    }

    pub fn find_cell_of_class(&self, class: &ClassId) -> Option<CellKey> {
        self.cells
            .iter()
            .position(|c| c.as_ref() == Some(class))
            .map(|i| self.key_at(i))
    }

    pub fn keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        (0..self.cells.len()).map(|i| self.key_at(i))
    }

    pub fn assigned(&self) -> impl Iterator<Item = (CellKey, &ClassId)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|class| (self.key_at(i), class)))
    }

    pub fn assigned_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Roster minus every placed class, in roster order.
    pub fn unassigned_classes(&self) -> Vec<&Class> {
        let placed: HashSet<&ClassId> = self.cells.iter().flatten().collect();
        self.catalog
            .classes()
            .iter()
            .filter(|c| !placed.contains(&c.id))
            .collect()
    }

    /// Every cell of the room at catalog `position`, across all time coordinates.
    pub fn keys_of_room(&self, position: usize) -> Vec<CellKey> {
        let (building, floor, room) = self.placement[position];
        let slots = self.partition.time_slots().len();
        (0..self.partition.days().len())
            .flat_map(|day| {
                (0..slots).map(move |slot| CellKey {
                    day,
                    slot,
                    building,
                    floor,
                    room,
                })
            })
            .collect()
    }

    pub fn time_coordinates(&self) -> Vec<TimeCoordinate> {
        let mut out = Vec::new();
        for day in 0..self.partition.days().len() {
            for slot in 0..self.partition.time_slots().len() {
                for (building, b) in self.buildings.iter().enumerate() {
                    for floor in 0..b.floors.len() {
                        out.push(TimeCoordinate {
                            day,
                            slot,
                            building,
                            floor,
                        });
                    }
                }
            }
        }
        out
    }

    /// The rooms of one floor at one time, left to right.
    pub fn row(&self, coord: TimeCoordinate) -> Vec<CellKey> {
        let len = self.buildings[coord.building].floors[coord.floor].len;
        (0..len)
            .map(|room| CellKey {
                day: coord.day,
                slot: coord.slot,
                building: coord.building,
                floor: coord.floor,
                room,
            })
            .collect()
    }

    pub fn day_label(&self, key: CellKey) -> &str {
        &self.partition.days()[key.day]
    }

    pub fn slot_label(&self, key: CellKey) -> &str {
        &self.partition.time_slots()[key.slot]
    }

    pub fn building_label(&self, coord: TimeCoordinate) -> &str {
        &self.buildings[coord.building].name
    }

    pub fn floor_label(&self, coord: TimeCoordinate) -> i64 {
        self.buildings[coord.building].floors[coord.floor].floor
    }

    pub fn key_for(&self, day: &str, slot: &str, room: &RoomId) -> Result<CellKey, GridError> {
        let day = self
            .partition
            .day_index(day)
            .ok_or_else(|| GridError::UnknownDay(day.to_string()))?;
        let slot = self
            .partition
            .slot_index(slot)
            .ok_or_else(|| GridError::UnknownTimeSlot(slot.to_string()))?;
        let position = self
            .catalog
            .room_position(room)
            .ok_or_else(|| GridError::UnknownRoom(room.clone()))?;
        let (building, floor, room) = self.placement[position];
        Ok(CellKey {
            day,
            slot,
            building,
            floor,
            room,
        })
    }

    pub fn resolve(&self, addr: &CellAddress) -> Result<CellKey, GridError> {
        let key = self.key_for(&addr.day, &addr.time_slot, &addr.room_id)?;
        let coord = key.coordinate();
        if self.building_label(coord) != addr.building || self.floor_label(coord) != addr.floor {
            return Err(GridError::RoomMismatch {
                room: addr.room_id.clone(),
                building: addr.building.clone(),
                floor: addr.floor,
            });
        }
        Ok(key)
    }

    pub fn address(&self, key: CellKey) -> CellAddress {
        let coord = key.coordinate();
        CellAddress {
            day: self.day_label(key).to_string(),
            time_slot: self.slot_label(key).to_string(),
            building: self.building_label(coord).to_string(),
            floor: self.floor_label(coord),
            room_id: self.room(key).id.clone(),
        }
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            assignments: self
                .assigned()
                .map(|(key, class)| Assignment {
                    cell: self.address(key),
                    class_id: class.clone(),
                })
                .collect(),
        }
    }

    pub fn capture(&self) -> CellsBaseline {
        CellsBaseline(self.cells.clone())
    }

    /// Empties the room at catalog `position` in `baseline`. Returns how many
    /// cells were occupied.
    pub(crate) fn clear_room_in(&self, baseline: &mut CellsBaseline, position: usize) -> usize {
        self.keys_of_room(position)
            .into_iter()
            .filter(|&key| baseline.0[self.index(key)].take().is_some())
            .count()
    }

    /// Overwrites every cell from `baseline`, leaving cells empty where `keep`
    /// rejects the room. Returns how many cells changed.
    pub(crate) fn restore_where(
        &mut self,
        baseline: &CellsBaseline,
        keep: impl Fn(&Room) -> bool,
    ) -> usize {
        let mut changed = 0;
        for index in 0..self.cells.len() {
            let key = self.key_at(index);
            let wanted = if keep(self.room(key)) {
                baseline.0[index].clone()
            } else {
                None
            };
            if self.cells[index] != wanted {
                self.cells[index] = wanted;
                changed += 1;
            }
        }
        changed
    }
}
