use crate::catalog::{Catalog, Class, ClassId, Room, RoomId, RoomStatus};
use crate::grid::CellAddress;
use crate::partition::TimePartition;
use crate::session::{SaveReceipt, SchedulePersistence};
use crate::snapshot::{Assignment, GridSnapshot};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "roomsched.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            building TEXT NOT NULL,
            floor INTEGER NOT NULL,
            capacity INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'available',
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_equipment(
            room_id TEXT NOT NULL,
            item TEXT NOT NULL,
            PRIMARY KEY(room_id, item),
            FOREIGN KEY(room_id) REFERENCES rooms(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT,
            degree TEXT,
            generation TEXT,
            shift TEXT,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    // One row per occupied cell; a class can sit in at most one cell.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_assignments(
            class_id TEXT PRIMARY KEY,
            day TEXT NOT NULL,
            time_slot TEXT NOT NULL,
            building TEXT NOT NULL,
            floor INTEGER NOT NULL,
            room_id TEXT NOT NULL,
            UNIQUE(day, time_slot, room_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(room_id) REFERENCES rooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_assignments_room ON schedule_assignments(room_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_saves(
            id TEXT PRIMARY KEY,
            saved_at TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            assignments INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is invalid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

/// What a catalog re-import did to the saved schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogReplace {
    /// Assignments dropped because their room or class is gone or closed.
    pub pruned: usize,
    /// Assignments kept but rewritten to their room's new building or floor.
    pub relocated: usize,
}

/// Replaces the stored rooms and classes. Saved assignments follow their
/// room to its new building and floor; the ones that no longer fit are
/// dropped.
pub fn replace_catalog(conn: &Connection, catalog: &Catalog) -> anyhow::Result<CatalogReplace> {
    let tx = conn.unchecked_transaction()?;

    // Delete in dependency order (no ON DELETE CASCADE).
    let mut changes = CatalogReplace::default();
    {
        let mut stmt =
            tx.prepare("SELECT class_id, room_id, building, floor FROM schedule_assignments")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (class_id, room_id, building, floor) in rows {
            let class_ok = catalog.contains_class(&ClassId(class_id.clone()));
            let room = catalog
                .room(&RoomId(room_id))
                .filter(|r| class_ok && r.is_available());
            let Some(room) = room else {
                tx.execute(
                    "DELETE FROM schedule_assignments WHERE class_id = ?",
                    [&class_id],
                )?;
                changes.pruned += 1;
                continue;
            };
            if room.building != building || room.floor != floor {
                tx.execute(
                    "UPDATE schedule_assignments SET building = ?, floor = ? WHERE class_id = ?",
                    (&room.building, room.floor, &class_id),
                )?;
                changes.relocated += 1;
            }
        }
    }
    tx.execute("DELETE FROM room_equipment", [])?;
    tx.execute(
        "DELETE FROM rooms WHERE id NOT IN (SELECT room_id FROM schedule_assignments)",
        [],
    )?;
    tx.execute(
        "DELETE FROM classes WHERE id NOT IN (SELECT class_id FROM schedule_assignments)",
        [],
    )?;

    for (i, room) in catalog.rooms().iter().enumerate() {
        tx.execute(
            "INSERT INTO rooms(id, name, building, floor, capacity, status, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               building = excluded.building,
               floor = excluded.floor,
               capacity = excluded.capacity,
               status = excluded.status,
               sort_order = excluded.sort_order",
            (
                &room.id.0,
                &room.name,
                &room.building,
                room.floor,
                room.capacity as i64,
                room.status.as_str(),
                i as i64,
            ),
        )?;
        for item in &room.equipment {
            tx.execute(
                "INSERT INTO room_equipment(room_id, item) VALUES(?, ?)",
                (&room.id.0, item),
            )?;
        }
    }
    for (i, class) in catalog.classes().iter().enumerate() {
        tx.execute(
            "INSERT INTO classes(id, name, code, degree, generation, shift, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               code = excluded.code,
               degree = excluded.degree,
               generation = excluded.generation,
               shift = excluded.shift,
               sort_order = excluded.sort_order",
            (
                &class.id.0,
                &class.name,
                &class.code,
                &class.degree,
                &class.generation,
                &class.shift,
                i as i64,
            ),
        )?;
    }
    tx.commit()?;
    Ok(changes)
}

pub fn load_catalog(conn: &Connection) -> anyhow::Result<Catalog> {
    let mut equipment_stmt =
        conn.prepare("SELECT item FROM room_equipment WHERE room_id = ? ORDER BY item")?;
    let mut room_stmt = conn.prepare(
        "SELECT id, name, building, floor, capacity, status
         FROM rooms ORDER BY sort_order, id",
    )?;
    let raw_rooms = room_stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rooms = Vec::with_capacity(raw_rooms.len());
    for (id, name, building, floor, capacity, status) in raw_rooms {
        let equipment = equipment_stmt
            .query_map([&id], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        let status = RoomStatus::parse(&status)
            .with_context(|| format!("room {} has invalid status {}", id, status))?;
        rooms.push(Room {
            id: RoomId(id),
            name,
            building,
            floor,
            capacity: u32::try_from(capacity).unwrap_or(0),
            equipment,
            status,
        });
    }

    let mut class_stmt = conn.prepare(
        "SELECT id, name, code, degree, generation, shift
         FROM classes ORDER BY sort_order, id",
    )?;
    let classes = class_stmt
        .query_map([], |row| {
            Ok(Class {
                id: ClassId(row.get(0)?),
                name: row.get(1)?,
                code: row.get(2)?,
                degree: row.get(3)?,
                generation: row.get(4)?,
                shift: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Catalog::new(rooms, classes).context("stored catalog is inconsistent")
}

/// Stores a room's status. Closing a room also drops its saved assignments,
/// returning how many. `None` when the room does not exist.
pub fn set_room_status(
    conn: &Connection,
    room: &RoomId,
    status: RoomStatus,
) -> anyhow::Result<Option<usize>> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE rooms SET status = ? WHERE id = ?",
        (status.as_str(), &room.0),
    )?;
    if changed == 0 {
        return Ok(None);
    }
    let mut dropped = 0;
    if status == RoomStatus::Unavailable {
        dropped = tx.execute(
            "DELETE FROM schedule_assignments WHERE room_id = ?",
            [&room.0],
        )?;
    }
    tx.commit()?;
    Ok(Some(dropped))
}

/// Drops saved assignments whose day or time slot is not in `partition`,
/// returning how many.
pub fn prune_outside_partition(
    conn: &Connection,
    partition: &TimePartition,
) -> anyhow::Result<usize> {
    let mut stmt = conn.prepare("SELECT class_id, day, time_slot FROM schedule_assignments")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut pruned = 0;
    for (class_id, day, slot) in rows {
        if partition.day_index(&day).is_none() || partition.slot_index(&slot).is_none() {
            conn.execute(
                "DELETE FROM schedule_assignments WHERE class_id = ?",
                [&class_id],
            )?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

pub fn load_schedule(conn: &Connection) -> anyhow::Result<GridSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT day, time_slot, building, floor, room_id, class_id
         FROM schedule_assignments
         ORDER BY day, time_slot, building, floor, room_id",
    )?;
    let assignments = stmt
        .query_map([], |row| {
            Ok(Assignment {
                cell: CellAddress {
                    day: row.get(0)?,
                    time_slot: row.get(1)?,
                    building: row.get(2)?,
                    floor: row.get(3)?,
                    room_id: RoomId(row.get(4)?),
                },
                class_id: ClassId(row.get(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GridSnapshot { assignments })
}

pub fn last_save(conn: &Connection) -> anyhow::Result<Option<SaveReceipt>> {
    let row = conn
        .query_row(
            "SELECT id, saved_at, fingerprint, assignments
             FROM schedule_saves ORDER BY saved_at DESC, rowid DESC LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((id, saved_at, fingerprint, assignments)) = row else {
        return Ok(None);
    };
    Ok(Some(SaveReceipt {
        save_id: Uuid::parse_str(&id).with_context(|| format!("invalid save id {}", id))?,
        saved_at,
        fingerprint,
        assignments: usize::try_from(assignments).unwrap_or(0),
    }))
}

/// Writes saves into the workspace database.
pub struct SqliteScheduleStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteScheduleStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SchedulePersistence for SqliteScheduleStore<'_> {
    fn persist(&mut self, snapshot: &GridSnapshot) -> anyhow::Result<SaveReceipt> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to start save transaction")?;
        tx.execute("DELETE FROM schedule_assignments", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO schedule_assignments(class_id, day, time_slot, building, floor, room_id)
                 VALUES(?, ?, ?, ?, ?, ?)",
            )?;
            for a in &snapshot.assignments {
                insert
                    .execute((
                        &a.class_id.0,
                        &a.cell.day,
                        &a.cell.time_slot,
                        &a.cell.building,
                        a.cell.floor,
                        &a.cell.room_id.0,
                    ))
                    .with_context(|| format!("failed to store class {}", a.class_id))?;
            }
        }

        let receipt = SaveReceipt {
            save_id: Uuid::new_v4(),
            saved_at: chrono::Utc::now().to_rfc3339(),
            fingerprint: snapshot.fingerprint(),
            assignments: snapshot.len(),
        };
        tx.execute(
            "INSERT INTO schedule_saves(id, saved_at, fingerprint, assignments)
             VALUES(?, ?, ?, ?)",
            (
                receipt.save_id.to_string(),
                &receipt.saved_at,
                &receipt.fingerprint,
                receipt.assignments as i64,
            ),
        )
        .context("failed to record save")?;
        tx.commit().context("failed to commit save")?;
        Ok(receipt)
    }
}
