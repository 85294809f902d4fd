use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::session::ScheduleSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct OpenSession {
    pub schedule: ScheduleSession,
    /// Opened from the workspace catalog; only these sessions can be saved.
    pub workspace_backed: bool,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<OpenSession>,
}
