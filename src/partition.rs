use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_DAYS: [&str; 5] = ["Mon", "Tue", "Wed", "Thu", "Fri"];
pub const DEFAULT_TIME_SLOTS: [&str; 4] =
    ["07:00-10:00", "10:00-13:00", "13:00-16:00", "16:00-19:00"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{kind} contains a blank label")]
    Blank { kind: &'static str },
    #[error("{kind} contains duplicate label {label}")]
    Duplicate { kind: &'static str, label: String },
}

/// The weekdays and time-slots that index the grid, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePartition {
    days: Vec<String>,
    time_slots: Vec<String>,
}

impl TimePartition {
    pub fn new(days: Vec<String>, time_slots: Vec<String>) -> Result<Self, PartitionError> {
        check_labels("days", &days)?;
        check_labels("timeSlots", &time_slots)?;
        Ok(Self { days, time_slots })
    }

    pub fn days(&self) -> &[String] {
        &self.days
    }

    pub fn time_slots(&self) -> &[String] {
        &self.time_slots
    }

    pub fn day_index(&self, day: &str) -> Option<usize> {
        self.days.iter().position(|d| d == day)
    }

    pub fn slot_index(&self, slot: &str) -> Option<usize> {
        self.time_slots.iter().position(|s| s == slot)
    }
}

impl Default for TimePartition {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS.iter().map(|s| s.to_string()).collect(),
            time_slots: DEFAULT_TIME_SLOTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn check_labels(kind: &'static str, labels: &[String]) -> Result<(), PartitionError> {
    if labels.is_empty() {
        return Err(PartitionError::Empty(kind));
    }
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if label.trim().is_empty() {
            return Err(PartitionError::Blank { kind });
        }
        if !seen.insert(label.as_str()) {
            return Err(PartitionError::Duplicate {
                kind,
                label: label.clone(),
            });
        }
    }
    Ok(())
}
