use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "Sent"),
            Self::Received => write!(f, "Received"),
        }
    }
}

/// One completed file transfer, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub name: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn now(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            direction,
            timestamp: Utc::now(),
        }
    }
}
