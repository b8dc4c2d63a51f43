use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

pub type SessionId = i64;
pub type PositionId = i64;

/// One tracked sample. `id` is `None` until the storage assigns one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Option<PositionId>,
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
}

impl Position {
    pub fn new(coordinate: Coordinate, timestamp: DateTime<Utc>, session_id: SessionId) -> Self {
        Position {
            id: None,
            coordinate,
            timestamp,
            session_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Option<SessionId>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub is_active: bool,
}

impl Session {
    pub fn start(origin: Coordinate, destination: Coordinate, start_time: DateTime<Utc>) -> Self {
        Session {
            id: None,
            start_time,
            end_time: None,
            origin,
            destination,
            is_active: true,
        }
    }

    pub fn finish(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.is_active = false;
    }
}

/* Persistence used by the tracking loop and the heatmap. Implementations
must accept one writer per session; the core never runs two tracking loops at
the same time so no extra locking is done on top of this.

All errors are raw `anyhow` errors, callers in the core turn them into
`error::Error` with `ErrorKind::Storage`.
*/
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<SessionId>;

    async fn update_session(&self, session: &Session) -> Result<()>;

    async fn get_active_session(&self) -> Result<Option<Session>>;

    async fn get_all_sessions(&self) -> Result<Vec<Session>>;

    async fn save_location(&self, position: &Position) -> Result<PositionId>;

    // ordered by insertion
    async fn get_all_locations(&self) -> Result<Vec<Position>>;

    async fn get_locations_by_session(&self, session_id: SessionId) -> Result<Vec<Position>>;
}
