use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crowdtrail_core::coordinate::Coordinate;
use crowdtrail_core::route::{RouteResponse, RouteSource};
use crowdtrail_core::storage::{Position, PositionId, Session, SessionId, Storage};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn sub_folder(root: &Path, sub: &str) -> String {
    let path = root.join(sub);
    std::fs::create_dir(&path).unwrap();
    path.into_os_string().into_string().unwrap()
}

/// `n` positions walking north from `start`, one second and ~11m apart.
pub fn walk(n: usize, start: Coordinate, start_time: DateTime<Utc>) -> Vec<Position> {
    (0..n)
        .map(|i| {
            Position::new(
                Coordinate::new(start.latitude + i as f64 * 0.0001, start.longitude),
                start_time + Duration::seconds(i as i64),
                1,
            )
        })
        .collect()
}

/// In memory storage with switches for failure injection.
#[derive(Default)]
pub struct MemoryStorage {
    sessions: Mutex<Vec<Session>>,
    locations: Mutex<Vec<Position>>,
    // `Some(n)`: the next n saves succeed, then every save fails
    save_budget: Mutex<Option<usize>>,
    pub fail_create_session: AtomicBool,
    pub panic_on_save: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_saves_after(n: usize) -> Self {
        let storage = Self::default();
        *storage.save_budget.lock().unwrap() = Some(n);
        storage
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn locations(&self) -> Vec<Position> {
        self.locations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_session(&self, session: &Session) -> Result<SessionId> {
        if self.fail_create_session.load(Ordering::SeqCst) {
            bail!("session table is locked");
        }
        let mut sessions = self.sessions.lock().unwrap();
        let id = sessions.len() as SessionId + 1;
        let mut session = session.clone();
        session.id = Some(id);
        sessions.push(session);
        Ok(id)
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(anyhow!("unknown session {:?}", session.id)),
        }
    }

    async fn get_active_session(&self) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.iter().rev().find(|s| s.is_active).cloned())
    }

    async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.sessions())
    }

    async fn save_location(&self, position: &Position) -> Result<PositionId> {
        if self.panic_on_save.load(Ordering::SeqCst) {
            panic!("location table is corrupted");
        }
        let mut budget = self.save_budget.lock().unwrap();
        if let Some(n) = budget.as_mut() {
            if *n == 0 {
                bail!("disk full");
            }
            *n -= 1;
        }
        let mut locations = self.locations.lock().unwrap();
        let id = locations.len() as PositionId + 1;
        let mut position = position.clone();
        position.id = Some(id);
        locations.push(position);
        Ok(id)
    }

    async fn get_all_locations(&self) -> Result<Vec<Position>> {
        Ok(self.locations())
    }

    async fn get_locations_by_session(&self, session_id: SessionId) -> Result<Vec<Position>> {
        Ok(self
            .locations()
            .into_iter()
            .filter(|p| p.session_id == session_id)
            .collect())
    }
}

/// Route source whose requests never get through.
pub struct UnreachableRoute;

#[async_trait]
impl RouteSource for UnreachableRoute {
    async fn fetch_route(&self, _: Coordinate, _: Coordinate) -> Result<RouteResponse> {
        Err(anyhow!("connection refused"))
    }
}
