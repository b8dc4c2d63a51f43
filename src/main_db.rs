use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::cmp::Ordering;
use std::error::Error;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::coordinate::Coordinate;
use crate::storage::{Position, PositionId, Session, SessionId, Storage};
use crate::utils;

/* The main database. It is small and relational: one row per tracking
session and one row per recorded position.

`session` keeps every session ever started. The core only ever has one
active session (`is_active = 1`) but that is enforced by the tracking state
machine, not by this table.

`location` keeps all recorded positions in insertion order (`id` is auto
incremented), `session_id` points at the owning session.
*/

#[allow(clippy::type_complexity)]
fn open_db_and_run_migration(
    conn: &mut Connection,
    migrations: &[&dyn Fn(&Transaction) -> Result<()>],
) -> Result<()> {
    let tx = conn.transaction()?;

    let version = utils::db::init_metadata_and_get_version(&tx)? as usize;
    let target_version = migrations.len();
    debug!(
        "current version = {}, target_version = {}",
        version, target_version
    );
    match version.cmp(&target_version) {
        Ordering::Equal => (),
        Ordering::Less => {
            for (i, f) in migrations.iter().enumerate().skip(version) {
                info!("running migration for version: {}", i + 1);
                f(&tx)?;
            }
            utils::db::set_version_in_metadata(&tx, target_version as i32)?;
        }
        Ordering::Greater => {
            bail!(
                "version too high: current version = {}, target_version = {}",
                version,
                target_version
            );
        }
    }
    tx.commit()?;
    Ok(())
}

fn migrate_v1(tx: &Transaction) -> Result<()> {
    let sql = "
    CREATE TABLE session (
        id              INTEGER PRIMARY KEY AUTOINCREMENT
                                UNIQUE
                                NOT NULL,
        start_time_ms   INTEGER NOT NULL,
        end_time_ms     INTEGER,
        origin_lat      REAL    NOT NULL,
        origin_lng      REAL    NOT NULL,
        destination_lat REAL    NOT NULL,
        destination_lng REAL    NOT NULL,
        is_active       INTEGER NOT NULL
    );
    CREATE INDEX session_active_index ON session (
        is_active
    );
    CREATE TABLE location (
        id              INTEGER PRIMARY KEY AUTOINCREMENT
                                UNIQUE
                                NOT NULL,
        session_id      INTEGER NOT NULL REFERENCES session (id),
        timestamp_ms    INTEGER NOT NULL,
        lat             REAL    NOT NULL,
        lng             REAL    NOT NULL
    );
    CREATE INDEX location_session_index ON location (
        session_id
    );
    CREATE TABLE setting (
        key               TEXT    PRIMARY KEY
                                  NOT NULL
                                  UNIQUE,
        value             TEXT
    );
    ";
    for s in sql_split::split(sql) {
        tx.execute(&s, ())?;
    }
    Ok(())
}

const SESSION_COLUMNS: &str = "id, start_time_ms, end_time_ms, origin_lat, origin_lng, destination_lat, destination_lng, is_active";
const LOCATION_COLUMNS: &str = "id, session_id, timestamp_ms, lat, lng";

// Row mappers return `anyhow::Result` inside the rusqlite result because the
// timestamp conversion can fail on its own.
fn session_of_row(row: &Row) -> rusqlite::Result<Result<Session>> {
    let start_time_ms: i64 = row.get(1)?;
    let end_time_ms: Option<i64> = row.get(2)?;
    let origin = Coordinate::new(row.get(3)?, row.get(4)?);
    let destination = Coordinate::new(row.get(5)?, row.get(6)?);
    let id: SessionId = row.get(0)?;
    let is_active: bool = row.get(7)?;
    Ok((|| -> Result<Session> {
        Ok(Session {
            id: Some(id),
            start_time: utils::timestamp_of_ms(start_time_ms)?,
            end_time: end_time_ms.map(utils::timestamp_of_ms).transpose()?,
            origin,
            destination,
            is_active,
        })
    })())
}

fn position_of_row(row: &Row) -> rusqlite::Result<Result<Position>> {
    let id: PositionId = row.get(0)?;
    let session_id: SessionId = row.get(1)?;
    let timestamp_ms: i64 = row.get(2)?;
    let coordinate = Coordinate::new(row.get(3)?, row.get(4)?);
    Ok(utils::timestamp_of_ms(timestamp_ms).map(|timestamp| Position {
        id: Some(id),
        coordinate,
        timestamp,
        session_id,
    }))
}

fn query_sessions(conn: &Connection, sql: &str) -> Result<Vec<Session>> {
    let mut query = conn.prepare(sql)?;
    let results = query.query_map((), session_of_row)?;
    let mut sessions = Vec::new();
    for result in results {
        sessions.push(result??);
    }
    Ok(sessions)
}

fn query_positions(conn: &Connection, session_id: Option<SessionId>) -> Result<Vec<Position>> {
    let mut positions = Vec::new();
    match session_id {
        None => {
            let mut query = conn.prepare_cached(&format!(
                "SELECT {} FROM location ORDER BY id;",
                LOCATION_COLUMNS
            ))?;
            for result in query.query_map((), position_of_row)? {
                positions.push(result??);
            }
        }
        Some(session_id) => {
            let mut query = conn.prepare_cached(&format!(
                "SELECT {} FROM location WHERE session_id = ?1 ORDER BY id;",
                LOCATION_COLUMNS
            ))?;
            for result in query.query_map((session_id,), position_of_row)? {
                positions.push(result??);
            }
        }
    }
    Ok(positions)
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow!("main db connection lock is poisoned"))
}

/// SQLite backed `Storage`. The async `Storage` methods run their queries on
/// tokio's blocking pool, the settings accessors are plain blocking calls.
pub struct MainDb {
    conn: Arc<Mutex<Connection>>,
}

impl MainDb {
    pub fn open(support_dir: &str) -> Result<MainDb> {
        debug!("open and run migration for main.db");
        let conn = Connection::open(Path::new(support_dir).join("main.db"))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<MainDb> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<MainDb> {
        open_db_and_run_migration(&mut conn, &[&migrate_v1])?;
        Ok(MainDb {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            f(&conn)
        })
        .await?
    }

    fn get_setting<T: FromStr>(&self, setting: Setting) -> Result<Option<T>>
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        let conn = lock_conn(&self.conn)?;
        let result: Option<String> = conn
            .query_row(
                "SELECT value FROM setting WHERE key = ?1;",
                [setting.to_db_key()],
                |row| row.get(0),
            )
            .optional()?;
        match result {
            None => Ok(None),
            Some(s) => {
                let v = FromStr::from_str(&s)?;
                Ok(Some(v))
            }
        }
    }

    pub fn get_setting_with_default<T: FromStr>(&self, setting: Setting, default: T) -> T
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        match self.get_setting(setting) {
            Ok(v) => v,
            Err(error) => {
                warn!(
                    "[main_db.get_setting_with_default] setting:{:?}, error:{}",
                    setting, error
                );
                None
            }
        }
        .unwrap_or(default)
    }

    pub fn set_setting<T: ToString>(&self, setting: Setting, value: T) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        let sql = "INSERT OR REPLACE INTO setting (key, value) VALUES (?1, ?2);";
        conn.execute(sql, (setting.to_db_key(), value.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for MainDb {
    async fn create_session(&self, session: &Session) -> Result<SessionId> {
        let session = session.clone();
        let id = self
            .run(move |conn| {
                let sql = "INSERT INTO session (start_time_ms, end_time_ms, origin_lat, origin_lng, destination_lat, destination_lng, is_active) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);";
                conn.execute(
                    sql,
                    (
                        utils::timestamp_to_ms(&session.start_time),
                        session.end_time.as_ref().map(utils::timestamp_to_ms),
                        session.origin.latitude,
                        session.origin.longitude,
                        session.destination.latitude,
                        session.destination.longitude,
                        session.is_active,
                    ),
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        info!("Session created: id={}", id);
        Ok(id)
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let id = session
            .id
            .ok_or_else(|| anyhow!("Updating a session that was never created"))?;
        let session = session.clone();
        let changes = self
            .run(move |conn| {
                let sql = "UPDATE session SET start_time_ms = ?2, end_time_ms = ?3, origin_lat = ?4, origin_lng = ?5, destination_lat = ?6, destination_lng = ?7, is_active = ?8 WHERE id = ?1;";
                Ok(conn.execute(
                    sql,
                    (
                        id,
                        utils::timestamp_to_ms(&session.start_time),
                        session.end_time.as_ref().map(utils::timestamp_to_ms),
                        session.origin.latitude,
                        session.origin.longitude,
                        session.destination.latitude,
                        session.destination.longitude,
                        session.is_active,
                    ),
                )?)
            })
            .await?;
        if changes == 1 {
            Ok(())
        } else {
            Err(anyhow!("Failed to find session with id = {}", id))
        }
    }

    async fn get_active_session(&self) -> Result<Option<Session>> {
        // newest first, in case a crash left more than one behind
        let sql = format!(
            "SELECT {} FROM session WHERE is_active = 1 ORDER BY id DESC LIMIT 1;",
            SESSION_COLUMNS
        );
        let sessions = self.run(move |conn| query_sessions(conn, &sql)).await?;
        Ok(sessions.into_iter().next())
    }

    async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        let sql = format!("SELECT {} FROM session ORDER BY id;", SESSION_COLUMNS);
        self.run(move |conn| query_sessions(conn, &sql)).await
    }

    async fn save_location(&self, position: &Position) -> Result<PositionId> {
        let position = position.clone();
        self.run(move |conn| {
            let sql = "INSERT INTO location (session_id, timestamp_ms, lat, lng) VALUES (?1, ?2, ?3, ?4);";
            conn.prepare_cached(sql)?.execute((
                position.session_id,
                utils::timestamp_to_ms(&position.timestamp),
                position.coordinate.latitude,
                position.coordinate.longitude,
            ))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_all_locations(&self) -> Result<Vec<Position>> {
        self.run(|conn| query_positions(conn, None)).await
    }

    async fn get_locations_by_session(&self, session_id: SessionId) -> Result<Vec<Position>> {
        self.run(move |conn| query_positions(conn, Some(session_id)))
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Setting {
    CrowdMode,
}

impl Setting {
    fn to_db_key(self) -> &'static str {
        match self {
            Self::CrowdMode => "CROWD_MODE",
        }
    }
}
