use anyhow::Result;
use chrono::{DateTime, Utc};

// Timestamps are stored as epoch milliseconds in the db.
pub fn timestamp_to_ms(timestamp: &DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

pub fn timestamp_of_ms(timestamp_ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| anyhow!("invalid timestamp in db: {}", timestamp_ms))
}

pub mod db {
    use anyhow::Result;
    use rusqlite::{OptionalExtension, Transaction};

    pub fn init_metadata_and_get_version(tx: &Transaction) -> Result<i32> {
        let create_db_metadata_sql = "
        CREATE TABLE IF NOT EXISTS `db_metadata` (
            `key`	TEXT NOT NULL,
            `value`	TEXT,
            PRIMARY KEY(`key`)
        )";
        tx.execute(create_db_metadata_sql, ())?;

        let version_str: Option<String> = tx
            .query_row(
                "SELECT `value` FROM `db_metadata` WHERE key='version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let version = match version_str {
            None => 0,
            Some(s) => s.parse()?,
        };
        Ok(version)
    }

    pub fn set_version_in_metadata(tx: &Transaction, version: i32) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO `db_metadata` (key, value) VALUES (?1, ?2)",
            ("version", version.to_string()),
        )?;
        Ok(())
    }
}
