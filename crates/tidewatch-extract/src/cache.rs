//! SQLite cache of extracted mod configuration schemas.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::error::ExtractError;
use crate::schema::init_schema;

/// One cached row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModInfo {
    pub mod_id: String,
    pub info: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cache keyed by mod id.
pub struct ModCache {
    conn: Connection,
}

impl ModCache {
    pub async fn in_memory() -> Result<Self, ExtractError> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| Ok(init_schema(conn)?)).await?;
        Ok(Self { conn })
    }

    /// Open (and create if needed) a file-backed cache.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExtractError::Cache(format!("create {:?}: {}", parent, e)))?;
        }
        let conn = Connection::open(&path).await?;
        conn.call(|conn| Ok(init_schema(conn)?)).await?;
        debug!(path = ?path, "Mod cache opened");
        Ok(Self { conn })
    }

    /// Insert or update every entry in one transaction.
    ///
    /// Existing rows keep their `created_at`; `info` and `updated_at` are
    /// overwritten.
    pub async fn upsert_many(&self, entries: Vec<(String, Value)>) -> Result<(), ExtractError> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let rows = entries
            .into_iter()
            .map(|(id, info)| {
                serde_json::to_string(&info)
                    .map(|text| (id, text))
                    .map_err(|e| ExtractError::Cache(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO mod_info (mod_id, info, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?3)
                         ON CONFLICT(mod_id) DO UPDATE SET
                             info = excluded.info,
                             updated_at = excluded.updated_at",
                    )?;
                    for (id, info) in &rows {
                        stmt.execute(params![id, info, now])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn upsert(&self, mod_id: &str, info: Value) -> Result<(), ExtractError> {
        self.upsert_many(vec![(mod_id.to_string(), info)]).await
    }

    /// Full row for one id.
    pub async fn get_record(&self, mod_id: &str) -> Result<Option<ModInfo>, ExtractError> {
        let mod_id = mod_id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT mod_id, info, created_at, updated_at FROM mod_info WHERE mod_id = ?1",
                    [&mod_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        let Some((mod_id, info, created_at, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(ModInfo {
            mod_id,
            info: parse_info(&info)?,
            created_at: parse_time(&created_at)?,
            updated_at: parse_time(&updated_at)?,
        }))
    }

    /// Cached payload for one id.
    pub async fn get(&self, mod_id: &str) -> Result<Option<Value>, ExtractError> {
        Ok(self.get_record(mod_id).await?.map(|r| r.info))
    }

    /// Cached payloads for `ids`; missing ids are absent from the map.
    pub async fn get_many(&self, ids: &[String]) -> Result<HashMap<String, Value>, ExtractError> {
        let ids = ids.to_vec();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT info FROM mod_info WHERE mod_id = ?1")?;
                let mut rows = Vec::new();
                for id in ids {
                    match stmt.query_row([&id], |row| row.get::<_, String>(0)) {
                        Ok(info) => rows.push((id, info)),
                        Err(rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, info)| Ok((id, parse_info(&info)?)))
            .collect()
    }

    pub async fn count(&self) -> Result<usize, ExtractError> {
        let count = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM mod_info", [], |row| row.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(count.max(0) as usize)
    }
}

fn parse_info(text: &str) -> Result<Value, ExtractError> {
    serde_json::from_str(text).map_err(|e| ExtractError::Cache(format!("corrupt payload: {}", e)))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, ExtractError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ExtractError::Cache(format!("corrupt timestamp '{}': {}", text, e)))
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
