use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::models::{
    format_as_str, parse_datetime, parse_format, parse_source, source_as_str, HistoryEntry,
};
use super::ScanHistory;

const DEFAULT_LIST_LIMIT: u32 = 50;

fn row_to_entry(row: &Row) -> Result<HistoryEntry> {
    let format: String = row.get("format")?;
    let source: String = row.get("source")?;
    let scanned_at: String = row.get("scanned_at")?;

    Ok(HistoryEntry {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        value: row.get("value")?,
        format: parse_format(&format)?,
        source: parse_source(&source)?,
        scanned_at: parse_datetime(&scanned_at, "scanned_at")?,
    })
}

fn insert(conn: &mut Connection, entry: &HistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO scan_history (id, session_id, value, format, source, scanned_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id,
            entry.session_id,
            entry.value,
            format_as_str(entry.format),
            source_as_str(entry.source),
            entry.scanned_at.to_rfc3339(),
        ],
    )
    .context("failed to insert history entry")?;
    Ok(())
}

impl ScanHistory {
    pub async fn record(&self, entry: HistoryEntry) -> Result<HistoryEntry> {
        self.execute(move |conn| {
            insert(conn, &entry)?;
            Ok(entry)
        })
        .await
    }

    /// Fire-and-forget insert, usable from synchronous callbacks.
    pub fn record_detached(&self, entry: HistoryEntry) -> Result<()> {
        self.submit("insert", move |conn| insert(conn, &entry))
    }

    /// Most recent first. `None` uses a default page size.
    pub async fn list(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, value, format, source, scanned_at
                 FROM scan_history
                 ORDER BY scanned_at DESC, rowid DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    /// `false` if no entry had that id.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute("DELETE FROM scan_history WHERE id = ?1", params![id])
                .context("failed to delete history entry")?;
            Ok(removed > 0)
        })
        .await
    }

    /// Returns how many entries were deleted.
    pub async fn clear(&self) -> Result<usize> {
        self.execute(|conn| {
            conn.execute("DELETE FROM scan_history", [])
                .context("failed to clear history")
        })
        .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM scan_history", [], |row| {
                row.get(0)
            })?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }
}
