use rusqlite::Connection;

use crate::sweep::sweep_request::SweepRequest;

/// One ledger row
#[derive(Debug)]
pub struct SweepRecord {
    pub id: i64,
    pub name: String,
    pub staged: bool,
    pub submitted: bool,
    pub slurm_id: Option<String>,
    pub created_at: String,
}

pub fn get_history(conn: &Connection) -> rusqlite::Result<Vec<SweepRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, staged, submitted, slurm_id, created_at FROM sweep ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SweepRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            staged: row.get(2)?,
            submitted: row.get(3)?,
            slurm_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

/// Deserialise the request that was recorded for a sweep
pub fn get_manifest(conn: &Connection, id: i64) -> anyhow::Result<SweepRequest> {
    let json: String = conn.query_row("SELECT manifest FROM sweep WHERE id = ?1", [id], |row| row.get(0))?;
    Ok(serde_json::from_str(&json)?)
}
