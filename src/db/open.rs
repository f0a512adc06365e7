use log::info;
use crate::WorkingDirectory;

pub fn open_db(wd: &WorkingDirectory) -> rusqlite::Result<rusqlite::Connection> {
    let path = &wd.path.join("elmsweep.db");
    if !path.exists() { info!("Creating new database {}", path.display()) }
    let conn = rusqlite::Connection::open(path)?;

    static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/db/schema.sql"));
    conn.execute_batch(SCHEMA)?;

    info!("Creating dry run save point");
    conn.execute_batch("SAVEPOINT dry_run")?;

    Ok(conn)
}

/// Keep or discard everything done since [open_db]
pub fn release_or_rollback(conn: &rusqlite::Connection, dry_run: bool) -> rusqlite::Result<()> {
    match dry_run {
        true => {
            info!("--dry-run set, rolling back database state");
            conn.execute_batch("ROLLBACK TO dry_run; RELEASE dry_run")
        }
        false => {
            info!("--dry-run not set, releasing dry run save point");
            conn.execute_batch("RELEASE dry_run")
        }
    }
}
