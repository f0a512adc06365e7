use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;

use crate::db::open::{open_db, release_or_rollback};
use crate::db::sweep::state::SweepState;
use crate::slurm::sbatch::run_sbatch;
use crate::sweep::job::JobPath;
use crate::sweep::sweep_request::SweepRequest;
use crate::WorkingDirectory;

impl SweepRequest {
    /// Render, record and submit a sweep, returning the SLURM job id unless this is a dry run
    ///
    /// Once staged, the ledger entry is kept even when sbatch fails.
    pub fn stage_and_submit(&self, wd: &WorkingDirectory, sbatch: &Path, dry_run: bool) -> Result<Option<String>> {
        let conn = open_db(wd)?;
        let id = self.insert(&conn)?;
        let job = self.create(wd)?;
        self.stage(&conn, id)?;

        let submitted = match dry_run {
            true => {
                info!("--dry-run set, not submitting {}", job.path.display());
                Ok(None)
            }
            false => self.submit(&conn, id, sbatch, &job).map(Some),
        };
        release_or_rollback(&conn, dry_run)?;
        submitted
    }

    /// Record a new sweep, returning its row id
    pub fn insert(&self, conn: &Connection) -> Result<i64> {
        let manifest = serde_json::to_string(self)?;
        info!("Adding {} to db", &self.name);
        conn.execute(
            "INSERT INTO sweep (name, manifest) VALUES (?1, ?2)",
            (&self.name, &manifest),
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn stage(&self, conn: &Connection, id: i64) -> Result<()> {
        self.update(conn, id, SweepState::Staged)
    }

    /// Run sbatch and record the SLURM job id
    pub fn submit(&self, conn: &Connection, id: i64, sbatch: &Path, job: &JobPath) -> Result<String> {
        let slurm_id = run_sbatch(sbatch, job)?;
        info!("SLURM job id: {slurm_id}");
        self.update(conn, id, SweepState::Submitted)?;
        self.update_slurm(conn, id, &slurm_id)?;
        Ok(slurm_id)
    }

    fn update_slurm(&self, conn: &Connection, id: i64, slurm_id: &str) -> Result<()> {
        info!("Updating {} with slurm ID {slurm_id}", &self.name);
        conn.execute("UPDATE sweep SET slurm_id = ?1 WHERE id = ?2", (slurm_id, id))
            .context("Update slurm id")?;
        Ok(())
    }

    fn update(&self, conn: &Connection, id: i64, state: SweepState) -> Result<()> {
        let col = state.column();
        info!("Updating {} with state {col}", &self.name);
        let stmt = format!("UPDATE sweep SET {col} = 1 WHERE id = (?1)");

        conn.execute(&stmt, [id])
            .with_context(|| format!("Update sweep status to {col}"))?;
        Ok(())
    }
}
