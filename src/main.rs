use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use crate::db::open::{open_db, release_or_rollback};
use crate::db::sweep::load::{get_history, get_manifest};
use crate::dispatch::dispatch;
use crate::launcher::Launcher;
use crate::request::message::Message;
use crate::request::schema::load_schema;
use crate::sweep::sweep_request::SweepRequest;

mod db;
mod dispatch;
mod launcher;
mod request;
mod slurm;
mod sweep;

/// Submit and dispatch hyperparameter sweeps of a training program on SLURM
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sweep request JSON, the bundled look-ahead sweep is used if absent
    #[arg(short, long, global = true)]
    request: Option<PathBuf>,
    /// Directory holding the database and one directory per sweep
    #[arg(short, long, global = true, default_value = ".")]
    work_dir: PathBuf,
    /// Render and record but don't submit, database changes are rolled back
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the job script without submitting it
    Render,
    /// Render the job script and submit it with sbatch
    Submit {
        /// sbatch executable
        #[arg(long, default_value = "sbatch")]
        sbatch: PathBuf,
    },
    /// Activate the environment, launch every job and wait for all of them
    Run {
        #[arg(short, long, value_enum, default_value_t = Launcher::Srun)]
        launcher: Launcher,
    },
    /// List recorded sweeps
    History,
    /// Print the request recorded for a sweep
    Show {
        /// Sweep id, as listed by history
        id: i64,
    },
}

pub struct WorkingDirectory {
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("terve! starting up :)");

    let args = Args::parse();
    fs::create_dir_all(&args.work_dir)
        .with_context(|| format!("Can't create working directory {}", args.work_dir.display()))?;
    let wd = WorkingDirectory { path: args.work_dir.clone() };

    match args.command {
        Command::Render => {
            let request = read_request(&args)?;
            let job = request.create(&wd)?;
            println!("{}", job.path.display());
        }
        Command::Submit { ref sbatch } => {
            let request = read_request(&args)?;
            if let Some(slurm_id) = request.stage_and_submit(&wd, sbatch, args.dry_run)? {
                println!("{slurm_id}");
            }
        }
        Command::Run { launcher } => {
            let request = read_request(&args)?;
            let outcomes = dispatch(&request, launcher, &wd.path).await?;
            let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
            match failed {
                0 => info!("All {} jobs finished", outcomes.len()),
                n => warn!("{n} of {} jobs failed", outcomes.len()),
            }
        }
        Command::History => {
            let conn = open_db(&wd)?;
            for record in get_history(&conn)? {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    record.id,
                    record.name,
                    record.staged,
                    record.submitted,
                    record.slurm_id.as_deref().unwrap_or("-"),
                    record.created_at
                );
            }
            release_or_rollback(&conn, false)?;
        }
        Command::Show { id } => {
            let conn = open_db(&wd)?;
            let request = get_manifest(&conn, id)?;
            println!("{}", serde_json::to_string_pretty(&request)?);
            release_or_rollback(&conn, false)?;
        }
    }

    info!("finished :)");
    Ok(())
}

fn read_request(args: &Args) -> Result<SweepRequest> {
    let message = Message { path: args.request.clone(), compiled_schema: load_schema()? };
    let request = message.read()?;
    Ok(request)
}
