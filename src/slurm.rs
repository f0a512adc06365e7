//! Hand rendered job scripts to the SLURM scheduler

/// Submit a job script with sbatch and read back the job id
pub mod sbatch;
