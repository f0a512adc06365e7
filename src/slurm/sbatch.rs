use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use log::info;

use crate::sweep::job::JobPath;

/// Submit a job script, returning the SLURM job id
///
/// The job runs with the sweep directory as its working directory, so relative log patterns land
/// next to the script.
pub fn run_sbatch(sbatch: &Path, job_path: &JobPath) -> Result<String> {
    let wd = job_path
        .path
        .parent()
        .ok_or_else(|| anyhow!("Job script {} has no parent directory", job_path.path.display()))?;

    let mut sbatch_cmd = Command::new(sbatch);
    let cmd = sbatch_cmd
        .arg("--parsable")
        .arg("--chdir")
        .arg(wd)
        .arg(&job_path.path);
    info!("Running sbatch process");
    info!("{:?}", &cmd);

    let output = cmd
        .output()
        .with_context(|| format!("Failed to execute {}", sbatch.display()))?;
    if !output.status.success() {
        bail!("sbatch failed: {}", String::from_utf8_lossy(&output.stderr).trim());
    }

    parse_job_id(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `sbatch --parsable` output: `<job id>[;<cluster>]`
pub fn parse_job_id(stdout: &str) -> Result<String> {
    let raw = stdout.trim();
    let id = raw.split(';').next().unwrap_or(raw);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        bail!("Can't parse SLURM job id from sbatch output {raw:?}");
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    use super::*;

    fn fake_sbatch(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("sbatch");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn job(dir: &Path) -> JobPath {
        let path = dir.join("job.sh");
        fs::write(&path, "#!/bin/bash\nwait\n").unwrap();
        JobPath { path }
    }

    #[test]
    fn parsable_output() {
        assert_eq!(parse_job_id("4242\n").unwrap(), "4242");
        assert_eq!(parse_job_id("4242;puhti\n").unwrap(), "4242");
        assert!(parse_job_id("").is_err());
        assert!(parse_job_id("Submitted batch job 4242").is_err());
    }

    #[test]
    fn submits_with_parsable_and_chdir() {
        let dir = tempfile::tempdir().unwrap();
        let args = dir.path().join("args");
        let sbatch = fake_sbatch(dir.path(), &format!("echo \"$@\" > {}\necho '4242;puhti'", args.display()));
        let job = job(dir.path());

        assert_eq!(run_sbatch(&sbatch, &job).unwrap(), "4242");
        let seen = fs::read_to_string(args).unwrap();
        assert_eq!(
            seen.trim(),
            format!("--parsable --chdir {} {}", dir.path().display(), job.path.display())
        );
    }

    #[test]
    fn scheduler_rejection_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sbatch = fake_sbatch(dir.path(), "echo 'QOSMaxGRESPerUser' >&2\nexit 1");
        let err = run_sbatch(&sbatch, &job(dir.path())).unwrap_err();
        assert!(err.to_string().contains("QOSMaxGRESPerUser"));
    }
}
