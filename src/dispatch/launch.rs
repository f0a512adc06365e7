use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use log::info;
use tokio::process::{Child, Command};

use crate::dispatch::environment::ActivatedEnvironment;
use crate::launcher::Launcher;
use crate::sweep::args::to_cli;
use crate::sweep::sweep_request::{SweepJob, SweepRequest};

/// A running job, returned by [launch] and consumed by the join
pub struct LaunchHandle {
    pub name: String,
    pub child: Child,
}

/// Full argv for one job as an exclusive `srun` step
///
/// The same argv is used by the rendered job script and by the dispatcher, so both paths start jobs
/// identically.
pub fn srun_argv(request: &SweepRequest, job: &SweepJob) -> Vec<String> {
    let slice = &request.slice;
    let mut argv = vec!["srun".to_string()];
    if slice.exclusive {
        argv.push("--exclusive".to_string());
    }
    argv.push(format!("--ntasks={}", slice.ntasks));
    argv.push(format!("--cpus-per-task={}", slice.cpus_per_task));
    argv.push(format!("--output={}", request.resources.output));
    argv.push(format!("--error={}", request.resources.error));
    argv.extend(program_argv(request, job));
    argv
}

/// Program and arguments without any launcher prefix
pub fn program_argv(request: &SweepRequest, job: &SweepJob) -> Vec<String> {
    let mut argv = request.program.argv();
    argv.extend(to_cli(&job.args));
    argv
}

/// Expand the SLURM filename pattern subset used for log paths outside of SLURM
///
/// `%j` is the job id, `%t` the task index, `%x` the job name and `%%` a literal percent sign.
/// Unknown placeholders are kept as they are.
pub fn expand_log_pattern(pattern: &str, job_id: &str, task: usize, name: &str) -> String {
    let mut expanded = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            expanded.push(c);
            continue;
        }
        match chars.next() {
            Some('j') => expanded.push_str(job_id),
            Some('t') => expanded.push_str(&task.to_string()),
            Some('x') => expanded.push_str(name),
            Some('%') => expanded.push('%'),
            Some(other) => {
                expanded.push('%');
                expanded.push(other);
            }
            None => expanded.push('%'),
        }
    }
    expanded
}

/// Start one job; returns as soon as the child is spawned
pub fn launch(
    request: &SweepRequest,
    job: &SweepJob,
    launcher: Launcher,
    env: &ActivatedEnvironment,
    log_dir: &Path,
) -> Result<LaunchHandle> {
    let argv = match launcher {
        Launcher::Srun => srun_argv(request, job),
        Launcher::Local => program_argv(request, job),
    };

    let mut cmd = Command::new(&argv[0]);
    // relative log patterns resolve against the working directory for both launchers
    cmd.args(&argv[1..]).current_dir(log_dir).stdin(Stdio::null());
    env.apply(&mut cmd);

    if launcher == Launcher::Local {
        // srun writes its own log streams, locally we template them ourselves
        let (out, err) = local_log_paths(request, job, log_dir);
        let stdout = File::create(&out).with_context(|| format!("Can't create {}", out.display()))?;
        let stderr = File::create(&err).with_context(|| format!("Can't create {}", err.display()))?;
        cmd.stdout(stdout).stderr(stderr);
    }

    info!("Launching {} with {launcher}", job.name);
    info!("{:?}", &cmd);
    let child = cmd
        .spawn()
        .with_context(|| format!("Can't launch {} ({})", job.name, argv[0]))?;

    Ok(LaunchHandle { name: job.name.clone(), child })
}

fn local_log_paths(request: &SweepRequest, job: &SweepJob, log_dir: &Path) -> (PathBuf, PathBuf) {
    let expand = |pattern: &str| {
        log_dir.join(expand_log_pattern(pattern, "local", job.index, &request.name))
    };
    (expand(&request.resources.output), expand(&request.resources.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::message::default_request;

    fn request() -> SweepRequest {
        serde_json::from_str(default_request()).unwrap()
    }

    #[test]
    fn srun_step_is_an_exclusive_slice() {
        let request = request();
        let job = &request.jobs()[3];
        let argv = srun_argv(&request, job);
        assert_eq!(
            &argv[..8],
            &[
                "srun",
                "--exclusive",
                "--ntasks=2",
                "--cpus-per-task=4",
                "--output=slurm-%j_%t.out",
                "--error=slurm-%j_%t.err",
                "python",
                "train.py"
            ]
        );
        let look_ahead = argv.iter().position(|a| a == "--label_look_ahead").unwrap();
        assert_eq!(argv[look_ahead + 1], "150");
    }

    #[test]
    fn non_exclusive_slice_drops_the_flag() {
        let mut request = request();
        request.slice.exclusive = false;
        let argv = srun_argv(&request, &request.jobs()[0]);
        assert!(!argv.contains(&"--exclusive".to_string()));
    }

    #[test]
    fn program_argv_has_no_launcher() {
        let request = request();
        let argv = program_argv(&request, &request.jobs()[0]);
        assert_eq!(&argv[..4], &["python", "train.py", "--device", "cuda"]);
        assert!(argv.contains(&"--normalize_data".to_string()));
    }

    #[test]
    fn log_patterns() {
        assert_eq!(expand_log_pattern("slurm-%j_%t.out", "local", 3, "sweep"), "slurm-local_3.out");
        assert_eq!(expand_log_pattern("%x-%%-%N", "7", 0, "sweep"), "sweep-%-%N");
        assert_eq!(expand_log_pattern("trailing%", "7", 0, "sweep"), "trailing%");
    }
}
