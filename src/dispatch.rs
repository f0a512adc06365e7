//! Run a sweep directly: activate the environment, launch every job, then wait for all of them
//!
//! Used inside an existing allocation (`salloc`, or the body of a batch script) with the srun
//! launcher, or on a workstation with the local launcher. Individual job failures are reported but
//! never change the outcome of the dispatch.

use std::path::Path;

use anyhow::Result;
use log::{info, warn};

use crate::dispatch::environment::activate;
use crate::dispatch::launch::{launch, LaunchHandle};
use crate::launcher::Launcher;
use crate::sweep::sweep_request::SweepRequest;

/// Resolve and export the runtime environment
pub mod environment;
/// Build launch command lines and spawn jobs
pub mod launch;

/// How one job ended
#[derive(Debug, PartialEq)]
pub struct JobOutcome {
    pub name: String,
    /// Exit code, `None` if the job never started or was killed by a signal
    pub code: Option<i32>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }
}

pub async fn dispatch(request: &SweepRequest, launcher: Launcher, log_dir: &Path) -> Result<Vec<JobOutcome>> {
    let env = activate(&request.environment).await?;

    let jobs = request.jobs();
    info!("Launching {} jobs for sweep {}", jobs.len(), request.name);

    let mut handles = Vec::with_capacity(jobs.len());
    let mut outcomes = Vec::new();
    for job in &jobs {
        match launch(request, job, launcher, &env, log_dir) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                warn!("{err:#}");
                outcomes.push(JobOutcome { name: job.name.clone(), code: None });
            }
        }
    }

    outcomes.extend(join(handles).await);
    Ok(outcomes)
}

/// Block until every launched job has terminated
pub async fn join(handles: Vec<LaunchHandle>) -> Vec<JobOutcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for LaunchHandle { name, mut child } in handles {
        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(err) => {
                warn!("Lost track of {name}: {err}");
                None
            }
        };
        let outcome = JobOutcome { name, code };
        match outcome.succeeded() {
            true => info!("{} finished", outcome.name),
            false => warn!("{} failed with exit code {:?}", outcome.name, outcome.code),
        }
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;

    fn request(script: &Path, marker_dir: &Path) -> SweepRequest {
        serde_json::from_value(json!({
            "name": "marker",
            "resources": {
                "nodes": 1, "ntasks": 3, "cpus_per_task": 1,
                "memory": "1G", "time": "00:05:00",
                "output": "%x-%t.out", "error": "%x-%t.err"
            },
            "slice": { "ntasks": 1, "cpus_per_task": 1 },
            "environment": { "manager": "none" },
            "program": { "interpreter": "sh", "script": script.to_str().unwrap() },
            "shared_args": { "marker": marker_dir.to_str().unwrap(), "label_look_ahead": 0 },
            "variants": [
                { "overrides": { "label_look_ahead": 0 } },
                { "overrides": { "label_look_ahead": 50 } },
                { "overrides": { "label_look_ahead": 100 } }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn join_waits_for_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        fs::write(&script, "sleep 0.2\necho \"$4\"\necho done > \"$2/$4.done\"\n").unwrap();

        let request = request(&script, dir.path());
        let outcomes = dispatch(&request, Launcher::Local, dir.path()).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(JobOutcome::succeeded));
        for look_ahead in [0, 50, 100] {
            assert!(dir.path().join(format!("{look_ahead}.done")).exists());
        }
        let stdout = fs::read_to_string(dir.path().join("marker-1.out")).unwrap();
        assert_eq!(stdout.trim(), "50");
    }

    #[tokio::test]
    async fn failed_jobs_do_not_fail_the_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        fs::write(&script, "echo broken >&2\nexit 3\n").unwrap();

        let request = request(&script, dir.path());
        let outcomes = dispatch(&request, Launcher::Local, dir.path()).await.unwrap();

        assert_eq!(outcomes.iter().map(|o| o.code).collect::<Vec<_>>(), vec![Some(3); 3]);
        let stderr = fs::read_to_string(dir.path().join("marker-0.err")).unwrap();
        assert_eq!(stderr.trim(), "broken");
    }

    #[tokio::test]
    async fn jobs_run_in_the_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        fs::write(&script, "echo here > \"relative-$4.txt\"\n").unwrap();

        let request = request(&script, dir.path());
        let outcomes = dispatch(&request, Launcher::Local, dir.path()).await.unwrap();

        assert!(outcomes.iter().all(JobOutcome::succeeded));
        for look_ahead in [0, 50, 100] {
            assert!(dir.path().join(format!("relative-{look_ahead}.txt")).exists());
        }
    }

    #[tokio::test]
    async fn unlaunchable_program_is_an_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = request(Path::new("unused"), dir.path());
        request.program.interpreter = Some("/nonexistent/interpreter".to_string());

        let outcomes = dispatch(&request, Launcher::Local, dir.path()).await.unwrap();
        assert!(outcomes.iter().all(|o| o.code.is_none()));
    }

    #[tokio::test]
    async fn activation_failure_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        fs::write(&script, "echo done > \"$2/$4.done\"\n").unwrap();
        let mut request = request(&script, dir.path());
        request.environment.manager = crate::sweep::sweep_request::EnvironmentManager::Conda;
        request.environment.name = None;

        assert!(dispatch(&request, Launcher::Local, dir.path()).await.is_err());
        assert!(!dir.path().join("0.done").exists());
    }
}
