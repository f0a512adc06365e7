use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::dispatch::launch::srun_argv;
use crate::sweep::args::shell_quote;
use crate::sweep::sweep_request::{EnvironmentManager, ResourceDescriptor, SweepRequest};
use crate::WorkingDirectory;

/// A JobPath is the path to a job script that's submitted to SLURM via sbatch
///
/// The normalised request is written next to it as request.json
pub struct JobPath {
    pub path: PathBuf,
}

impl SweepRequest {
    /// Render the job script into a fresh sweep directory below the working directory
    pub fn create(&self, wd: &WorkingDirectory) -> Result<JobPath> {
        let instance_wd = WorkingDirectory { path: wd.path.join(&self.name) };
        info!("Creating sweep {} in working directory {}", &self.name, &instance_wd.path.display());

        if instance_wd.path.exists() {
            warn!("Sweep directory already exists, files will be overwritten");
            fs::remove_dir_all(&instance_wd.path)
                .with_context(|| format!("Can't delete {}", instance_wd.path.display()))?;
        }
        fs::create_dir_all(&instance_wd.path)
            .with_context(|| format!("Can't create {}", instance_wd.path.display()))?;

        let header: Header = render_header(self)?;
        let environment: EnvironmentSection = render_environment(self)?;
        let steps: Steps = render_steps(self)?;
        let job = JobTemplate { header, environment, steps };

        let path = instance_wd.path.join("job.sh");
        job.write(&path).context("Can't write job script")?;
        write_request(self, &instance_wd)?;

        Ok(JobPath { path })
    }
}

/// All rendered sections of a sweep job script
struct JobTemplate {
    header: Header,
    environment: EnvironmentSection,
    steps: Steps,
}

impl JobTemplate {
    /// Write complete job script to disk by appending rendered template sections to the file
    fn write(self, out_path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(out_path)?;

        // activation must come before any launch
        let contents = [
            self.header.content,
            self.environment.content,
            self.steps.content,
        ];

        for content in contents.iter() {
            file.write_all(content.as_bytes())?;
        }

        Ok(())
    }
}

/// Rendered SBATCH header
///
/// SLURM jobs options are parsed by sbatch using #SBATCH headers [before executable commands](https://slurm.schedmd.com/sbatch.html#SECTION_DESCRIPTION).
/// The whole resource descriptor lands here: nodes, tasks, cpus, gpus, memory, wall time, mail
/// notification and log path patterns.
struct Header {
    content: String,
}

/// Rendered environment activation
///
/// Runs under `set -e` so a failed activation aborts the job before any step is launched.
struct EnvironmentSection {
    content: String,
}

/// Rendered job steps: one backgrounded `srun --exclusive` per variant followed by `wait`
struct Steps {
    content: String,
}

/// Rendering context for header
#[derive(Serialize)]
struct HeaderContext {
    name: String,
    jobs: usize,
    directives: Vec<String>,
    time_now: String,
}

/// Rendering context for environment activation
#[derive(Serialize)]
struct EnvironmentContext {
    name: String,
}

#[derive(Serialize)]
struct StepContext {
    name: String,
    command: String,
}

/// Rendering context for job steps
#[derive(Serialize)]
struct StepsContext {
    steps: Vec<StepContext>,
}

fn template_engine<'a>(name: &'a str, template: &'a str) -> Result<TinyTemplate<'a>> {
    let mut tt = TinyTemplate::new();
    // rendered text is bash, not HTML
    tt.set_default_formatter(&format_unescaped);
    tt.add_template(name, template)
        .with_context(|| format!("Invalid {name} template"))?;
    Ok(tt)
}

/// `#SBATCH` directive values for a resource descriptor, in header order
pub fn directives(name: &str, resources: &ResourceDescriptor) -> Vec<String> {
    let mut directives = vec![
        format!("--job-name={name}"),
        format!("--nodes={}", resources.nodes),
        format!("--ntasks={}", resources.ntasks),
        format!("--cpus-per-task={}", resources.cpus_per_task),
    ];
    if resources.gpus > 0 {
        directives.push(format!("--gres=gpu:{}", resources.gpus));
    }
    directives.push(format!("--mem={}", resources.memory));
    directives.push(format!("--time={}", resources.time));
    if let Some(partition) = &resources.partition {
        directives.push(format!("--partition={partition}"));
    }
    if !resources.mail_type.is_empty() {
        let events: Vec<String> = resources.mail_type.iter().map(|e| e.to_string()).collect();
        directives.push(format!("--mail-type={}", events.join(",")));
    }
    if let Some(user) = &resources.mail_user {
        directives.push(format!("--mail-user={user}"));
    }
    directives.push(format!("--output={}", resources.output));
    directives.push(format!("--error={}", resources.error));
    directives
}

/// Render the SBATCH header using TinyTemplate
fn render_header(request: &SweepRequest) -> Result<Header> {
    /// included header template
    static HEADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/header.txt"));
    let tt = template_engine("header", HEADER)?;

    let context = HeaderContext {
        name: request.name.clone(),
        jobs: request.variants.len(),
        directives: directives(&request.name, &request.resources),
        time_now: Utc::now().to_string(),
    };

    Ok(Header { content: tt.render("header", &context)? })
}

/// Render environment activation, empty when no manager is configured
fn render_environment(request: &SweepRequest) -> Result<EnvironmentSection> {
    /// included conda activation template
    static CONDA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/environment.txt"));

    let name = match (request.environment.manager, &request.environment.name) {
        (EnvironmentManager::Conda, Some(name)) => name,
        (EnvironmentManager::Conda, None) => anyhow::bail!("Conda environment has no name"),
        (EnvironmentManager::None, _) => return Ok(EnvironmentSection { content: String::new() }),
    };

    let tt = template_engine("environment", CONDA)?;
    let context = EnvironmentContext { name: shell_quote(name) };
    Ok(EnvironmentSection { content: tt.render("environment", &context)? })
}

/// Render one backgrounded srun step per job using TinyTemplate
fn render_steps(request: &SweepRequest) -> Result<Steps> {
    /// included steps template
    static STEPS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/steps.txt"));
    let tt = template_engine("steps", STEPS)?;

    let steps = request
        .jobs()
        .iter()
        .map(|job| StepContext {
            name: job.name.clone(),
            command: srun_argv(request, job)
                .iter()
                .map(|word| shell_quote(word))
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect();

    Ok(Steps { content: tt.render("steps", &StepsContext { steps })? })
}

/// Write the normalised request to the sweep directory
fn write_request(request: &SweepRequest, wd: &WorkingDirectory) -> Result<()> {
    let json = serde_json::to_string_pretty(request)?;
    let out_path = wd.path.join("request.json");
    info!("Writing request to {}", out_path.display());
    fs::write(&out_path, json).with_context(|| format!("Can't write {}", out_path.display()))
}
