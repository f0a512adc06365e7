use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sweep::args::{merge, ArgumentSet};

/// Aggregate resource envelope requested from SLURM for the whole batch
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceDescriptor {
    pub nodes: u32,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    #[serde(default)]
    pub gpus: u32,
    pub memory: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default)]
    pub mail_type: Vec<NotifyEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_user: Option<String>,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_error")]
    pub error: String,
}

fn default_output() -> String {
    "slurm-%j_%t.out".to_string()
}

fn default_error() -> String {
    "slurm-%j_%t.err".to_string()
}

/// Job lifecycle events that trigger a mail notification (`--mail-type`)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotifyEvent {
    None,
    Begin,
    End,
    Fail,
    Requeue,
    All,
    InvalidDepend,
    StageOut,
    TimeLimit,
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NotifyEvent::None => write!(f, "NONE"),
            NotifyEvent::Begin => write!(f, "BEGIN"),
            NotifyEvent::End => write!(f, "END"),
            NotifyEvent::Fail => write!(f, "FAIL"),
            NotifyEvent::Requeue => write!(f, "REQUEUE"),
            NotifyEvent::All => write!(f, "ALL"),
            NotifyEvent::InvalidDepend => write!(f, "INVALID_DEPEND"),
            NotifyEvent::StageOut => write!(f, "STAGE_OUT"),
            NotifyEvent::TimeLimit => write!(f, "TIME_LIMIT"),
        }
    }
}

/// The share of the allocation each launched job gets (`srun --exclusive`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceSlice {
    pub ntasks: u32,
    pub cpus_per_task: u32,
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
}

fn default_exclusive() -> bool {
    true
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentManager {
    Conda,
    None,
}

/// Runtime environment activated before any job starts
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Environment {
    pub manager: EnvironmentManager,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// External program launched once per job
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Program {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    pub script: String,
}

impl Program {
    /// Leading argv, e.g. `["python", "train.py"]`
    pub fn argv(&self) -> Vec<String> {
        self.interpreter
            .iter()
            .cloned()
            .chain(std::iter::once(self.script.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Variant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub overrides: ArgumentSet,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SweepRequest {
    pub name: String,
    pub resources: ResourceDescriptor,
    pub slice: ResourceSlice,
    pub environment: Environment,
    pub program: Program,
    pub shared_args: ArgumentSet,
    pub variants: Vec<Variant>,
}

/// One launch of the training program with its own argument set
#[derive(Debug, Clone, PartialEq)]
pub struct SweepJob {
    pub index: usize,
    pub name: String,
    pub args: ArgumentSet,
}

impl SweepRequest {
    /// Check constraints the JSON schema can't express
    pub fn check(&self) -> Result<(), String> {
        if self.variants.is_empty() {
            return Err("a sweep needs at least one variant".to_string());
        }

        let counts = [
            ("resources.nodes", self.resources.nodes),
            ("resources.ntasks", self.resources.ntasks),
            ("resources.cpus_per_task", self.resources.cpus_per_task),
            ("slice.ntasks", self.slice.ntasks),
            ("slice.cpus_per_task", self.slice.cpus_per_task),
        ];
        if let Some((field, _)) = counts.iter().find(|(_, n)| *n == 0) {
            return Err(format!("{field} must be at least 1"));
        }

        if self.environment.manager == EnvironmentManager::Conda && self.environment.name.is_none() {
            return Err("a conda environment needs a name".to_string());
        }

        let mut names = HashSet::new();
        for job in self.jobs() {
            if !names.insert(job.name.clone()) {
                return Err(format!("duplicate variant name {}", job.name));
            }
        }

        for (i, variant) in self.variants.iter().enumerate() {
            if let Some(key) = variant.overrides.keys().find(|k| !self.shared_args.contains_key(*k)) {
                return Err(format!("variant {i} overrides unknown argument {key}"));
            }
        }

        let requested = self.variants.len() as u64 * self.slice.ntasks as u64;
        if requested > self.resources.ntasks as u64 {
            return Err(format!(
                "{} variants x {} tasks oversubscribes the {} tasks requested",
                self.variants.len(), self.slice.ntasks, self.resources.ntasks
            ));
        }

        if self.slice.cpus_per_task > self.resources.cpus_per_task {
            return Err(format!(
                "slice wants {} cpus per task but only {} were requested",
                self.slice.cpus_per_task, self.resources.cpus_per_task
            ));
        }

        Ok(())
    }

    /// Expand the variant table into jobs, each with its own merged argument set
    pub fn jobs(&self) -> Vec<SweepJob> {
        self.variants
            .iter()
            .enumerate()
            .map(|(index, variant)| SweepJob {
                index,
                name: variant.name.clone().unwrap_or_else(|| format!("variant_{index}")),
                args: merge(&self.shared_args, &variant.overrides),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::request::message::default_request;

    fn request() -> SweepRequest {
        serde_json::from_str(default_request()).unwrap()
    }

    #[test]
    fn built_in_request_is_consistent() {
        let request = request();
        assert_eq!(request.check(), Ok(()));
        assert_eq!(request.jobs().len(), 5);
        assert_eq!(request.program.argv(), vec!["python", "train.py"]);
    }

    #[test]
    fn jobs_differ_only_in_epochs_and_look_ahead() {
        let jobs = request().jobs();
        let pairs: Vec<(i64, i64)> = jobs
            .iter()
            .map(|job| {
                (job.args["n_epochs"].as_i64().unwrap(), job.args["label_look_ahead"].as_i64().unwrap())
            })
            .collect();
        assert_eq!(pairs, vec![(30, 0), (20, 50), (20, 100), (20, 150), (20, 200)]);

        let first = &jobs[0].args;
        for job in &jobs[1..] {
            assert_eq!(job.args.keys().collect::<Vec<_>>(), first.keys().collect::<Vec<_>>());
            for (key, value) in &job.args {
                if key != "n_epochs" && key != "label_look_ahead" {
                    assert_eq!(value, &first[key], "{key} differs in {}", job.name);
                }
            }
        }
    }

    #[test]
    fn removing_a_variant_leaves_the_others_alone() {
        let full = request();
        let mut trimmed = full.clone();
        trimmed.variants.remove(2);
        trimmed.variants.reverse();

        let full_jobs = full.jobs();
        for job in trimmed.jobs() {
            let same = full_jobs.iter().find(|j| j.name == job.name).unwrap();
            assert_eq!(same.args, job.args);
        }
    }

    #[test]
    fn unnamed_variants_get_index_names() {
        let mut request = request();
        request.variants[1].name = None;
        assert_eq!(request.jobs()[1].name, "variant_1");
    }

    #[test]
    fn unknown_override_is_rejected() {
        let mut request = request();
        request.variants[0].overrides.insert("batch_size".to_string(), json!(64));
        let err = request.check().unwrap_err();
        assert!(err.contains("batch_size"), "{err}");
    }

    #[test]
    fn oversubscription_is_rejected() {
        let mut request = request();
        request.resources.ntasks = 8;
        assert!(request.check().unwrap_err().contains("oversubscribes"));

        let mut request = self::request();
        request.slice.cpus_per_task = 8;
        assert!(request.check().is_err());
    }

    #[test]
    fn empty_sweep_is_rejected() {
        let mut request = request();
        request.variants.clear();
        assert!(request.check().is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut request = request();
        request.variants[1].name = request.variants[0].name.clone();
        assert!(request.check().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn notify_events_render_like_sbatch() {
        assert_eq!(NotifyEvent::TimeLimit.to_string(), "TIME_LIMIT");
        let events: Vec<NotifyEvent> = serde_json::from_value(json!(["BEGIN", "INVALID_DEPEND"])).unwrap();
        assert_eq!(events, vec![NotifyEvent::Begin, NotifyEvent::InvalidDepend]);
    }
}
