use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use serde::Deserialize;
use tokio::process::Command;

use crate::sweep::sweep_request::{Environment, EnvironmentManager};

/// Environment variables every launched job receives on top of the inherited environment
#[derive(Debug, Default, PartialEq)]
pub struct ActivatedEnvironment {
    vars: Vec<(String, OsString)>,
}

impl ActivatedEnvironment {
    pub fn apply(&self, cmd: &mut Command) {
        cmd.envs(self.vars.iter().map(|(k, v)| (k, v)));
    }

    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.vars.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Subset of `conda info --envs --json`
#[derive(Debug, Deserialize)]
pub struct CondaInfo {
    pub envs: Vec<PathBuf>,
    #[serde(default)]
    pub root_prefix: Option<PathBuf>,
}

/// Prepare the execution context for all subsequent launches
///
/// Failure is fatal: the caller must not launch anything if this returns an error.
pub async fn activate(environment: &Environment) -> Result<ActivatedEnvironment> {
    match environment.manager {
        EnvironmentManager::None => {
            info!("No environment manager configured, inheriting current environment");
            Ok(ActivatedEnvironment::default())
        }
        EnvironmentManager::Conda => {
            let name = environment
                .name
                .as_deref()
                .ok_or_else(|| anyhow!("Conda environment has no name"))?;
            info!("Activating conda environment {name}");
            let info = conda_info().await?;
            let prefix = find_prefix(&info, name)
                .ok_or_else(|| anyhow!("Conda environment {name} not found"))?;
            if !prefix.join("bin").is_dir() {
                bail!("Conda environment {name} has no bin directory at {}", prefix.display());
            }
            let activated = conda_vars(&prefix, name, env::var_os("PATH"))?;
            if let Some(prefix) = activated.get("CONDA_PREFIX") {
                info!("Using conda prefix {}", prefix.to_string_lossy());
            }
            Ok(activated)
        }
    }
}

async fn conda_info() -> Result<CondaInfo> {
    let conda = env::var_os("CONDA_EXE").unwrap_or_else(|| OsString::from("conda"));
    let output = Command::new(&conda)
        .args(["info", "--envs", "--json"])
        .output()
        .await
        .with_context(|| format!("Can't run {}", conda.to_string_lossy()))?;
    if !output.status.success() {
        bail!(
            "conda info failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    serde_json::from_slice(&output.stdout).context("Can't parse conda info output")
}

/// Resolve an environment name (or an explicit prefix path) to its prefix
pub fn find_prefix(info: &CondaInfo, name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        return Some(PathBuf::from(name));
    }
    if name == "base" {
        return info.root_prefix.clone();
    }
    info.envs
        .iter()
        .find(|prefix| prefix.file_name().map_or(false, |f| f == name))
        .cloned()
}

/// Variables `conda activate` would set for the prefix
pub fn conda_vars(prefix: &Path, name: &str, path: Option<OsString>) -> Result<ActivatedEnvironment> {
    let mut dirs = vec![prefix.join("bin")];
    if let Some(path) = path {
        dirs.extend(env::split_paths(&path));
    }
    let path = env::join_paths(dirs).context("Can't build PATH")?;

    Ok(ActivatedEnvironment {
        vars: vec![
            ("PATH".to_string(), path),
            ("CONDA_PREFIX".to_string(), prefix.as_os_str().to_owned()),
            ("CONDA_DEFAULT_ENV".to_string(), OsString::from(name)),
        ],
    })
}
