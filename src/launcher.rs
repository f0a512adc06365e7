use std::fmt;
use clap::ValueEnum;

/// How each job is started on the dispatch path
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Launcher {
    /// Carve an exclusive job step out of the current allocation
    Srun,
    /// Run the program directly, for workstations and debugging
    Local,
}

impl fmt::Display for Launcher {
      fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Launcher::Srun => write!(f, "srun"),
            Launcher::Local => write!(f, "local"),
        }
    }
}
