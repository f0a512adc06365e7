//! Sweep recording, state updates and history
//!
//! A sweep is inserted when its job script has been rendered (staged) and updated once the sbatch
//! system command returns a job id (submitted).

pub mod load;
pub mod update;
pub mod state;
