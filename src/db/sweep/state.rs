pub enum SweepState {
    Staged,
    Submitted
}

/// A simple way to keep track of sweep state.
///
/// Two states are supported: staged (job script written to disk) and submitted (after sbatch
/// exits 0). Jobs inside a sweep aren't tracked, SLURM owns them after submission.
impl SweepState {
    /// db columns are all lower case, enum used in sql statement
    pub fn column(&self) -> &str {
        match self {
            SweepState::Staged => "staged",
            SweepState::Submitted => "submitted"
        }
    }
}
