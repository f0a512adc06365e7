//! All sweep state is stored in a SQLite database

/// Connect to a SQLite database
pub mod open;
/// Record sweeps as they are staged and submitted
pub mod sweep;
