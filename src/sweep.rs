//! Sweep requests: the typed model, argument handling and job script rendering

/// Valid JSON requests are deserialised into a set of structs defined here
pub mod sweep_request;

/// Merging and formatting command line arguments for the training program
pub mod args;

/// Render templates into a job script and write the sweep working directory
pub mod job;
