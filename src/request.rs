//! Read sweep requests from disk and check them before anything is rendered or launched

/// Read, validate and deserialise a sweep request
pub mod message;
/// Compile the bundled JSON schema
pub mod schema;
