use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use log::{info, warn};
use serde_json::Value;

use crate::sweep::sweep_request::SweepRequest;

/// Request bundled with the binary: the five look-ahead training jobs
static DEFAULT_REQUEST: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/requests/elm_lookahead.json"));

pub fn default_request() -> &'static str {
    DEFAULT_REQUEST
}

#[derive(Debug, PartialEq)]
pub enum RequestError {
    JSONValidationError,
    JSONDecodeError,
    DeserialisationError,
    MessageReadError,
    InvalidSweep(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RequestError::JSONValidationError => write!(f, "request fails schema validation"),
            RequestError::JSONDecodeError => write!(f, "request isn't valid JSON"),
            RequestError::DeserialisationError => write!(f, "request can't be deserialised"),
            RequestError::MessageReadError => write!(f, "request can't be read"),
            RequestError::InvalidSweep(reason) => write!(f, "invalid sweep: {reason}"),
        }
    }
}

impl Error for RequestError {}

/// A sweep request waiting to be read, either from a file or the bundled default
pub struct Message {
    pub path: Option<PathBuf>,
    pub compiled_schema: JSONSchema,
}

impl Message {
    pub fn read(&self) -> Result<SweepRequest, RequestError> {
        let json: Value = self.parse_untyped_json()?;

        match self.validate(&json) {
            Ok(_) => {
                info!("Request is valid");
                let request = self.parse_json(json)?;
                request.check().map_err(|reason| {
                    warn!("Request fails sweep checks: {reason}");
                    RequestError::InvalidSweep(reason)
                })?;
                Ok(request)
            }
            Err(err) => {
                warn!("Request fails validation");
                Err(err)
            }
        }
    }

    fn validate(&self, json: &Value) -> Result<(), RequestError> {
        info!("Validating raw request against JSON schema");
        match self.compiled_schema.validate(json) {
            Ok(_) => Ok(()),
            Err(errors) => {
                for error in errors {
                    warn!("{} at {}", error, error.instance_path);
                }
                Err(RequestError::JSONValidationError)
            }
        }
    }

    fn read_file(&self) -> Result<String, RequestError> {
        let path: &Path = match &self.path {
            Some(path) => path.as_path(),
            None => {
                info!("No request given, using the bundled request");
                return Ok(default_request().to_string());
            }
        };
        info!("Reading request at {}", path.display());
        fs::read_to_string(path).map_err(|err| {
            warn!("Can't read request at path {}: {}", path.display(), err);
            RequestError::MessageReadError
        })
    }

    fn parse_json(&self, value: Value) -> Result<SweepRequest, RequestError> {
        info!("Deserialising valid JSON into typed Rust object");
        // from_value is a generic function, so request SweepRequest specifically
        serde_json::from_value::<SweepRequest>(value).map_err(|err| {
            warn!("{err}");
            RequestError::DeserialisationError
        })
    }

    fn parse_untyped_json(&self) -> Result<Value, RequestError> {
        info!("Parsing JSON into untyped structure");
        let json_string = self.read_file()?;
        serde_json::from_str::<Value>(&json_string).map_err(|err| {
            warn!("{err}");
            RequestError::JSONDecodeError
        })
    }
}
