//! Weaving errors

use logweave_il::{BodyError, InstrId, ModuleError, VerifyError};
use thiserror::Error;

use crate::config::ConfigError;

/// Result alias for weaving operations
pub type WeaveResult<T> = Result<T, WeaveError>;

/// A referenced module could not be loaded
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Module {name} not found")]
    NotFound { name: String },

    #[error("Failed to load module {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: ModuleError,
    },
}

/// The logging callable is not defined by any referenced module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("Could not locate non-generic {signature}")]
    NotFound { signature: String },
}

/// The empty-array factory could not be located
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HelperError {
    #[error("Could not resolve System.Array.")]
    ArrayTypeNotFound,

    #[error("Could not find Array.Empty<T>() method.")]
    EmptyMethodNotFound,
}

/// A sequence could not be spliced into a body
#[derive(Debug, Error)]
pub enum SpliceError {
    #[error("Method {method} has no body")]
    NoBody { method: String },

    #[error("Method {method} has an empty body")]
    EmptyBody { method: String },

    #[error("Anchor {anchor} is not an instruction of {method}")]
    UnknownAnchor { method: String, anchor: InstrId },

    #[error("Too many local variables in {method} (max 65536)")]
    TooManyLocals { method: String },

    #[error("Instruction list error: {0}")]
    Body(#[from] BodyError),

    #[error("Malformed injection sequence: {0}")]
    Sequence(#[from] VerifyError),
}

/// Any failure surfaced by the weaver
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Helper(#[from] HelperError),

    #[error(transparent)]
    Splice(#[from] SpliceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Too many parameters in {method} (max 65534)")]
    TooManyParameters { method: String },
}
