use crate::{InputDescriptor, JsonPointer, Violation};
use thiserror::Error;
use uuid::Uuid;

/// How a caller is expected to handle a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The client sent something unacceptable; show it what would be accepted.
    Input,
    /// A named domain invariant was violated; render a specific message.
    Invariant,
    /// Another request advanced the flow first; reload and recompute.
    Conflict,
    /// The flow can no longer be advanced; start a new one.
    Terminal,
    /// Persisted state no longer matches the code; internal error.
    Corruption,
    /// A collaborator service failed.
    Service,
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("input does not match any of the {} accepted schemas", .tried.len())]
    IncompatibleInput { tried: Vec<InputDescriptor> },

    #[error("{reactor} cannot react to the given input")]
    UnexpectedInput { reactor: &'static str },

    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("invariant violated: {kind}: {message}")]
    InvariantViolated {
        kind: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("flow {flow_id} was advanced concurrently (expected version {expected}, found {actual})")]
    Conflict {
        flow_id: Uuid,
        expected: usize,
        actual: usize,
    },

    #[error("flow {0} has expired")]
    Expired(Uuid),

    #[error("flow {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("flow {0} not found")]
    NotFound(Uuid),

    #[error("flow did not settle after {0} automatic steps")]
    AutoStepLimit(usize),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("corrupted flow state: {0}")]
    Corrupted(String),

    #[error("effect of {kind} at '{pointer}' failed: {source}")]
    Effect {
        kind: &'static str,
        pointer: JsonPointer,
        #[source]
        source: Box<FlowError>,
    },

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    pub fn invariant(kind: &'static str, message: impl Into<String>) -> Self {
        FlowError::InvariantViolated {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn invariant_with(
        kind: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        FlowError::InvariantViolated {
            kind,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Strips effect context and returns the error that caused it.
    pub fn root_cause(&self) -> &FlowError {
        match self {
            FlowError::Effect { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.root_cause() {
            FlowError::IncompatibleInput { .. }
            | FlowError::UnexpectedInput { .. }
            | FlowError::Input(_) => ErrorClass::Input,
            FlowError::InvariantViolated { .. } => ErrorClass::Invariant,
            FlowError::Conflict { .. } => ErrorClass::Conflict,
            FlowError::Expired(_) | FlowError::AlreadyCompleted(_) | FlowError::NotFound(_) => {
                ErrorClass::Terminal
            }
            FlowError::Registry(_)
            | FlowError::Corrupted(_)
            | FlowError::AutoStepLimit(_)
            | FlowError::Serialization(_) => ErrorClass::Corruption,
            FlowError::Service(_) | FlowError::Store(_) | FlowError::Effect { .. } => {
                ErrorClass::Service
            }
        }
    }

    /// The collaborator error at the root of this error, if any.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self.root_cause() {
            FlowError::Service(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum InputError {
    #[error("input violates schema '{schema}': {}", .violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    SchemaViolation {
        schema: String,
        violations: Vec<Violation>,
    },

    #[error("input for schema '{schema}' could not be decoded: {message}")]
    Decode { schema: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("unknown {role} kind: {kind}")]
    UnknownKind { role: &'static str, kind: String },

    #[error("failed to decode {kind}: {message}")]
    Decode { kind: String, message: String },

    #[error("a process-wide registry is already installed")]
    AlreadyInstalled,
}

/// Errors reported by collaborator services in the dependency context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("identity already exists")]
    DuplicatedIdentity,

    #[error("identity not found")]
    IdentityNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("no usable authenticator")]
    NoAuthenticator,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid or expired verification code")]
    InvalidCode,

    #[error("target has not been verified")]
    NotVerified,

    #[error("rate limited: {bucket}")]
    RateLimited { bucket: String },

    #[error("backend error: {0}")]
    Backend(String),
}
